//! Shell 集成会话
//!
//! 每个终端一个会话，负责：
//! - 维护本地预注册、尚未被 Shell 确认的执行队列
//! - 按置信度把 Shell 上报的开始信号关联到执行
//! - 把输出转发给当前执行
//! - 等待输出排空后再发出执行结束事件
//! - 跟踪环境变量、CWD 和富命令检测能力

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::config::ShellIntegrationConfig;
use super::error::{ShellIntegrationError, ShellIntegrationResult};
use super::events::ShellIntegrationEvent;
use super::execution::Execution;
use super::host::{Terminal, TerminalHost};
use super::types::{CommandLine, ShellEnv, TerminalId};

#[derive(Default)]
struct SessionState {
    pending: VecDeque<Arc<Execution>>,
    current: Option<Arc<Execution>>,
    env: Option<ShellEnv>,
    cwd: Option<Url>,
    has_rich_command_detection: bool,
    disposed: bool,
}

struct SessionInner {
    terminal: Terminal,
    host: Arc<dyn TerminalHost>,
    events: broadcast::Sender<ShellIntegrationEvent>,
    config: ShellIntegrationConfig,
    state: Mutex<SessionState>,
}

impl SessionInner {
    fn view(self: &Arc<Self>) -> ShellIntegration {
        ShellIntegration {
            inner: Arc::clone(self),
        }
    }

    fn fire(&self, event: ShellIntegrationEvent) {
        if self.events.send(event).is_err() {
            debug!("终端 {} 的Shell集成事件没有订阅者", self.terminal.id());
        }
    }

    fn fire_changed(self: &Arc<Self>) {
        self.fire(ShellIntegrationEvent::ShellIntegrationChanged {
            terminal: self.terminal.clone(),
            shell_integration: self.view(),
        });
    }

    /// 等待输出排空后发出结束事件
    ///
    /// 已经排空（没有存活的读者）时同步发出，否则交给后台任务等待。
    /// `identity_checked` 为 true 时，只有该执行仍是当前执行才会发出事件，
    /// 并在发出时清除当前执行
    fn schedule_end(
        self: &Arc<Self>,
        execution: Arc<Execution>,
        exit_code: Option<i32>,
        identity_checked: bool,
    ) {
        let drained = execution.flush();
        if drained.is_drained() {
            self.finish_end(execution, exit_code, identity_checked);
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn(async move {
                    drained.wait().await;
                    inner.finish_end(execution, exit_code, identity_checked);
                });
            }
            Err(_) => {
                warn!(
                    "没有可用的tokio运行时，无法等待执行 {} 的输出排空，结束事件被丢弃",
                    execution.id()
                );
            }
        }
    }

    fn finish_end(
        self: &Arc<Self>,
        execution: Arc<Execution>,
        exit_code: Option<i32>,
        identity_checked: bool,
    ) {
        let should_fire = {
            let mut state = self.state.lock();
            if state.disposed {
                false
            } else if identity_checked {
                let is_current = state
                    .current
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &execution));
                if is_current {
                    state.current = None;
                }
                is_current
            } else {
                true
            }
        };

        if !should_fire {
            debug!(
                "终端 {} 执行 {} 已被取代或会话已销毁，跳过结束事件",
                self.terminal.id(),
                execution.id()
            );
            return;
        }

        debug!(
            "终端 {} 执行 {} 结束，退出码: {:?}",
            self.terminal.id(),
            execution.id(),
            exit_code
        );
        self.fire(ShellIntegrationEvent::ExecutionEnded {
            terminal: self.terminal.clone(),
            shell_integration: self.view(),
            execution,
            exit_code,
        });
    }

    fn request_new_shell_execution(
        &self,
        command_line: CommandLine,
        cwd: Option<Url>,
    ) -> ShellIntegrationResult<Arc<Execution>> {
        if command_line.value.trim().is_empty() {
            return Err(ShellIntegrationError::EmptyCommandLine);
        }

        let execution = Execution::new(command_line, cwd);
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(ShellIntegrationError::SessionDisposed(self.terminal.id()));
            }
            // 已发给 Shell 的命令不能丢弃
            let limit = self.config.max_pending_executions;
            if state.pending.len() >= limit {
                warn!(
                    "终端 {} 待确认执行已达上限 {}，拒绝新命令",
                    self.terminal.id(),
                    limit
                );
                return Err(ShellIntegrationError::TooManyPendingExecutions(
                    self.terminal.id(),
                    limit,
                ));
            }
            state.pending.push_back(Arc::clone(&execution));
        }

        let value = execution.command_line().value;
        debug!(
            "终端 {} 注册待确认执行 {}: {}",
            self.terminal.id(),
            execution.id(),
            value
        );
        self.host.execute_command(self.terminal.id(), &value);
        Ok(execution)
    }
}

/// 从待确认队列中取出与开始信号对应的执行
///
/// 高置信度按文本精确匹配（任意位置，第一个命中者）；
/// 中低置信度无法按内容匹配，直接取队首
fn take_pending(
    pending: &mut VecDeque<Arc<Execution>>,
    command_line: &CommandLine,
) -> Option<Arc<Execution>> {
    if command_line.is_high_confidence() {
        let index = pending
            .iter()
            .position(|execution| execution.command_line().value == command_line.value)?;
        pending.remove(index)
    } else {
        pending.pop_front()
    }
}

/// 会话（Shell 信号侧）
///
/// 由会话目录持有，接收某个终端的全部 Shell 信号
#[derive(Clone)]
pub struct ShellIntegrationSession {
    inner: Arc<SessionInner>,
}

impl ShellIntegrationSession {
    pub fn new(
        terminal: Terminal,
        host: Arc<dyn TerminalHost>,
        events: broadcast::Sender<ShellIntegrationEvent>,
        config: ShellIntegrationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                terminal,
                host,
                events,
                config,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.inner.terminal
    }

    /// 对外只读视图
    pub fn shell_integration(&self) -> ShellIntegration {
        self.inner.view()
    }

    /// Shell 集成已激活（可重复调用）
    pub fn mark_active(&self) {
        if self.inner.state.lock().disposed {
            return;
        }
        self.inner.fire_changed();
    }

    /// 本地提交命令：加入待确认队列并请求 Shell 执行
    pub fn request_new_shell_execution(
        &self,
        command_line: CommandLine,
        cwd: Option<Url>,
    ) -> ShellIntegrationResult<Arc<Execution>> {
        self.inner.request_new_shell_execution(command_line, cwd)
    }

    /// Shell 上报执行开始
    pub fn start_shell_execution(&self, command_line: CommandLine, cwd: Option<Url>) {
        let terminal_id = self.inner.terminal.id();
        let (previous, execution) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }

            let previous = state.current.take();
            if previous.is_some() {
                if state.has_rich_command_detection && self.inner.config.warn_on_unexpected_start
                {
                    warn!(
                        "终端 {} 启用了富命令检测，但在上一个执行结束前收到了新的开始信号",
                        terminal_id
                    );
                } else {
                    debug!("终端 {} 新执行开始，强制结束上一个执行", terminal_id);
                }
            }

            let execution = match take_pending(&mut state.pending, &command_line) {
                Some(execution) => execution,
                None => Execution::new(command_line, cwd.or_else(|| state.cwd.clone())),
            };
            state.current = Some(Arc::clone(&execution));
            (previous, execution)
        };

        if let Some(previous) = previous {
            previous.end_execution(None);
            self.inner.schedule_end(previous, None, false);
        }

        debug!(
            "终端 {} 执行 {} 开始: {}",
            terminal_id,
            execution.id(),
            execution.command_line().value
        );
        self.inner.fire(ShellIntegrationEvent::ExecutionStarted {
            terminal: self.inner.terminal.clone(),
            shell_integration: self.inner.view(),
            execution,
        });
    }

    /// Shell 上报输出，没有当前执行时丢弃
    pub fn emit_data(&self, chunk: &str) {
        let current = self.inner.state.lock().current.clone();
        if let Some(execution) = current {
            execution.emit_data(chunk);
        }
    }

    /// Shell 上报执行结束
    ///
    /// 上报了命令行时直接替换执行的命令行；立即关闭输出流，排空后再发出结束事件
    pub fn end_shell_execution(&self, command_line: Option<CommandLine>, exit_code: Option<i32>) {
        let current = {
            let state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.current.clone()
        };
        let Some(execution) = current else {
            debug!(
                "终端 {} 收到结束信号但没有当前执行，忽略",
                self.inner.terminal.id()
            );
            return;
        };

        execution.end_execution(command_line);
        self.inner.schedule_end(execution, exit_code, true);
    }

    /// 整体替换环境变量快照
    pub fn set_env(&self, env: ShellEnv) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.env = Some(env);
        }
        self.inner.fire_changed();
    }

    /// 更新单个环境变量
    ///
    /// 快照仅在所有上报都可信时才视为可信
    pub fn set_env_single_var(&self, key: String, value: Option<String>, is_trusted: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            let env = state.env.get_or_insert_with(|| ShellEnv {
                is_trusted,
                ..ShellEnv::default()
            });
            env.is_trusted &= is_trusted;
            env.values.insert(key, value);
        }
        self.inner.fire_changed();
    }

    pub fn set_cwd(&self, cwd: Option<Url>) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed || state.cwd == cwd {
                return;
            }
            state.cwd = cwd;
        }
        self.inner.fire_changed();
    }

    pub fn set_has_rich_command_detection(&self, value: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed || state.has_rich_command_detection == value {
                return;
            }
            state.has_rich_command_detection = value;
        }
        self.inner.fire_changed();
    }

    /// 销毁会话
    ///
    /// 当前和待确认执行的输出流被关闭，但不会发出结束事件
    pub fn dispose(&self) {
        let abandoned: Vec<Arc<Execution>> = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state
                .current
                .take()
                .into_iter()
                .chain(state.pending.drain(..))
                .collect()
        };

        for execution in &abandoned {
            execution.end_execution(None);
        }
        info!(
            "终端 {} Shell集成会话已销毁，放弃 {} 个执行",
            self.inner.terminal.id(),
            abandoned.len()
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Shell 集成的对外视图
///
/// 只提供只读访问器和本地提交命令的入口
#[derive(Clone)]
pub struct ShellIntegration {
    inner: Arc<SessionInner>,
}

impl ShellIntegration {
    pub fn terminal_id(&self) -> TerminalId {
        self.inner.terminal.id()
    }

    pub fn cwd(&self) -> Option<Url> {
        self.inner.state.lock().cwd.clone()
    }

    pub fn env(&self) -> Option<ShellEnv> {
        self.inner.state.lock().env.clone()
    }

    pub fn has_rich_command_detection(&self) -> bool {
        self.inner.state.lock().has_rich_command_detection
    }

    pub fn current_execution(&self) -> Option<Arc<Execution>> {
        self.inner.state.lock().current.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// 在终端中执行命令行
    ///
    /// 返回的执行在 Shell 上报开始之前处于待确认状态
    pub fn execute_command(&self, command_line: &str) -> ShellIntegrationResult<Arc<Execution>> {
        let cwd = self.cwd();
        self.inner
            .request_new_shell_execution(CommandLine::local(command_line), cwd)
    }

    /// 以可执行文件和参数的形式执行命令，参数按 POSIX Shell 规则转义
    pub fn execute_command_with_args<S: AsRef<str>>(
        &self,
        executable: &str,
        args: &[S],
    ) -> ShellIntegrationResult<Arc<Execution>> {
        let command_line =
            shell_words::join(std::iter::once(executable).chain(args.iter().map(AsRef::as_ref)));
        self.execute_command(&command_line)
    }
}

impl std::fmt::Debug for ShellIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellIntegration")
            .field("terminal_id", &self.terminal_id())
            .finish_non_exhaustive()
    }
}
