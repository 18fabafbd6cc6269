//! Shell 集成会话目录
//!
//! 终端句柄到会话的进程级映射。任何引用未知句柄的信号都会尝试
//! 通过终端宿主解析终端并惰性创建会话；无法解析的句柄直接忽略。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::config::ShellIntegrationConfig;
use super::error::{ShellIntegrationError, ShellIntegrationResult};
use super::events::ShellIntegrationEvent;
use super::execution::Execution;
use super::host::TerminalHost;
use super::session::{ShellIntegration, ShellIntegrationSession};
use super::types::{CommandLine, CommandLineConfidence, ShellEnv, TerminalId};

/// 会话及其销毁钩子的取消令牌
struct SessionEntry {
    session: ShellIntegrationSession,
    /// 目录生命周期的子令牌，关闭终端时取消以结束钩子任务
    hook: CancellationToken,
}

type SessionMap = DashMap<TerminalId, SessionEntry>;

/// 会话目录
pub struct SessionDirectory {
    sessions: Arc<SessionMap>,
    host: Arc<dyn TerminalHost>,
    events: broadcast::Sender<ShellIntegrationEvent>,
    config: ShellIntegrationConfig,
    /// 目录关闭时取消，结束所有销毁钩子任务
    lifetime: CancellationToken,
}

impl SessionDirectory {
    /// 使用默认配置创建会话目录
    pub fn new(host: Arc<dyn TerminalHost>) -> Self {
        Self::build(host, ShellIntegrationConfig::default())
    }

    /// 使用指定配置创建会话目录
    pub fn with_config(
        host: Arc<dyn TerminalHost>,
        config: ShellIntegrationConfig,
    ) -> ShellIntegrationResult<Self> {
        config.validate()?;
        Ok(Self::build(host, config))
    }

    fn build(host: Arc<dyn TerminalHost>, config: ShellIntegrationConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            sessions: Arc::new(DashMap::new()),
            host,
            events,
            config,
            lifetime: CancellationToken::new(),
        }
    }

    /// 订阅 Shell 集成事件，丢弃接收端即取消订阅
    pub fn subscribe(&self) -> broadcast::Receiver<ShellIntegrationEvent> {
        self.events.subscribe()
    }

    /// 获取已存在的会话视图，不会创建会话
    pub fn get(&self, id: TerminalId) -> Option<ShellIntegration> {
        self.sessions
            .get(&id)
            .map(|entry| entry.session.shell_integration())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 获取或惰性创建会话
    fn session(&self, id: TerminalId) -> Option<ShellIntegrationSession> {
        if let Some(entry) = self.sessions.get(&id) {
            return Some(entry.session.clone());
        }

        let Some(terminal) = self.host.resolve_terminal(id).filter(|t| !t.is_disposed()) else {
            debug!("终端 {} 不存在或已销毁，忽略Shell集成信号", id);
            return None;
        };

        let hook = self.lifetime.child_token();
        let session = match self.sessions.entry(id) {
            Entry::Occupied(entry) => return Some(entry.get().session.clone()),
            Entry::Vacant(entry) => {
                let session = ShellIntegrationSession::new(
                    terminal,
                    Arc::clone(&self.host),
                    self.events.clone(),
                    self.config.clone(),
                );
                entry.insert(SessionEntry {
                    session: session.clone(),
                    hook: hook.clone(),
                });
                session
            }
        };

        info!("终端 {} 创建Shell集成会话", id);
        self.register_disposal_hook(&session, hook);
        Some(session)
    }

    /// 终端销毁时自动拆除会话
    fn register_disposal_hook(&self, session: &ShellIntegrationSession, hook: CancellationToken) {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                "没有可用的tokio运行时，终端 {} 销毁时需要显式调用 close_terminal",
                session.terminal().id()
            );
            return;
        };

        let sessions: Weak<SessionMap> = Arc::downgrade(&self.sessions);
        let session = session.clone();
        handle.spawn(async move {
            tokio::select! {
                _ = session.terminal().disposed() => {}
                _ = hook.cancelled() => return,
            }
            if let Some(sessions) = sessions.upgrade() {
                sessions.remove_if(&session.terminal().id(), |_, tracked| {
                    tracked.session.ptr_eq(&session)
                });
            }
            debug!("终端 {} 已销毁，拆除Shell集成会话", session.terminal().id());
            session.dispose();
        });
    }

    /// Shell 集成激活或确认
    pub fn shell_integration_change(&self, id: TerminalId) {
        if let Some(session) = self.session(id) {
            session.mark_active();
        }
    }

    pub fn shell_execution_start(
        &self,
        id: TerminalId,
        command_line: &str,
        confidence: CommandLineConfidence,
        is_trusted: bool,
        cwd: Option<Url>,
    ) {
        if let Some(session) = self.session(id) {
            session.start_shell_execution(
                CommandLine::new(command_line, confidence, is_trusted),
                cwd,
            );
        }
    }

    /// Shell 上报执行结束，空命令行视为未上报
    pub fn shell_execution_end(
        &self,
        id: TerminalId,
        command_line: &str,
        confidence: CommandLineConfidence,
        is_trusted: bool,
        exit_code: Option<i32>,
    ) {
        if let Some(session) = self.session(id) {
            let command_line = (!command_line.is_empty())
                .then(|| CommandLine::new(command_line, confidence, is_trusted));
            session.end_shell_execution(command_line, exit_code);
        }
    }

    pub fn shell_execution_data(&self, id: TerminalId, chunk: &str) {
        if let Some(session) = self.session(id) {
            session.emit_data(chunk);
        }
    }

    /// 环境变量整体更新，`keys` 与 `values` 为等长的并行序列
    pub fn shell_env_change(
        &self,
        id: TerminalId,
        keys: Vec<String>,
        values: Vec<Option<String>>,
        is_trusted: bool,
    ) {
        if keys.len() != values.len() {
            warn!(
                "终端 {} 环境变量键值数量不一致: {} 个键, {} 个值",
                id,
                keys.len(),
                values.len()
            );
        }
        if let Some(session) = self.session(id) {
            session.set_env(ShellEnv::from_parallel(keys, values, is_trusted));
        }
    }

    pub fn shell_env_single_var_change(
        &self,
        id: TerminalId,
        key: String,
        value: Option<String>,
        is_trusted: bool,
    ) {
        if let Some(session) = self.session(id) {
            session.set_env_single_var(key, value, is_trusted);
        }
    }

    pub fn cwd_change(&self, id: TerminalId, cwd: Option<Url>) {
        if let Some(session) = self.session(id) {
            session.set_cwd(cwd);
        }
    }

    pub fn set_has_rich_command_detection(&self, id: TerminalId, value: bool) {
        if let Some(session) = self.session(id) {
            session.set_has_rich_command_detection(value);
        }
    }

    /// 本地提交命令，必要时创建会话
    pub fn execute_command(
        &self,
        id: TerminalId,
        command_line: &str,
    ) -> ShellIntegrationResult<Arc<Execution>> {
        let session = self
            .session(id)
            .ok_or(ShellIntegrationError::UnknownTerminal(id))?;
        session.shell_integration().execute_command(command_line)
    }

    /// 立即移除并销毁会话，不等待进行中的排空
    pub fn close_terminal(&self, id: TerminalId) {
        if let Some((_, entry)) = self.sessions.remove(&id) {
            entry.hook.cancel();
            entry.session.dispose();
        }
    }

    /// 宿主连接关闭：销毁全部会话
    pub fn shutdown(&self) {
        let ids: Vec<TerminalId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close_terminal(id);
        }
        self.lifetime.cancel();
        info!("Shell集成会话目录已关闭");
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        self.lifetime.cancel();
        for entry in self.sessions.iter() {
            entry.session.dispose();
        }
    }
}
