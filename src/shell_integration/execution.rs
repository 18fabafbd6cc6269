//! 命令执行记录

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

use super::stream::{DataStream, DrainSignal, ExecutionOutput};
use super::types::{CommandLine, ExecutionId};

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// 一次命令执行
///
/// 对外只暴露只读访问器和 `read`；输出推送与结束由所属会话驱动。
/// 使用方持有的 `Arc<Execution>` 可以比会话对它的跟踪活得更久。
pub struct Execution {
    id: ExecutionId,
    /// 最新已知的命令行，结束时可能被 Shell 上报的值替换
    command_line: RwLock<CommandLine>,
    cwd: Option<Url>,
    /// 结束后置为 `None`，之后的 `read` 得到空读者
    stream: Mutex<Option<DataStream>>,
    drained: DrainSignal,
}

impl Execution {
    pub(crate) fn new(command_line: CommandLine, cwd: Option<Url>) -> Arc<Self> {
        let stream = DataStream::new();
        let drained = stream.drained();
        Arc::new(Self {
            id: ExecutionId(NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed)),
            command_line: RwLock::new(command_line),
            cwd,
            stream: Mutex::new(Some(stream)),
            drained,
        })
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn command_line(&self) -> CommandLine {
        self.command_line.read().clone()
    }

    pub fn cwd(&self) -> Option<&Url> {
        self.cwd.as_ref()
    }

    /// 读取执行输出
    ///
    /// 每次调用都是独立的新读者，只能看到调用之后产生的输出；
    /// 执行已结束时返回立即结束的空读者
    pub fn read(&self) -> ExecutionOutput {
        match self.stream.lock().as_ref() {
            Some(stream) => stream.attach(),
            None => ExecutionOutput::empty(),
        }
    }

    pub fn has_ended(&self) -> bool {
        self.stream.lock().is_none()
    }

    /// 推送输出，执行已结束时直接丢弃
    pub(crate) fn emit_data(&self, chunk: &str) {
        if let Some(stream) = self.stream.lock().as_ref() {
            stream.push(chunk);
        }
    }

    /// 结束执行：可选地更新命令行，关闭并拆除数据流
    ///
    /// 重复调用只会更新命令行
    pub(crate) fn end_execution(&self, command_line: Option<CommandLine>) {
        if let Some(command_line) = command_line {
            *self.command_line.write() = command_line;
        }
        if let Some(stream) = self.stream.lock().take() {
            stream.close();
        }
    }

    /// 排空信号，在数据流拆除后仍然有效
    pub(crate) fn flush(&self) -> DrainSignal {
        self.drained.clone()
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("command_line", &*self.command_line.read())
            .field("cwd", &self.cwd)
            .field("ended", &self.has_ended())
            .finish()
    }
}
