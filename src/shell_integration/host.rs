//! 外部协作方接口
//!
//! 终端注册表（句柄到终端对象、终端销毁）和命令传输层都在本模块之外，
//! 这里只定义它们对核心可见的窄接口。

use tokio_util::sync::CancellationToken;

use super::types::TerminalId;

/// 终端对象
///
/// 生命周期由外部注册表控制：注册表销毁终端时取消 `lifetime`
#[derive(Debug, Clone)]
pub struct Terminal {
    id: TerminalId,
    name: String,
    lifetime: CancellationToken,
}

impl Terminal {
    pub fn new(id: TerminalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 标记终端已销毁
    pub fn dispose(&self) {
        self.lifetime.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// 终端销毁时完成
    pub async fn disposed(&self) {
        self.lifetime.cancelled().await
    }
}

/// 终端宿主：解析终端句柄，并把命令发送到真实 Shell 中执行
pub trait TerminalHost: Send + Sync {
    /// 解析终端句柄，未知或已销毁的终端返回 `None`
    fn resolve_terminal(&self, id: TerminalId) -> Option<Terminal>;

    /// 请求在终端的 Shell 中执行命令行
    ///
    /// 没有返回值，执行结果只能通过后续的 start/data/end 信号观察
    fn execute_command(&self, id: TerminalId, command_line: &str);
}
