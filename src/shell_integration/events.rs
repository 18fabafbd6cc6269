//! Shell 集成对外事件

use std::sync::Arc;

use super::execution::Execution;
use super::host::Terminal;
use super::session::ShellIntegration;

/// Shell 集成事件
#[derive(Debug, Clone)]
pub enum ShellIntegrationEvent {
    /// Shell 集成状态变化（激活、环境、CWD、富命令检测）
    ShellIntegrationChanged {
        terminal: Terminal,
        shell_integration: ShellIntegration,
    },
    /// 执行开始
    ExecutionStarted {
        terminal: Terminal,
        shell_integration: ShellIntegration,
        execution: Arc<Execution>,
    },
    /// 执行结束，所有读者已读完输出
    ExecutionEnded {
        terminal: Terminal,
        shell_integration: ShellIntegration,
        execution: Arc<Execution>,
        exit_code: Option<i32>,
    },
}

impl ShellIntegrationEvent {
    pub fn terminal(&self) -> &Terminal {
        match self {
            Self::ShellIntegrationChanged { terminal, .. }
            | Self::ExecutionStarted { terminal, .. }
            | Self::ExecutionEnded { terminal, .. } => terminal,
        }
    }

    pub fn execution(&self) -> Option<&Arc<Execution>> {
        match self {
            Self::ShellIntegrationChanged { .. } => None,
            Self::ExecutionStarted { execution, .. } | Self::ExecutionEnded { execution, .. } => {
                Some(execution)
            }
        }
    }
}
