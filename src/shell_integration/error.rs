//! Shell 集成错误类型

use thiserror::Error;

use super::types::TerminalId;

/// Shell 集成错误
///
/// 只出现在面向使用方的调用上，信号处理路径从不返回错误
#[derive(Debug, Error)]
pub enum ShellIntegrationError {
    #[error("Shell integration for terminal {0} has been disposed")]
    SessionDisposed(TerminalId),

    #[error("Terminal {0} is unknown or has been disposed")]
    UnknownTerminal(TerminalId),

    #[error("Command line must not be empty")]
    EmptyCommandLine,

    #[error("Terminal {0} already has {1} commands awaiting shell confirmation")]
    TooManyPendingExecutions(TerminalId, usize),

    #[error("Invalid shell integration config: {0}")]
    Config(String),
}

pub type ShellIntegrationResult<T> = Result<T, ShellIntegrationError>;
