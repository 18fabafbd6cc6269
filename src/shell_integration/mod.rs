//! Shell Integration - 命令执行跟踪
//!
//! 将 Shell 上报的生命周期信号关联到命令执行，对外提供执行事件和输出流

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod execution;
pub mod host;
pub mod session;
pub mod stream;
pub mod types;

pub use config::ShellIntegrationConfig;
pub use directory::SessionDirectory;
pub use error::{ShellIntegrationError, ShellIntegrationResult};
pub use events::ShellIntegrationEvent;
pub use execution::Execution;
pub use host::{Terminal, TerminalHost};
pub use session::{ShellIntegration, ShellIntegrationSession};
pub use stream::{DataStream, DrainSignal, ExecutionOutput};
pub use types::*;
