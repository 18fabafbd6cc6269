//! Shell 执行跟踪核心
//!
//! 将 Shell Integration 上报的生命周期信号（命令开始、结束、输出、环境和CWD变化）
//! 关联到具体的命令执行，并以可观察对象和惰性数据流的形式对外暴露。
//! 主要功能包括：
//! - 按置信度匹配本地预注册的命令执行
//! - 多读者、可晚加入的执行输出流
//! - 保证所有读者读完输出后才发出执行结束事件

pub mod shell_integration; // Shell 集成会话与执行跟踪模块
pub mod utils; // 工具和错误处理模块

pub use shell_integration::*;
