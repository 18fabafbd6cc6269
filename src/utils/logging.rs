// 日志系统模块

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// 默认过滤规则：执行跟踪输出 debug，其余依赖只输出 info
const DEFAULT_FILTER: &str = "info,shell_exec_tracker=debug";

/// 初始化日志系统
/// 支持通过 RUST_LOG 环境变量控制日志级别
pub fn init_logging() -> Result<(), String> {
    init_logging_with_filter(DEFAULT_FILTER)
}

/// 使用指定的默认过滤规则初始化日志系统，RUST_LOG 优先
pub fn init_logging_with_filter(default_filter: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| format!("日志过滤规则无效: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| format!("日志系统初始化失败: {}", e))?;

    info!("日志系统初始化完成");
    Ok(())
}
