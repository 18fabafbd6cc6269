//! Shell 集成配置

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::error::ShellIntegrationError;
use crate::utils::error::{app_error_with_context, AppResult};

/// Shell 集成配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellIntegrationConfig {
    /// 对外事件广播通道容量
    pub event_channel_capacity: usize,
    /// 富命令检测模式下出现重叠的开始信号时是否以 warn 级别记录
    pub warn_on_unexpected_start: bool,
    /// 每个会话最多保留的待确认执行数，达到上限后拒绝新的本地命令
    pub max_pending_executions: usize,
}

impl Default for ShellIntegrationConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 1000,
            warn_on_unexpected_start: true,
            max_pending_executions: 64,
        }
    }
}

impl ShellIntegrationConfig {
    /// 从 TOML 文本解析配置，缺省字段使用默认值
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(app_error_with_context("Shell集成配置解析失败"))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        debug!("加载Shell集成配置: {}", path.display());
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ShellIntegrationError> {
        if self.event_channel_capacity == 0 {
            return Err(ShellIntegrationError::Config(
                "eventChannelCapacity must be greater than 0".to_string(),
            ));
        }
        if self.max_pending_executions == 0 {
            return Err(ShellIntegrationError::Config(
                "maxPendingExecutions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ShellIntegrationConfig::from_toml_str("warnOnUnexpectedStart = false").unwrap();
        assert!(!config.warn_on_unexpected_start);
        assert_eq!(config.event_channel_capacity, 1000);
        assert_eq!(config.max_pending_executions, 64);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ShellIntegrationConfig::from_toml_str("eventChannelCapacity = 0").unwrap_err();
        assert!(err.to_string().contains("eventChannelCapacity"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = ShellIntegrationConfig::from_toml_str("maxPendingExecutions = \"many\"").unwrap_err();
        assert!(err.to_string().starts_with("Shell集成配置解析失败"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxPendingExecutions = 8").unwrap();

        let config = ShellIntegrationConfig::load(file.path()).await.unwrap();
        assert_eq!(config.max_pending_executions, 8);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = ShellIntegrationConfig::load("/nonexistent/shell-integration.toml").await;
        assert!(result.is_err());
    }
}
