//! 核心数据类型定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 终端句柄（由外部终端注册表分配的不透明整数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalId(pub u32);

impl TerminalId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TerminalId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TerminalId> for u32 {
    fn from(terminal_id: TerminalId) -> Self {
        terminal_id.0
    }
}

impl std::fmt::Display for TerminalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 执行ID（进程内递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub u64);

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shell 解析出完整命令行的可靠程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandLineConfidence {
    /// 根据提示符推测
    Low,
    Medium,
    /// Shell 明确上报，与提交内容逐字一致
    High,
}

/// 命令行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLine {
    pub value: String,
    pub confidence: CommandLineConfidence,
    pub is_trusted: bool,
}

impl CommandLine {
    pub fn new(
        value: impl Into<String>,
        confidence: CommandLineConfidence,
        is_trusted: bool,
    ) -> Self {
        Self {
            value: value.into(),
            confidence,
            is_trusted,
        }
    }

    /// 本地提交的命令行：内容即为将要执行的文本
    pub fn local(value: impl Into<String>) -> Self {
        Self::new(value, CommandLineConfidence::High, true)
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence == CommandLineConfidence::High
    }
}

/// Shell 上报的环境变量快照
///
/// 值为 `None` 表示该变量被 Shell 报告为未设置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellEnv {
    pub values: HashMap<String, Option<String>>,
    pub is_trusted: bool,
}

impl ShellEnv {
    /// 将并行的键、值序列组合成快照
    ///
    /// 两个序列长度应当一致；不一致时多出的键视为未设置，多出的值被丢弃
    pub fn from_parallel(keys: Vec<String>, values: Vec<Option<String>>, is_trusted: bool) -> Self {
        let mut values = values.into_iter();
        let values = keys
            .into_iter()
            .map(|key| (key, values.next().flatten()))
            .collect();
        Self { values, is_trusted }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }
}
