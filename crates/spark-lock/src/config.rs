//! 锁执行相关的声明式配置。
//!
//! # 模块定位（Why）
//! - 公平策略、默认超时与执行线程命名通常属于部署参数，不应硬编码在调用点；
//! - 配置以 TOML 文档描述，所有字段都有默认值，空文档即得到默认配置。
//!
//! # 示例
//! ```toml
//! fairness = "fair"
//! default_timeout = { magnitude = 500, unit = "milliseconds" }
//!
//! [thread]
//! prefix = "order-writer"
//! priority = 7
//! non_blocking = true
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::Fairness;
use crate::thread::ThreadPriority;
use crate::timeout::LockTimeout;

/// 配置解析失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法错误、字段类型不符或出现未知字段。
    #[error("invalid lock settings: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "lock.config_invalid",
        }
    }
}

/// 锁执行的顶层配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    /// 读写锁门面的交接策略。
    pub fairness: Fairness,
    /// `TimeoutBuilder::configured` 使用的默认等待预算；缺省表示阻塞获取。
    pub default_timeout: Option<LockTimeout>,
    pub thread: ThreadSettings,
}

/// 执行线程工厂的配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadSettings {
    pub prefix: String,
    pub priority: ThreadPriority,
    /// 是否创建非阻塞线程（缩小栈空间，仅用于不会阻塞的短任务）。
    pub non_blocking: bool,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            prefix: "lock-execution".to_owned(),
            priority: ThreadPriority::NORM,
            non_blocking: false,
        }
    }
}

impl LockSettings {
    /// 解析 TOML 文档；未出现的字段取默认值，未知字段视为错误。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}
