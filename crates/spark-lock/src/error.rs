//! 锁执行链的错误域。
//!
//! # 模块定位（Why）
//! - `execute()` 从不以 panic 形式向外抛出异常，所有失败路径都收敛为 [`ExecutionError`]，
//!   再包装进 [`crate::Outcome::Failure`]；
//! - 每个变体都提供稳定错误码（见 [`codes`]），便于日志、告警按码聚合而非匹配自然语言。
//!
//! # 分类（What）
//! - **获取失败**：锁提供者在获取阶段返回 [`AcquireError`]，此时锁从未被持有，也不会尝试释放；
//! - **等待超时**：限时获取在预算内未拿到锁；
//! - **求值失败**：持锁执行的步骤返回错误或发生 panic，锁仍由守卫保证释放；
//! - **不支持的组合**：超时装饰器包裹了无法识别的执行链形态。

use std::any::Any;
use std::borrow::Cow;
use std::error::Error as StdError;

use thiserror::Error;

use crate::timeout::LockTimeout;

/// 步骤错误的统一装箱类型，要求跨线程可传递。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 稳定错误码目录。
///
/// 命名遵循 `<域>.<语义>` 的小写蛇形格式，一经发布不得修改含义。
pub mod codes {
    /// 锁提供者在阻塞或限时获取阶段报告失败。
    pub const ACQUIRE_FAILED: &str = "lock.acquire_failed";
    /// 限时获取在预算内未拿到锁。
    pub const ACQUIRE_TIMEOUT: &str = "lock.acquire_timeout";
    /// 持锁执行的步骤返回错误。
    pub const ACTION_FAILED: &str = "lock.action_failed";
    /// 持锁执行的步骤发生 panic。
    pub const ACTION_PANICKED: &str = "lock.action_panicked";
    /// 超时装饰器遇到不支持的执行链形态。
    pub const UNSUPPORTED_EXECUTION: &str = "lock.unsupported_execution";
}

/// 锁提供者在获取阶段报告的失败。
///
/// 自定义 [`crate::ExecutionLock`] 实现通过该类型表达“获取本身出错”（例如底层资源已关闭），
/// 与“等待超时”严格区分。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct AcquireError {
    reason: Cow<'static, str>,
}

impl AcquireError {
    /// 以可读原因构造获取失败。
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// 失败原因。
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// 执行链在 `execute()` 期间可能产生的全部失败。
///
/// # 契约说明（What）
/// - 所有变体均满足 `Send + Sync + 'static`，可安全跨线程返回；
/// - `lock` 字段记录锁提供者的 [`label`](crate::ExecutionLock::label)，仅用于排障；
/// - [`ExecutionError::code`] 返回稳定错误码，供观测系统聚合。
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// 获取锁时提供者报告失败，锁从未被持有。
    #[error("failed to acquire lock `{lock}`: {source}")]
    Acquisition {
        lock: String,
        #[source]
        source: AcquireError,
    },

    /// 限时获取在预算内未拿到锁。
    #[error("lock `{lock}` was not acquired within {timeout}")]
    TimedOut { lock: String, timeout: LockTimeout },

    /// 持锁执行的步骤返回了错误。
    #[error("locked action failed: {0}")]
    Action(#[source] BoxError),

    /// 持锁执行的步骤发生 panic；锁已在展开前释放。
    #[error("locked action panicked: {message}")]
    Panicked { message: String },

    /// 超时装饰器包裹了不支持的执行链形态。
    #[error("unsupported lock execution: {reason}")]
    Unsupported { reason: &'static str },
}

impl ExecutionError {
    /// 将任意步骤错误装箱为 [`ExecutionError::Action`]。
    pub fn action(error: impl Into<BoxError>) -> Self {
        Self::Action(error.into())
    }

    /// 从 `catch_unwind` 捕获的载荷中提取可读信息。
    ///
    /// `panic!` 的载荷通常是 `&'static str` 或 `String`，其余类型统一描述为未知载荷。
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "non-string panic payload".to_owned(),
            },
        };
        Self::Panicked { message }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Acquisition { .. } => codes::ACQUIRE_FAILED,
            Self::TimedOut { .. } => codes::ACQUIRE_TIMEOUT,
            Self::Action(_) => codes::ACTION_FAILED,
            Self::Panicked { .. } => codes::ACTION_PANICKED,
            Self::Unsupported { .. } => codes::UNSUPPORTED_EXECUTION,
        }
    }

    /// 失败是否发生在持锁之前（获取失败、超时或不支持的组合）。
    ///
    /// 返回 `true` 时，调用方可确定没有任何步骤被执行。
    pub fn is_before_lock(&self) -> bool {
        matches!(
            self,
            Self::Acquisition { .. } | Self::TimedOut { .. } | Self::Unsupported { .. }
        )
    }
}
