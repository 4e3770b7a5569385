//! 限时获取装饰器 [`TimeoutLockExecution`] 与时长值对象 [`LockTimeout`]。
//!
//! # 模块定位（Why）
//! - 阻塞获取可能无限等待；装饰器把 `execute()` 的获取阶段替换为“在预算内尝试获取”，
//!   预算耗尽即快速失败，而已开始执行的步骤不会被中途取消；
//! - 组合操作对装饰器透明：委托给被包裹的执行链，再以同一超时重新包装。
//!
//! # 契约（What）
//! - 包裹 `Empty`：直接委托，超时无关；
//! - 包裹 `Bound`：限时获取；获取报错或预算耗尽都返回失败且不尝试释放；拿到锁后与阻塞版本语义一致；
//! - 包裹 `Timed`（嵌套装饰器）：不支持的组合，显式返回 [`ExecutionError::Unsupported`]，
//!   绝不退化为阻塞获取。

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::LockSettings;
use crate::error::{BoxError, ExecutionError};
use crate::execution::{self, ExecutionOutcome, LockExecution, Shape};
use crate::outcome::Outcome;

/// 超时时长的单位。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// 将非负数量换算为 [`Duration`]，超出表示范围时饱和到秒数上限。
    fn duration_of(self, magnitude: u64) -> Duration {
        const SECS_PER_MINUTE: u64 = 60;
        const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
        const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

        match self {
            Self::Nanoseconds => Duration::from_nanos(magnitude),
            Self::Microseconds => Duration::from_micros(magnitude),
            Self::Milliseconds => Duration::from_millis(magnitude),
            Self::Seconds => Duration::from_secs(magnitude),
            Self::Minutes => Duration::from_secs(magnitude.saturating_mul(SECS_PER_MINUTE)),
            Self::Hours => Duration::from_secs(magnitude.saturating_mul(SECS_PER_HOUR)),
            Self::Days => Duration::from_secs(magnitude.saturating_mul(SECS_PER_DAY)),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }
}

/// 不可变的 `(数量, 单位)` 超时值对象，按值比较。
///
/// 数量为有符号整数；非正数表示“不等待”，只尝试获取一次。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockTimeout {
    magnitude: i64,
    unit: TimeUnit,
}

impl LockTimeout {
    pub const fn new(magnitude: i64, unit: TimeUnit) -> Self {
        Self { magnitude, unit }
    }

    pub const fn nanos(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Nanoseconds)
    }

    pub const fn micros(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Microseconds)
    }

    pub const fn millis(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Milliseconds)
    }

    pub const fn seconds(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Seconds)
    }

    pub const fn minutes(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Minutes)
    }

    pub const fn hours(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Hours)
    }

    pub const fn days(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Days)
    }

    pub fn magnitude(&self) -> i64 {
        self.magnitude
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// 换算为等待预算；非正数得到零预算。
    pub fn to_duration(&self) -> Duration {
        match u64::try_from(self.magnitude) {
            Ok(magnitude) => self.unit.duration_of(magnitude),
            Err(_) => Duration::ZERO,
        }
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

/// 由 [`LockExecution::with_lock_timeout`] 返回，选择超时单位后得到装饰器。
pub struct TimeoutBuilder<T> {
    execution: LockExecution<T>,
}

impl<T> TimeoutBuilder<T> {
    pub(crate) fn new(execution: LockExecution<T>) -> Self {
        Self { execution }
    }

    pub fn timeout(self, timeout: LockTimeout) -> TimeoutLockExecution<T> {
        TimeoutLockExecution {
            timeout,
            execution: self.execution,
        }
    }

    pub fn nanos(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::nanos(magnitude))
    }

    pub fn micros(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::micros(magnitude))
    }

    pub fn millis(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::millis(magnitude))
    }

    pub fn seconds(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::seconds(magnitude))
    }

    pub fn minutes(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::minutes(magnitude))
    }

    pub fn hours(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::hours(magnitude))
    }

    pub fn days(self, magnitude: i64) -> TimeoutLockExecution<T> {
        self.timeout(LockTimeout::days(magnitude))
    }

    /// 使用配置中的默认超时；未配置时原样交还执行链，由调用方决定是否阻塞获取。
    pub fn configured(self, settings: &LockSettings) -> Result<TimeoutLockExecution<T>, LockExecution<T>> {
        match settings.default_timeout {
            Some(timeout) => Ok(self.timeout(timeout)),
            None => Err(self.execution),
        }
    }
}

/// 以限时获取替代阻塞获取的执行链装饰器。
#[must_use = "执行链是惰性的，必须调用 execute() 才会运行"]
pub struct TimeoutLockExecution<T> {
    timeout: LockTimeout,
    execution: LockExecution<T>,
}

impl<T> TimeoutLockExecution<T> {
    pub fn timeout(&self) -> LockTimeout {
        self.timeout
    }

    pub fn inner(&self) -> &LockExecution<T> {
        &self.execution
    }

    /// 拆下装饰器，取回被包裹的执行链。
    pub fn into_inner(self) -> LockExecution<T> {
        self.execution
    }
}

impl<T: Send + 'static> TimeoutLockExecution<T> {
    pub fn map<K, F>(self, mapper: F) -> TimeoutLockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce(T) -> K + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.map(mapper),
        }
    }

    pub fn try_map<K, E, F>(self, mapper: F) -> TimeoutLockExecution<K>
    where
        K: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce(T) -> Result<K, E> + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.try_map(mapper),
        }
    }

    pub fn flat_map<K, F>(self, mapper: F) -> TimeoutLockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce(T) -> LockExecution<K> + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.flat_map(mapper),
        }
    }

    pub fn filter<P>(self, predicate: P) -> TimeoutLockExecution<T>
    where
        P: FnOnce(&T) -> bool + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.filter(predicate),
        }
    }

    pub fn run<F>(self, procedure: F) -> TimeoutLockExecution<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.run(procedure),
        }
    }

    pub fn supply<K, F>(self, supplier: F) -> TimeoutLockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce() -> K + Send + 'static,
    {
        let timeout = self.timeout;
        TimeoutLockExecution {
            timeout,
            execution: self.execution.supply(supplier),
        }
    }

    /// 限时获取锁、执行流水线并释放。
    pub fn execute(self) -> ExecutionOutcome<T> {
        let timeout = self.timeout;
        match self.execution.shape {
            Shape::Empty => Outcome::Success(None),
            Shape::Bound { lock, action } => {
                let guard = match lock.try_lock_for(timeout.to_duration()) {
                    Ok(Some(guard)) => guard,
                    Ok(None) => {
                        return execution::failed(ExecutionError::TimedOut {
                            lock: lock.label().to_owned(),
                            timeout,
                        });
                    }
                    Err(source) => {
                        return execution::failed(ExecutionError::Acquisition {
                            lock: lock.label().to_owned(),
                            source,
                        });
                    }
                };
                execution::run_guarded(lock.as_ref(), guard, action)
            }
            Shape::Timed(nested) => {
                warn!(
                    outer = %timeout,
                    inner = %nested.timeout(),
                    "nested lock timeout decorators are not supported"
                );
                execution::failed(ExecutionError::Unsupported {
                    reason: "a timeout decorator cannot wrap another timeout decorator",
                })
            }
        }
    }
}

impl<T> From<TimeoutLockExecution<T>> for LockExecution<T> {
    fn from(timed: TimeoutLockExecution<T>) -> Self {
        LockExecution {
            shape: Shape::Timed(Box::new(timed)),
        }
    }
}

impl<T> fmt::Debug for TimeoutLockExecution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutLockExecution")
            .field("timeout", &self.timeout)
            .field("execution", &self.execution)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_convert_to_durations() {
        assert_eq!(LockTimeout::nanos(7).to_duration(), Duration::from_nanos(7));
        assert_eq!(LockTimeout::micros(7).to_duration(), Duration::from_micros(7));
        assert_eq!(LockTimeout::millis(7).to_duration(), Duration::from_millis(7));
        assert_eq!(LockTimeout::seconds(7).to_duration(), Duration::from_secs(7));
        assert_eq!(LockTimeout::minutes(2).to_duration(), Duration::from_secs(120));
        assert_eq!(LockTimeout::hours(1).to_duration(), Duration::from_secs(3_600));
        assert_eq!(LockTimeout::days(1).to_duration(), Duration::from_secs(86_400));
    }

    #[test]
    fn non_positive_magnitude_means_no_wait() {
        assert_eq!(LockTimeout::millis(0).to_duration(), Duration::ZERO);
        assert_eq!(LockTimeout::seconds(-5).to_duration(), Duration::ZERO);
    }

    #[test]
    fn huge_magnitude_saturates() {
        let days = LockTimeout::days(i64::MAX).to_duration();
        assert_eq!(days, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn value_equality_and_display() {
        assert_eq!(LockTimeout::millis(500), LockTimeout::new(500, TimeUnit::Milliseconds));
        assert_ne!(LockTimeout::millis(500), LockTimeout::micros(500));
        assert_eq!(LockTimeout::millis(500).to_string(), "500ms");
    }

    #[test]
    fn decorator_over_empty_ignores_timeout() {
        let timed = crate::none::<u8>().with_lock_timeout().nanos(0);
        assert_eq!(timed.timeout(), LockTimeout::nanos(0));
        assert_eq!(timed.execute().value(), None);
    }
}
