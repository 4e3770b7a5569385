//! 延迟组合的锁执行链 [`LockExecution`]。
//!
//! # 模块定位（Why）
//! - 允许调用方在**同一把锁**内串联多个步骤，并通过一次 `execute()` 完成“获取 → 执行 → 释放”；
//! - 组合阶段（`map`/`flat_map`/`filter`/`run`/`supply`）是纯函数式的：只拼接闭包，不触碰锁、不阻塞；
//! - `execute()` 是唯一可能阻塞的操作，失败统一返回 [`Outcome::Failure`]，从不向外 panic。
//!
//! # 结构说明（How）
//! - 执行链是显式的和类型：`Bound`（锁引用 + 已组合的动作）、`Empty`（无锁的单位元）、
//!   `Timed`（被转换回执行链的超时装饰器）；
//! - 动作返回 `Option<T>`：`None` 即 `Empty` 的取值，表示流水线在运行期切换到了空分支；
//! - `flat_map` 在锁内直接求值内层执行链的动作，绝不二次加锁，也不会提前释放。
//!
//! # 契约（What）
//! - 每次 `execute()` 至多获取一次锁；获取成功后，无论正常返回、步骤报错还是 panic，
//!   守卫都会在 `execute()` 返回前释放锁；
//! - 获取本身失败时直接返回失败，不尝试释放；
//! - `Empty` 上的一切组合都是吸收的，`execute()` 立即返回 `Success(None)`，不触碰任何锁。
//!
//! # 已知取舍（Trade-offs）
//! - 一旦涉及 `filter`/`Empty` 切换，执行链**不满足**单子的单位元与结合律：`Empty` 丢弃了锁引用，
//!   但切换发生在外层锁内，外层锁会持有到整条流水线结束。该行为被有意保留，调用方可以依赖它。
//! - `filter` 失败后，需要上一步取值的 `map`/`try_map`/`flat_map` 被跳过；忽略取值的 `run`/`supply`
//!   照常运行并重新产出值。两者都在同一临界区内。

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{BoxError, ExecutionError};
use crate::lock::{ExecutionLock, LockGuard, LockRef};
use crate::outcome::Outcome;
use crate::timeout::{TimeoutBuilder, TimeoutLockExecution};

/// 执行链的最终产出：`None` 表示流水线切换到了 `Empty` 分支。
pub type ExecutionOutcome<T> = Outcome<Option<T>, ExecutionError>;

pub(crate) type Step<T> = Result<Option<T>, ExecutionError>;
pub(crate) type Action<T> = Box<dyn FnOnce() -> Step<T> + Send + 'static>;

/// 执行链的三种形态。
pub(crate) enum Shape<T> {
    Bound { lock: LockRef, action: Action<T> },
    Empty,
    Timed(Box<TimeoutLockExecution<T>>),
}

/// 延迟组合、单次加锁执行的计算链。
///
/// # 示例
/// ```
/// use std::sync::Arc;
/// use spark_lock::{MutexLock, with_lock};
///
/// let lock = Arc::new(MutexLock::new());
/// let outcome = with_lock(lock)
///     .execute(|| vec![3, 1, 2])
///     .filter(|items| !items.is_empty())
///     .map(|items| items.into_iter().max())
///     .execute();
/// assert_eq!(outcome.value(), Some(Some(3)));
/// ```
#[must_use = "执行链是惰性的，必须调用 execute() 才会运行"]
pub struct LockExecution<T> {
    pub(crate) shape: Shape<T>,
}

/// 以指定锁开始构建执行链。
pub fn with_lock<L>(lock: Arc<L>) -> LockExecutionBuilder
where
    L: ExecutionLock + 'static,
{
    LockExecutionBuilder { lock }
}

/// 无锁的单位元执行链。
///
/// 零尺寸变体，不分配、不持锁，可在任意线程上自由共享。
pub fn none<T>() -> LockExecution<T> {
    LockExecution { shape: Shape::Empty }
}

/// [`with_lock`] 返回的构建器，绑定锁并接收首个动作。
#[derive(Clone)]
pub struct LockExecutionBuilder {
    lock: LockRef,
}

impl LockExecutionBuilder {
    /// 以已有的锁引用构建，便于多个执行链共享同一把锁。
    pub fn from_ref(lock: LockRef) -> Self {
        Self { lock }
    }

    /// 首个步骤为产出值的函数。
    pub fn execute<T, F>(self, supplier: F) -> LockExecution<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        LockExecution::bound(self.lock, move || Ok(Some(supplier())))
    }

    /// 首个步骤为副作用过程。
    pub fn run<F>(self, procedure: F) -> LockExecution<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(procedure)
    }

    /// 首个步骤为可失败的函数；`Err` 在执行期转为 [`ExecutionError::Action`]。
    pub fn try_execute<T, E, F>(self, supplier: F) -> LockExecution<T>
    where
        T: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        LockExecution::bound(self.lock, move || {
            supplier().map(Some).map_err(ExecutionError::action)
        })
    }
}

impl fmt::Debug for LockExecutionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockExecutionBuilder")
            .field("lock", &self.lock.label())
            .finish()
    }
}

impl<T: Send + 'static> LockExecution<T> {
    pub(crate) fn bound<F>(lock: LockRef, action: F) -> Self
    where
        F: FnOnce() -> Step<T> + Send + 'static,
    {
        Self {
            shape: Shape::Bound {
                lock,
                action: Box::new(action),
            },
        }
    }

    /// 在当前值上追加一个变换。
    pub fn map<K, F>(self, mapper: F) -> LockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce(T) -> K + Send + 'static,
    {
        match self.shape {
            Shape::Bound { lock, action } => {
                LockExecution::bound(lock, move || action().map(|value| value.map(mapper)))
            }
            Shape::Empty => none(),
            Shape::Timed(timed) => timed.map(mapper).into(),
        }
    }

    /// 追加一个可失败的变换；`Err` 在执行期转为 [`ExecutionError::Action`]，锁照常释放。
    pub fn try_map<K, E, F>(self, mapper: F) -> LockExecution<K>
    where
        K: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce(T) -> Result<K, E> + Send + 'static,
    {
        match self.shape {
            Shape::Bound { lock, action } => LockExecution::bound(lock, move || match action()? {
                Some(value) => mapper(value).map(Some).map_err(ExecutionError::action),
                None => Ok(None),
            }),
            Shape::Empty => none(),
            Shape::Timed(timed) => timed.try_map(mapper).into(),
        }
    }

    /// 以当前值构造下一段执行链，并在**同一临界区**内直接求值其动作。
    ///
    /// `mapper` 返回的执行链所绑定的锁不会被获取；返回 [`none`] 时整条流水线的结果切换为 `None`，
    /// 但外层锁依旧持有到流水线结束。
    pub fn flat_map<K, F>(self, mapper: F) -> LockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce(T) -> LockExecution<K> + Send + 'static,
    {
        match self.shape {
            Shape::Bound { lock, action } => LockExecution::bound(lock, move || match action()? {
                Some(value) => mapper(value).evaluate_in_place(),
                None => Ok(None),
            }),
            Shape::Empty => none(),
            Shape::Timed(timed) => timed.flat_map(mapper).into(),
        }
    }

    /// 谓词不成立时切换到 `Empty` 分支。
    ///
    /// 等价于 `flat_map(|v| if predicate(&v) { 同一把锁上返回 v 的执行链 } else { none() })`。
    pub fn filter<P>(self, predicate: P) -> LockExecution<T>
    where
        P: FnOnce(&T) -> bool + Send + 'static,
    {
        match self.shape {
            Shape::Bound { lock, action } => {
                let same = Arc::clone(&lock);
                let current = LockExecution {
                    shape: Shape::Bound { lock, action },
                };
                current.flat_map(move |value| {
                    if predicate(&value) {
                        LockExecution::bound(same, move || Ok(Some(value)))
                    } else {
                        none()
                    }
                })
            }
            Shape::Empty => none(),
            Shape::Timed(timed) => timed.filter(predicate).into(),
        }
    }

    /// 忽略当前值，追加一个副作用过程。
    ///
    /// 不依赖上一步的值，因此即使流水线已切换到 `Empty` 分支也照常运行。
    pub fn run<F>(self, procedure: F) -> LockExecution<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.supply(procedure)
    }

    /// 忽略当前值，以 `supplier` 的产出替换之。
    ///
    /// 与 [`run`](Self::run) 相同，在 `filter` 失败之后依旧运行并产出值。
    pub fn supply<K, F>(self, supplier: F) -> LockExecution<K>
    where
        K: Send + 'static,
        F: FnOnce() -> K + Send + 'static,
    {
        match self.shape {
            Shape::Bound { lock, action } => LockExecution::bound(lock, move || {
                action()?;
                Ok(Some(supplier()))
            }),
            Shape::Empty => none(),
            Shape::Timed(timed) => timed.supply(supplier).into(),
        }
    }

    /// 为执行链配置限时获取。
    pub fn with_lock_timeout(self) -> TimeoutBuilder<T> {
        TimeoutBuilder::new(self)
    }

    /// 获取锁、执行整条流水线并释放锁。
    pub fn execute(self) -> ExecutionOutcome<T> {
        match self.shape {
            Shape::Bound { lock, action } => {
                let guard = match lock.lock() {
                    Ok(guard) => guard,
                    Err(source) => {
                        return failed(ExecutionError::Acquisition {
                            lock: lock.label().to_owned(),
                            source,
                        });
                    }
                };
                run_guarded(lock.as_ref(), guard, action)
            }
            Shape::Empty => Outcome::Success(None),
            Shape::Timed(timed) => timed.execute(),
        }
    }

    /// 不加锁地求值动作，供外层执行链在已持锁的临界区内调用。
    pub(crate) fn evaluate_in_place(self) -> Step<T> {
        match self.shape {
            Shape::Bound { action, .. } => action(),
            Shape::Empty => Ok(None),
            Shape::Timed(timed) => timed.into_inner().evaluate_in_place(),
        }
    }
}

impl<T> LockExecution<T> {
    /// 是否为无锁的 `Empty` 单位元。
    pub fn is_empty(&self) -> bool {
        matches!(self.shape, Shape::Empty)
    }

    /// 执行时将要获取的锁；`Empty` 返回 `None`。
    pub fn lock(&self) -> Option<&LockRef> {
        match &self.shape {
            Shape::Bound { lock, .. } => Some(lock),
            Shape::Empty => None,
            Shape::Timed(timed) => timed.inner().lock(),
        }
    }
}

impl<T> fmt::Debug for LockExecution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Bound { lock, .. } => f
                .debug_struct("LockExecution::Bound")
                .field("lock", &lock.label())
                .finish_non_exhaustive(),
            Shape::Empty => f.write_str("LockExecution::Empty"),
            Shape::Timed(timed) => f
                .debug_tuple("LockExecution::Timed")
                .field(&timed.timeout())
                .finish(),
        }
    }
}

/// 在已持有的守卫下执行动作，并在返回前释放锁。
///
/// panic 被 `catch_unwind` 捕获并转为 [`ExecutionError::Panicked`]；守卫在结果映射之前显式丢弃，
/// 因此调用方拿到 `Outcome` 时锁一定已经释放。
pub(crate) fn run_guarded<T>(
    lock: &dyn ExecutionLock,
    guard: LockGuard<'_>,
    action: Action<T>,
) -> ExecutionOutcome<T> {
    trace!(lock = lock.label(), "lock acquired");
    let evaluated = panic::catch_unwind(AssertUnwindSafe(action));
    drop(guard);
    trace!(lock = lock.label(), "lock released");

    match evaluated {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(error)) => failed(error),
        Err(payload) => failed(ExecutionError::panicked(payload)),
    }
}

pub(crate) fn failed<T>(error: ExecutionError) -> ExecutionOutcome<T> {
    debug!(code = error.code(), %error, "lock execution failed");
    Outcome::Failure(error)
}
