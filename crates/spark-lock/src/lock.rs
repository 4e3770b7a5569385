//! 锁提供者抽象：执行链只引用调用方拥有的锁，从不自行构造。
//!
//! # 模块定位（Why）
//! - 执行链需要在 `execute()` 内“获取一次、释放一次”，但并不关心锁的具体实现：
//!   普通互斥锁、可重入锁、读写锁的某一侧、自旋锁，乃至调用方自定义的原语；
//! - 因此以对象安全的 [`ExecutionLock`] trait 描述“阻塞获取 / 限时获取”两种能力，
//!   由 RAII 守卫 [`LockGuard`] 负责释放，保证任何退出路径（含 panic 展开）都会解锁。
//!
//! # 结构说明（How）
//! - [`LockGuard`] 内部以枚举保存 parking_lot / spin 的具体守卫，`Drop` 时依据公平模式选择
//!   `unlock_fair` 或普通释放；
//! - 自定义提供者通过 [`LockGuard::with_release`] 注入释放逻辑；
//! - 读写锁两侧分别由 [`ReadLock`]、[`WriteLock`] 表示，共享同一把 [`ReentrantRwLock`]；
//!   写锁持有者可以再次进入任一侧。
//!
//! # 契约（What）
//! - `lock()` 返回 `Err` 表示获取本身失败，此时调用方不得、也无法释放；
//! - `try_lock_for()` 返回 `Ok(None)` 表示预算耗尽仍未拿到锁；
//! - 守卫被丢弃即释放，不存在“忘记解锁”的路径。

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{
    Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use serde::{Deserialize, Serialize};

use crate::error::AcquireError;

/// 执行链持有的锁引用。
pub type LockRef = Arc<dyn ExecutionLock>;

/// 可被执行链驱动的互斥原语。
///
/// # 契约说明（What）
/// - 实现必须满足 `Send + Sync`：执行链可以在任意线程上执行；
/// - 两个方法都只在 `execute()` 内被调用，且每次执行至多调用一次；
/// - 返回的 [`LockGuard`] 生命周期借用自 `self`，丢弃即释放。
pub trait ExecutionLock: Send + Sync {
    /// 阻塞直至获取锁。
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError>;

    /// 在 `timeout` 预算内尝试获取锁；预算为零时只尝试一次。
    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError>;

    /// 用于日志与错误上下文的可读名称。
    fn label(&self) -> &str {
        "lock"
    }
}

impl fmt::Debug for dyn ExecutionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionLock")
            .field("label", &self.label())
            .finish()
    }
}

/// 解锁时的交接策略。
///
/// - `Barging`：释放后允许任意线程抢占，吞吐优先；读写锁的读侧允许同线程重入；
/// - `Fair`：释放时直接交接给排队最久的等待者（parking_lot `unlock_fair`），读侧排在等待中的写者之后。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fairness {
    #[default]
    Barging,
    Fair,
}

impl Fairness {
    pub fn is_fair(self) -> bool {
        matches!(self, Self::Fair)
    }
}

/// 持锁凭证；丢弃即释放。
#[must_use = "守卫被丢弃时立即释放锁"]
pub struct LockGuard<'a> {
    inner: Option<GuardInner<'a>>,
    fairness: Fairness,
}

enum GuardInner<'a> {
    Mutex(MutexGuard<'a, ()>),
    Reentrant(ReentrantMutexGuard<'a, ()>),
    Read(RwLockReadGuard<'a, ()>),
    OwnedWrite {
        guard: RwLockWriteGuard<'a, ()>,
        owner: &'a Mutex<Option<WriteOwner>>,
    },
    #[cfg(feature = "spin")]
    Spin(#[allow(dead_code)] crate::spin::SpinGuard<'a>),
    Release(Box<dyn FnOnce() + 'a>),
}

impl<'a> LockGuard<'a> {
    fn new(inner: GuardInner<'a>, fairness: Fairness) -> Self {
        Self {
            inner: Some(inner),
            fairness,
        }
    }

    /// 以自定义释放逻辑构造守卫，供第三方 [`ExecutionLock`] 实现使用。
    ///
    /// `release` 在守卫被丢弃时恰好执行一次。
    pub fn with_release(release: impl FnOnce() + 'a) -> Self {
        Self::new(GuardInner::Release(Box::new(release)), Fairness::Barging)
    }

    #[cfg(feature = "spin")]
    pub(crate) fn spin(guard: crate::spin::SpinGuard<'a>) -> Self {
        Self::new(GuardInner::Spin(guard), Fairness::Barging)
    }

    pub fn fairness(&self) -> Fairness {
        self.fairness
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let fair = self.fairness.is_fair();
        match self.inner.take() {
            Some(GuardInner::Mutex(guard)) if fair => MutexGuard::unlock_fair(guard),
            Some(GuardInner::Reentrant(guard)) if fair => ReentrantMutexGuard::unlock_fair(guard),
            Some(GuardInner::Read(guard)) if fair => RwLockReadGuard::unlock_fair(guard),
            Some(GuardInner::OwnedWrite { guard, owner }) => {
                // 先撤销持有者登记，再释放底层写锁
                *owner.lock() = None;
                if fair {
                    RwLockWriteGuard::unlock_fair(guard);
                } else {
                    drop(guard);
                }
            }
            Some(GuardInner::Release(release)) => release(),
            Some(other) => drop(other),
            None => {}
        }
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("fairness", &self.fairness)
            .finish_non_exhaustive()
    }
}

impl ExecutionLock for Mutex<()> {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::new(GuardInner::Mutex(Mutex::lock(self)), Fairness::Barging))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(Mutex::try_lock_for(self, timeout)
            .map(|guard| LockGuard::new(GuardInner::Mutex(guard), Fairness::Barging)))
    }

    fn label(&self) -> &str {
        "mutex"
    }
}

impl ExecutionLock for ReentrantMutex<()> {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::new(
            GuardInner::Reentrant(ReentrantMutex::lock(self)),
            Fairness::Barging,
        ))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(ReentrantMutex::try_lock_for(self, timeout)
            .map(|guard| LockGuard::new(GuardInner::Reentrant(guard), Fairness::Barging)))
    }

    fn label(&self) -> &str {
        "reentrant_mutex"
    }
}

/// 可配置公平策略的互斥锁。
#[derive(Debug, Default)]
pub struct MutexLock {
    inner: Mutex<()>,
    fairness: Fairness,
}

impl MutexLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 释放时直接交接给等待者的公平互斥锁。
    pub fn fair() -> Self {
        Self::with_fairness(Fairness::Fair)
    }

    pub fn with_fairness(fairness: Fairness) -> Self {
        Self {
            inner: Mutex::new(()),
            fairness,
        }
    }

    /// 当前是否有线程持有该锁。
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl ExecutionLock for MutexLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::new(GuardInner::Mutex(self.inner.lock()), self.fairness))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(self
            .inner
            .try_lock_for(timeout)
            .map(|guard| LockGuard::new(GuardInner::Mutex(guard), self.fairness)))
    }

    fn label(&self) -> &str {
        match self.fairness {
            Fairness::Barging => "mutex",
            Fairness::Fair => "fair_mutex",
        }
    }
}

/// 写侧可重入的读写锁。
///
/// 持有写锁的线程可以再次获取读侧或写侧而不阻塞，嵌套获取只增加持有计数，
/// 由最外层写守卫真正释放。读锁不能升级：持有读锁的线程请求写侧会一直等待。
#[derive(Debug, Default)]
pub struct ReentrantRwLock {
    inner: RwLock<()>,
    owner: Mutex<Option<WriteOwner>>,
}

#[derive(Debug)]
struct WriteOwner {
    thread: ThreadId,
    nested: usize,
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前线程对写锁的持有次数；未持有时为 0。
    pub fn write_hold_count(&self) -> usize {
        let current = thread::current().id();
        match self.owner.lock().as_ref() {
            Some(owner) if owner.thread == current => owner.nested + 1,
            _ => 0,
        }
    }

    pub fn is_write_locked(&self) -> bool {
        self.inner.is_locked_exclusive()
    }

    /// 当前线程已持有写锁时登记一次嵌套获取。
    fn reenter(&self) -> Option<LockGuard<'_>> {
        let current = thread::current().id();
        let mut owner = self.owner.lock();
        match owner.as_mut() {
            Some(owner) if owner.thread == current => {
                owner.nested += 1;
                Some(LockGuard::with_release(move || self.leave()))
            }
            _ => None,
        }
    }

    fn leave(&self) {
        if let Some(owner) = self.owner.lock().as_mut() {
            owner.nested = owner.nested.saturating_sub(1);
        }
    }

    fn own<'a>(&'a self, guard: RwLockWriteGuard<'a, ()>, fairness: Fairness) -> LockGuard<'a> {
        *self.owner.lock() = Some(WriteOwner {
            thread: thread::current().id(),
            nested: 0,
        });
        LockGuard::new(
            GuardInner::OwnedWrite {
                guard,
                owner: &self.owner,
            },
            fairness,
        )
    }
}

/// 读写锁的共享（读）侧。
///
/// `Barging` 模式下使用 `read_recursive`：持有读锁的线程可以再次进入读侧，
/// 代价是持续的读流量可能让写者等待更久；`Fair` 模式下新读者排在等待中的写者之后。
/// 写锁持有者进入读侧时不经过底层读锁。
#[derive(Clone, Debug)]
pub struct ReadLock {
    lock: Arc<ReentrantRwLock>,
    fairness: Fairness,
}

/// 读写锁的独占（写）侧；同一线程可重入。
#[derive(Clone, Debug)]
pub struct WriteLock {
    lock: Arc<ReentrantRwLock>,
    fairness: Fairness,
}

impl ReadLock {
    pub fn new(lock: Arc<ReentrantRwLock>, fairness: Fairness) -> Self {
        Self { lock, fairness }
    }
}

impl WriteLock {
    pub fn new(lock: Arc<ReentrantRwLock>, fairness: Fairness) -> Self {
        Self { lock, fairness }
    }
}

impl ExecutionLock for ReadLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        if let Some(nested) = self.lock.reenter() {
            return Ok(nested);
        }
        let guard = match self.fairness {
            Fairness::Barging => self.lock.inner.read_recursive(),
            Fairness::Fair => self.lock.inner.read(),
        };
        Ok(LockGuard::new(GuardInner::Read(guard), self.fairness))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        if let Some(nested) = self.lock.reenter() {
            return Ok(Some(nested));
        }
        let guard = match self.fairness {
            Fairness::Barging => self.lock.inner.try_read_recursive_for(timeout),
            Fairness::Fair => self.lock.inner.try_read_for(timeout),
        };
        Ok(guard.map(|guard| LockGuard::new(GuardInner::Read(guard), self.fairness)))
    }

    fn label(&self) -> &str {
        "rwlock.read"
    }
}

impl ExecutionLock for WriteLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        if let Some(nested) = self.lock.reenter() {
            return Ok(nested);
        }
        let guard = self.lock.inner.write();
        Ok(self.lock.own(guard, self.fairness))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        if let Some(nested) = self.lock.reenter() {
            return Ok(Some(nested));
        }
        Ok(self
            .lock
            .inner
            .try_write_for(timeout)
            .map(|guard| self.lock.own(guard, self.fairness)))
    }

    fn label(&self) -> &str {
        "rwlock.write"
    }
}

/// 从共享的 [`ReentrantRwLock`] 派生读写两侧句柄。
pub trait RwLockSides {
    fn read_lock(&self, fairness: Fairness) -> LockRef;
    fn write_lock(&self, fairness: Fairness) -> LockRef;
}

impl RwLockSides for Arc<ReentrantRwLock> {
    fn read_lock(&self, fairness: Fairness) -> LockRef {
        Arc::new(ReadLock::new(Arc::clone(self), fairness))
    }

    fn write_lock(&self, fairness: Fairness) -> LockRef {
        Arc::new(WriteLock::new(Arc::clone(self), fairness))
    }
}
