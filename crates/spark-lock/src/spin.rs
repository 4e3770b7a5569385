//! 基于 `spin` 的锁提供者。
//!
//! 自旋原语没有原生的限时获取，这里以截止时间轮询 `try_lock` 实现；截止时间溢出
//! （预算过大）时退化为不限时自旋。适用于临界区极短、或宿主不提供 OS 阻塞原语的场景。

use std::hint;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::AcquireError;
use crate::lock::{ExecutionLock, LockGuard};

/// 自旋守卫；丢弃即释放。
pub(crate) enum SpinGuard<'a> {
    Mutex(#[allow(dead_code)] MutexGuard<'a, ()>),
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

const SPINS_BEFORE_YIELD: u32 = 64;

/// 在截止时间前反复尝试 `attempt`。
fn spin_until<'a, G>(
    timeout: Duration,
    mut attempt: impl FnMut() -> Option<G>,
    wrap: impl FnOnce(G) -> SpinGuard<'a>,
) -> Option<LockGuard<'a>> {
    let deadline = Instant::now().checked_add(timeout);
    let mut spins = 0_u32;
    loop {
        if let Some(guard) = attempt() {
            return Some(LockGuard::spin(wrap(guard)));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return None;
        }
        spins = spins.wrapping_add(1);
        if spins % SPINS_BEFORE_YIELD == 0 {
            std::thread::yield_now();
        } else {
            hint::spin_loop();
        }
    }
}

impl ExecutionLock for Mutex<()> {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::spin(SpinGuard::Mutex(Mutex::lock(self))))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(spin_until(timeout, || Mutex::try_lock(self), SpinGuard::Mutex))
    }

    fn label(&self) -> &str {
        "spin_mutex"
    }
}

/// 自旋读写锁的读侧。
#[derive(Clone, Debug)]
pub struct SpinReadLock {
    lock: Arc<RwLock<()>>,
}

/// 自旋读写锁的写侧。
#[derive(Clone, Debug)]
pub struct SpinWriteLock {
    lock: Arc<RwLock<()>>,
}

impl SpinReadLock {
    pub fn new(lock: Arc<RwLock<()>>) -> Self {
        Self { lock }
    }
}

impl SpinWriteLock {
    pub fn new(lock: Arc<RwLock<()>>) -> Self {
        Self { lock }
    }
}

impl ExecutionLock for SpinReadLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::spin(SpinGuard::Read(self.lock.read())))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(spin_until(timeout, || self.lock.try_read(), SpinGuard::Read))
    }

    fn label(&self) -> &str {
        "spin_rwlock.read"
    }
}

impl ExecutionLock for SpinWriteLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Ok(LockGuard::spin(SpinGuard::Write(self.lock.write())))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(spin_until(timeout, || self.lock.try_write(), SpinGuard::Write))
    }

    fn label(&self) -> &str {
        "spin_rwlock.write"
    }
}
