//! 读写锁门面 [`ReadWriteLock`]。
//!
//! 包装一把 [`ReentrantRwLock`]，分别以读侧、写侧开启执行链。克隆得到的句柄共享同一把锁。
//! 写锁持有者可以在写执行链内部再开启同一门面上的读或写执行链，不会自锁。
//!
//! - [`ReadWriteLock::new`]：抢占式交接，读侧可在同一线程内重入（不会因等待中的写者而自锁）；
//! - [`ReadWriteLock::new_fair`]：释放时直接交接给排队最久的等待者，读者排在等待中的写者之后。

use std::fmt;
use std::sync::Arc;

use crate::config::LockSettings;
use crate::execution::{LockExecution, LockExecutionBuilder};
use crate::lock::{Fairness, LockRef, ReentrantRwLock, RwLockSides};

#[derive(Clone)]
pub struct ReadWriteLock {
    fairness: Fairness,
    read: LockRef,
    write: LockRef,
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self::with_fairness(Fairness::Barging)
    }

    pub fn new_fair() -> Self {
        Self::with_fairness(Fairness::Fair)
    }

    pub fn with_fairness(fairness: Fairness) -> Self {
        let shared = Arc::new(ReentrantRwLock::new());
        Self {
            fairness,
            read: shared.read_lock(fairness),
            write: shared.write_lock(fairness),
        }
    }

    pub fn from_settings(settings: &LockSettings) -> Self {
        Self::with_fairness(settings.fairness)
    }

    pub fn fairness(&self) -> Fairness {
        self.fairness
    }

    /// 在读侧执行 `supplier`，可与其他读者并发。
    pub fn read<T, F>(&self, supplier: F) -> LockExecution<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        LockExecutionBuilder::from_ref(self.read_lock()).execute(supplier)
    }

    /// 在写侧执行 `supplier`，与所有读者、写者互斥。
    pub fn write<T, F>(&self, supplier: F) -> LockExecution<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        LockExecutionBuilder::from_ref(self.write_lock()).execute(supplier)
    }

    pub fn write_run<F>(&self, procedure: F) -> LockExecution<()>
    where
        F: FnOnce() + Send + 'static,
    {
        LockExecutionBuilder::from_ref(self.write_lock()).run(procedure)
    }

    pub fn read_lock(&self) -> LockRef {
        Arc::clone(&self.read)
    }

    pub fn write_lock(&self) -> LockRef {
        Arc::clone(&self.write)
    }
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadWriteLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("fairness", &self.fairness)
            .finish_non_exhaustive()
    }
}
