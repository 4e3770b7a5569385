#![deny(unsafe_code)]
#![doc = "spark-lock: 延迟组合、单次加锁执行的锁守护计算链。"]
#![doc = ""]
#![doc = "== 核心模型 =="]
#![doc = "1. 以 [`with_lock`] 绑定调用方拥有的锁，再以 `map`/`flat_map`/`filter`/`run`/`supply` 串联步骤；组合阶段不触碰锁。"]
#![doc = "2. [`LockExecution::execute`] 获取一次锁，在同一临界区内依次运行全部步骤，返回前必然释放；结果以 [`Outcome`] 返回，从不向外 panic。"]
#![doc = "3. [`none`] 是无锁的单位元：在其上的一切组合都被吸收，执行立即返回 `Success(None)`。"]
#![doc = "4. [`LockExecution::with_lock_timeout`] 把阻塞获取替换为限时获取，预算耗尽时快速失败。"]
#![doc = ""]
#![doc = "== 外围设施 =="]
#![doc = "- [`ReadWriteLock`]：读写锁门面，分别以读侧、写侧开启执行链；"]
#![doc = "- [`LockExecutionThreadFactory`]：为持锁任务创建具名、带优先级标记的执行线程；"]
#![doc = "- [`LockSettings`]：以 TOML 描述公平策略、默认超时与线程命名；"]
#![doc = "- 日志统一经由 `tracing` 输出，本 crate 不安装任何订阅者。"]

pub mod config;
pub mod error;
pub mod execution;
pub mod lock;
pub mod outcome;
pub mod rwlock;
#[cfg(feature = "spin")]
pub mod spin;
pub mod thread;
pub mod timeout;

pub use config::{ConfigError, LockSettings, ThreadSettings};
pub use error::{AcquireError, BoxError, ExecutionError, codes};
pub use execution::{ExecutionOutcome, LockExecution, LockExecutionBuilder, none, with_lock};
pub use lock::{
    ExecutionLock, Fairness, LockGuard, LockRef, MutexLock, ReadLock, ReentrantRwLock,
    RwLockSides, WriteLock,
};
pub use outcome::Outcome;
pub use rwlock::ReadWriteLock;
#[cfg(feature = "spin")]
pub use crate::spin::{SpinReadLock, SpinWriteLock};
pub use thread::{LockExecutionThreadFactory, ThreadPriority, current_thread_priority};
pub use timeout::{LockTimeout, TimeUnit, TimeoutBuilder, TimeoutLockExecution};
