//! 执行线程工厂 [`LockExecutionThreadFactory`]。
//!
//! 为持锁任务创建具名线程：名称形如 `"{prefix}-{n}"`，`n` 从 1 开始严格递增。
//! 线程创建后即脱离管理，进程退出时不会等待它们（守护语义）。
//!
//! 标准库不提供可移植的线程优先级设置，这里把优先级作为线程本地属性记录，
//! 任务内可通过 [`current_thread_priority`] 读取并自行决定调度策略。

use std::cell::Cell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LockSettings, ThreadSettings};

/// 非阻塞线程的栈大小。
const NON_BLOCKING_STACK_SIZE: usize = 256 * 1024;

/// 线程优先级，取值范围 `1..=10`，越大越优先。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct ThreadPriority(u8);

impl ThreadPriority {
    pub const MIN: Self = Self(1);
    pub const NORM: Self = Self(5);
    pub const MAX: Self = Self(10);

    /// 构造优先级，越界值被夹取到 `[MIN, MAX]`。
    pub const fn new(value: u8) -> Self {
        if value < Self::MIN.0 {
            Self::MIN
        } else if value > Self::MAX.0 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for ThreadPriority {
    fn default() -> Self {
        Self::NORM
    }
}

impl From<u8> for ThreadPriority {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<ThreadPriority> for u8 {
    fn from(priority: ThreadPriority) -> Self {
        priority.0
    }
}

thread_local! {
    static PRIORITY: Cell<Option<ThreadPriority>> = const { Cell::new(None) };
}

/// 当前线程的优先级；非工厂创建的线程返回 `None`。
pub fn current_thread_priority() -> Option<ThreadPriority> {
    PRIORITY.with(Cell::get)
}

/// 以统一前缀与优先级创建执行线程的工厂，可在多个线程间共享。
#[derive(Debug)]
pub struct LockExecutionThreadFactory {
    prefix: String,
    priority: ThreadPriority,
    non_blocking: bool,
    counter: AtomicU64,
}

impl LockExecutionThreadFactory {
    pub fn new(prefix: impl Into<String>, priority: ThreadPriority) -> Self {
        Self {
            prefix: prefix.into(),
            priority,
            non_blocking: false,
            counter: AtomicU64::new(0),
        }
    }

    /// 创建非阻塞线程的工厂：线程栈更小，只适合不会阻塞的短任务。
    pub fn non_blocking(prefix: impl Into<String>, priority: ThreadPriority) -> Self {
        Self {
            non_blocking: true,
            ..Self::new(prefix, priority)
        }
    }

    pub fn from_settings(settings: &LockSettings) -> Self {
        Self::from_thread_settings(&settings.thread)
    }

    pub fn from_thread_settings(settings: &ThreadSettings) -> Self {
        if settings.non_blocking {
            Self::non_blocking(settings.prefix.clone(), settings.priority)
        } else {
            Self::new(settings.prefix.clone(), settings.priority)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn priority(&self) -> ThreadPriority {
        self.priority
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    /// 在新线程上运行 `task`。
    ///
    /// 每次调用都会消耗一个序号，即使操作系统拒绝创建线程。
    pub fn spawn<F, R>(&self, task: F) -> io::Result<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let name = self.next_name();
        let mut builder = thread::Builder::new().name(name.clone());
        if self.non_blocking {
            builder = builder.stack_size(NON_BLOCKING_STACK_SIZE);
        }
        let priority = self.priority;
        debug!(
            thread = %name,
            priority = priority.get(),
            non_blocking = self.non_blocking,
            "spawning lock execution thread"
        );
        builder.spawn(move || {
            PRIORITY.with(|slot| slot.set(Some(priority)));
            task()
        })
    }

    fn next_name(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, sequence)
    }
}

impl fmt::Display for LockExecutionThreadFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockExecutionThreadFactory[{}]", self.prefix)
    }
}
