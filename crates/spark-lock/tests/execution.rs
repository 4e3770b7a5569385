//! 执行链端到端行为验证。
//!
//! - **Why**：执行链的核心承诺是“每次 `execute()` 至多获取一次锁，且返回前必然释放”；
//!   本套件以计数锁观测获取/释放次数，覆盖正常、过滤失败、步骤报错、panic、获取失败等退出路径。
//! - **How**：`CountingLock` 通过 [`LockGuard::with_release`] 注入释放回调，记录两类计数；
//!   `FailingLock` 在获取阶段直接报错。
//! - **What**：所有用例都断言 `acquired == released`（获取失败时两者皆为零）。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use spark_lock::{
    AcquireError, ExecutionError, ExecutionLock, LockExecutionBuilder, LockGuard, MutexLock,
    codes, none, with_lock,
};

#[derive(Default)]
struct CountingLock {
    inner: Mutex<()>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingLock {
    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn held(&self) -> bool {
        self.inner.is_locked()
    }
}

impl ExecutionLock for CountingLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        let guard = self.inner.lock();
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(LockGuard::with_release(move || {
            drop(guard);
            self.released.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Ok(self.inner.try_lock_for(timeout).map(|guard| {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            LockGuard::with_release(move || {
                drop(guard);
                self.released.fetch_add(1, Ordering::SeqCst);
            })
        }))
    }

    fn label(&self) -> &str {
        "counting"
    }
}

struct FailingLock;

impl ExecutionLock for FailingLock {
    fn lock(&self) -> Result<LockGuard<'_>, AcquireError> {
        Err(AcquireError::new("lock store closed"))
    }

    fn try_lock_for(&self, _timeout: Duration) -> Result<Option<LockGuard<'_>>, AcquireError> {
        Err(AcquireError::new("lock store closed"))
    }

    fn label(&self) -> &str {
        "failing"
    }
}

#[test]
fn whole_pipeline_runs_under_a_single_acquisition() {
    let lock = Arc::new(CountingLock::default());
    let observer = Arc::clone(&lock);
    let outcome = with_lock(Arc::clone(&lock))
        .execute(|| 2)
        .map(|value| value * 10)
        .flat_map(|value| none::<i32>().supply(move || value))
        .filter(|_| true)
        .supply(|| "ignored")
        .run(|| ())
        .map(move |()| observer.held())
        .execute();

    // supply/run 不依赖取值，切换到 none() 之后仍在同一临界区内运行
    assert_eq!(outcome.value(), Some(true));
    assert_eq!(lock.acquired(), 1);
    assert_eq!(lock.released(), 1);
}

#[test]
fn later_steps_observe_the_lock_held() {
    let lock = Arc::new(CountingLock::default());
    let first = Arc::clone(&lock);
    let second = Arc::clone(&lock);
    let outcome = with_lock(Arc::clone(&lock))
        .execute(move || first.held())
        .filter(|held| *held)
        .map(move |held| held && second.held())
        .execute();
    assert_eq!(outcome.value(), Some(true));
    assert!(!lock.held());
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}

#[test]
fn inner_chain_lock_is_never_acquired() {
    let outer = Arc::new(CountingLock::default());
    let inner = Arc::new(CountingLock::default());
    let inner_ref = Arc::clone(&inner);
    let outcome = with_lock(Arc::clone(&outer))
        .execute(|| 4)
        .flat_map(move |value| with_lock(inner_ref).execute(move || value + 1))
        .map(|value| value * 2)
        .execute();

    assert_eq!(outcome.value(), Some(10));
    assert_eq!((outer.acquired(), outer.released()), (1, 1));
    assert_eq!(inner.acquired(), 0, "内层执行链只在外层临界区内求值");
}

#[test]
fn failed_filter_yields_empty_and_skips_later_steps() {
    let lock = Arc::new(CountingLock::default());
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let outcome = with_lock(Arc::clone(&lock))
        .execute(|| 1)
        .filter(|value| *value > 1)
        .map(move |value| {
            flag.store(true, Ordering::SeqCst);
            value
        })
        .execute();

    assert!(outcome.is_success());
    assert_eq!(outcome.value(), None);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}

#[test]
fn value_ignoring_steps_still_run_after_failed_filter() {
    let lock = Arc::new(CountingLock::default());
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let observer = Arc::clone(&lock);
    let outcome = with_lock(Arc::clone(&lock))
        .execute(|| 1)
        .filter(|value| *value > 1)
        .run(move || flag.store(observer.held(), Ordering::SeqCst))
        .supply(|| 5)
        .execute();

    assert_eq!(outcome.value(), Some(5));
    assert!(ran.load(Ordering::SeqCst), "run 必须在持锁状态下执行");
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}

#[test]
fn map_after_failed_filter_is_skipped_but_supply_recovers() {
    let lock = Arc::new(CountingLock::default());
    let outcome = with_lock(Arc::clone(&lock))
        .execute(|| 1)
        .filter(|value| *value > 1)
        .map(|value| value * 100)
        .supply(|| 7)
        .map(|value| value + 1)
        .execute();
    assert_eq!(outcome.value(), Some(8));
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}

#[test]
fn acquisition_failure_runs_nothing() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let outcome = with_lock(Arc::new(FailingLock))
        .execute(move || flag.store(true, Ordering::SeqCst))
        .execute();

    let error = outcome.error();
    assert_eq!(error.code(), codes::ACQUIRE_FAILED);
    assert!(error.is_before_lock());
    assert!(matches!(
        error,
        ExecutionError::Acquisition { ref lock, ref source }
            if lock == "failing" && source.reason() == "lock store closed"
    ));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn step_error_releases_the_lock() {
    let lock = Arc::new(CountingLock::default());
    let outcome = with_lock(Arc::clone(&lock))
        .try_execute(|| "not a number".parse::<i64>())
        .map(|value| value + 1)
        .execute();

    let error = outcome.error();
    assert_eq!(error.code(), codes::ACTION_FAILED);
    assert!(!error.is_before_lock());
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}

#[test]
fn panicking_step_releases_the_lock() {
    let lock = Arc::new(CountingLock::default());
    let outcome = with_lock(Arc::clone(&lock))
        .execute(|| vec![1, 2, 3])
        .map(|items| items[10])
        .execute();

    assert_eq!(outcome.error().code(), codes::ACTION_PANICKED);
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
    assert!(!lock.held());
}

#[test]
fn empty_chain_never_touches_a_lock() {
    let outcome = none::<u32>().map(|value| value + 1).execute();
    assert!(outcome.is_success());
    assert_eq!(outcome.value(), None);
}

#[test]
fn shared_builder_serializes_concurrent_executions() {
    let builder = LockExecutionBuilder::from_ref(Arc::new(MutexLock::new()));
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let builder = builder.clone();
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for _ in 0..25 {
                    let inside = Arc::clone(&inside);
                    let overlaps = Arc::clone(&overlaps);
                    let outcome = builder
                        .clone()
                        .run(move || {
                            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .execute();
                    assert!(outcome.is_success());
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("工作线程异常退出");
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0, "临界区不得重叠");
}

#[test]
fn chain_built_on_one_thread_executes_on_another() {
    let lock = Arc::new(CountingLock::default());
    let chain = with_lock(Arc::clone(&lock))
        .execute(|| String::from("built here"))
        .map(|text| text.len());
    let outcome = thread::spawn(move || chain.execute())
        .join()
        .expect("执行线程异常退出");
    assert_eq!(outcome.value(), Some(10));
    assert_eq!((lock.acquired(), lock.released()), (1, 1));
}
