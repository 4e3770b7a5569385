use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use spark_lock::{MutexLock, ReadWriteLock, none, with_lock};

/// 度量执行链相对于直接加锁的额外开销。
///
/// # 设计目的（Why）
/// - 每个步骤都会装箱一次闭包，`execute()` 还包含 `catch_unwind`；需要量化无竞争场景下的固定成本。
///
/// # 执行逻辑（How）
/// - `direct_mutex`：直接 `parking_lot::Mutex::lock` 作为基线；
/// - `single_step` / `five_steps`：同一把锁上组合不同长度的流水线；
/// - `empty_chain`：`none()` 上组合步骤，验证吸收路径无锁、无分配；
/// - `rw_read`：读写锁门面的读侧。
fn bench_execution(c: &mut Criterion) {
    let raw = parking_lot::Mutex::new(0_u64);
    c.bench_function("direct_mutex", |b| {
        b.iter(|| {
            let guard = raw.lock();
            black_box(*guard + 1)
        })
    });

    let lock = Arc::new(MutexLock::new());
    c.bench_function("single_step", |b| {
        b.iter(|| {
            with_lock(Arc::clone(&lock))
                .execute(|| black_box(1_u64))
                .execute()
        })
    });

    c.bench_function("five_steps", |b| {
        b.iter(|| {
            with_lock(Arc::clone(&lock))
                .execute(|| black_box(1_u64))
                .map(|value| value + 1)
                .filter(|value| *value > 0)
                .flat_map(|value| none::<u64>().supply(move || value))
                .supply(|| 7_u64)
                .execute()
        })
    });

    c.bench_function("empty_chain", |b| {
        b.iter(|| none::<u64>().map(|value| value + 1).filter(|_| true).execute())
    });

    let rw = ReadWriteLock::new();
    c.bench_function("rw_read", |b| b.iter(|| rw.read(|| black_box(3_u64)).execute()));
}

criterion_group!(lock_benches, bench_execution);
criterion_main!(lock_benches);
