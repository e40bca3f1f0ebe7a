use crate::{Error, PoolConfig, WorkItem, WorkerPool, item_fn};
use core::time::Duration;
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Records how many instances are executing at once.
struct GaugeItem {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    done: Arc<AtomicUsize>,
    hold: Duration,
}

impl WorkItem for GaugeItem {
    async fn execute(self, _ctx: CancellationToken) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks until released.
struct GateItem {
    release: Arc<Notify>,
    finished: Arc<AtomicBool>,
}

impl WorkItem for GateItem {
    async fn execute(self, _ctx: CancellationToken) {
        self.release.notified().await;
        self.finished.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn never_exceeds_capacity() {
    const CAPACITY: usize = 4;
    const ITEMS: usize = 64;

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(CAPACITY);

    for _ in 0..ITEMS {
        pool.submit(GaugeItem {
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
            done: Arc::clone(&done),
            hold: Duration::from_millis(2),
        })
        .await
        .unwrap();
        assert!(pool.in_flight() <= CAPACITY);
    }
    pool.shutdown().await.unwrap();

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= CAPACITY, "peak concurrency {peak} exceeded {CAPACITY}");
    assert_eq!(done.load(Ordering::SeqCst), ITEMS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn executes_every_item_exactly_once() {
    const ITEMS: usize = 500;

    let seen = Arc::new(Mutex::new(Vec::with_capacity(ITEMS)));
    let pool = WorkerPool::new(8);

    for i in 0..ITEMS {
        let seen = Arc::clone(&seen);
        pool.submit(item_fn(move |_ctx| async move {
            seen.lock().unwrap().push(i);
        }))
        .await
        .unwrap();
    }
    pool.shutdown().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), ITEMS);
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), ITEMS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_waits_for_running_items() {
    let flags: Vec<_> = (0..6).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let pool = WorkerPool::new(3);

    for flag in &flags {
        let flag = Arc::clone(flag);
        pool.submit(item_fn(move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        }))
        .await
        .unwrap();
    }
    pool.shutdown().await.unwrap();

    assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_blocks_while_all_slots_busy() {
    let release = Arc::new(Notify::new());
    let first_finished = Arc::new(AtomicBool::new(false));
    let pool = Arc::new(WorkerPool::new(1));

    pool.submit(GateItem {
        release: Arc::clone(&release),
        finished: Arc::clone(&first_finished),
    })
    .await
    .unwrap();

    // The only slot is held by the gate, so a second submit cannot complete.
    let second_release = Arc::new(Notify::new());
    second_release.notify_one();
    let second_finished = Arc::new(AtomicBool::new(false));
    let second = {
        let pool = Arc::clone(&pool);
        let item = GateItem {
            release: second_release,
            finished: Arc::clone(&second_finished),
        };
        tokio::spawn(async move { pool.submit(item).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second.is_finished(), "submit returned while the slot was busy");
    assert!(!first_finished.load(Ordering::SeqCst));

    release.notify_one();

    tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("submit should proceed once the slot frees up")
        .unwrap()
        .unwrap();
    assert!(first_finished.load(Ordering::SeqCst));

    let pool = Arc::try_unwrap(pool).ok().expect("pool still shared");
    pool.shutdown().await.unwrap();
    assert!(second_finished.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_submit_does_not_take_a_slot() {
    let release = Arc::new(Notify::new());
    let pool = WorkerPool::new(1);

    pool.submit(GateItem {
        release: Arc::clone(&release),
        finished: Arc::new(AtomicBool::new(false)),
    })
    .await
    .unwrap();

    let abandoned_finished = Arc::new(AtomicBool::new(false));
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        pool.submit(GateItem {
            release: Arc::new(Notify::new()),
            finished: Arc::clone(&abandoned_finished),
        }),
    )
    .await;
    assert!(abandoned.is_err());

    release.notify_one();

    let next_release = Arc::new(Notify::new());
    next_release.notify_one();
    tokio::time::timeout(
        Duration::from_secs(5),
        pool.submit(GateItem {
            release: next_release,
            finished: Arc::new(AtomicBool::new(false)),
        }),
    )
    .await
    .expect("slot should be available again")
    .unwrap();

    pool.shutdown().await.unwrap();
    assert!(!abandoned_finished.load(Ordering::SeqCst));
}

async fn noop(_ctx: CancellationToken) {}

/// Drops `submit` after a single poll at every point of the task's
/// cooperative budget. The slot must stay reachable each time.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_dropped_after_one_poll_keeps_slot() {
    let pool = Arc::new(WorkerPool::new(1));

    for spent in 0..130 {
        let dropper = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for _ in 0..spent {
                    tokio::task::consume_budget().await;
                }
                let _ = pool.submit(item_fn(noop)).now_or_never();
            })
        };
        dropper.await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), pool.submit(item_fn(noop)))
            .await
            .unwrap_or_else(|_| panic!("slot lost after dropping submit at budget {spent}"))
            .unwrap();
    }

    let pool = Arc::try_unwrap(pool).ok().expect("pool still shared");
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_item_does_not_kill_its_slot() {
    let ran = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(1);

    fn boom() {
        panic!("boom");
    }

    pool.submit(Box::new(boom) as Box<dyn FnOnce() + Send>)
        .await
        .unwrap();
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        pool.submit(Box::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }) as Box<dyn FnOnce() + Send>)
        .await
        .unwrap();
    }
    pool.shutdown().await.unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

impl WorkItem for Box<dyn FnOnce() + Send> {
    async fn execute(self, _ctx: CancellationToken) {
        self();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_timeout_reports_stuck_slots() {
    let config = PoolConfig::new(2).with_drain_timeout(Duration::from_millis(50));
    let pool = WorkerPool::with_config(config).unwrap();

    pool.submit(GateItem {
        release: Arc::new(Notify::new()),
        finished: Arc::new(AtomicBool::new(false)),
    })
    .await
    .unwrap();

    // Give the slot a moment to pick the item up.
    while pool.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        pool.shutdown().await,
        Err(Error::DrainTimeout { remaining: 1 })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn context_is_cancelled_on_shutdown() {
    let observed = Arc::new(AtomicBool::new(false));
    let pool = WorkerPool::new(2);

    let flag = Arc::clone(&observed);
    pool.submit(item_fn(move |ctx| async move {
        ctx.cancelled().await;
        flag.store(true, Ordering::SeqCst);
    }))
    .await
    .unwrap();
    pool.shutdown().await.unwrap();

    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn rejects_zero_capacity() {
    let res = WorkerPool::<GateItem>::try_new(0);
    assert!(matches!(res, Err(Error::InvalidCapacity)));
}

#[tokio::test]
#[should_panic(expected = "Pool capacity must be greater than 0")]
async fn new_panics_on_zero_capacity() {
    let _ = WorkerPool::<GateItem>::new(0);
}

#[tokio::test]
async fn reports_capacity() {
    let pool = WorkerPool::<GateItem>::new(5);
    assert_eq!(pool.capacity(), 5);
    assert_eq!(pool.in_flight(), 0);
    pool.shutdown().await.unwrap();
}
