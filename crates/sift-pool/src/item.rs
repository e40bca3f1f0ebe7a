use core::future::Future;
use tokio_util::sync::CancellationToken;

/// A unit of work executed by exactly one pool slot.
///
/// The item is consumed by [`execute`](WorkItem::execute), so anything it
/// captured (a message buffer, a shared handle) is released as soon as the
/// returned future completes.
///
/// `ctx` is cancelled once the pool stops accepting work. Items are never
/// interrupted; long-running items may poll `ctx` to wind down early.
pub trait WorkItem: Send + 'static {
    fn execute(self, ctx: CancellationToken) -> impl Future<Output = ()> + Send;
}

/// A [`WorkItem`] built from a closure. See [`item_fn`].
#[derive(Clone, Copy, Debug)]
pub struct ItemFn<F> {
    f: F,
}

/// Wraps a closure returning a future as a [`WorkItem`].
///
/// ```
/// use sift_pool::{WorkerPool, item_fn};
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> sift_pool::Result<()> {
/// let pool = WorkerPool::new(2);
/// pool.submit(item_fn(|_ctx| async move {
///     // do the work
/// }))
/// .await?;
/// pool.shutdown().await
/// # }
/// ```
pub const fn item_fn<F, Fut>(f: F) -> ItemFn<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    ItemFn { f }
}

impl<F, Fut> WorkItem for ItemFn<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn execute(self, ctx: CancellationToken) -> impl Future<Output = ()> + Send {
        (self.f)(ctx)
    }
}
