//! Single-slot task execution
//!
//! [`TaskRunner`] runs at most one task at a time on the compio runtime.
//! A submission while a task is in flight is rejected outright rather than
//! queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Runs at most one task at a time
///
/// [`run`](TaskRunner::run) spawns the submitted task and returns `true`
/// when the runner is idle; while a task is still running, further
/// submissions return `false` and the rejected task is dropped unexecuted.
/// The slot frees up as soon as the running task finishes.
///
/// Clones share the same slot.
///
/// # Example
///
/// ```rust,no_run
/// use stopgate::TaskRunner;
///
/// # async fn example() {
/// let runner = TaskRunner::new();
///
/// assert!(runner.run(async {
///     // long-running maintenance work
/// }));
///
/// // A second submission while the first is running is rejected.
/// let accepted = runner.run(async {});
/// # let _ = accepted;
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct TaskRunner {
    busy: Arc<AtomicBool>,
}

impl TaskRunner {
    /// Create an idle runner
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a task
    ///
    /// Returns `true` and spawns the task if the runner was idle; returns
    /// `false` and drops the task if one is already running.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a compio runtime.
    pub fn run<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + 'static,
    {
        if self.busy.swap(true, Ordering::AcqRel) {
            trace!("task rejected; runner busy");
            return false;
        }
        let slot = SlotGuard(Arc::clone(&self.busy));
        compio::runtime::spawn(async move {
            let _slot = slot;
            task.await;
        })
        .detach();
        true
    }

    /// Whether a task is currently running
    ///
    /// Advisory: the slot may change hands between this call and a
    /// subsequent [`run`](TaskRunner::run).
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Clears the busy flag when the running task finishes, including by panic
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn yield_now() -> impl Future<Output = ()> {
        struct YieldNow(bool);

        impl Future for YieldNow {
            type Output = ();

            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                if self.0 {
                    Poll::Ready(())
                } else {
                    self.0 = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }

        YieldNow(false)
    }

    #[compio::test]
    async fn rejects_while_busy_then_recovers() {
        let runner = TaskRunner::new();
        let (tx, rx) = futures::channel::oneshot::channel::<()>();

        assert!(runner.run(async move {
            let _ = rx.await;
        }));
        assert!(runner.is_busy());

        // Slot is taken: rejected without queueing.
        assert!(!runner.run(async {}));
        assert!(!runner.run(async {}));

        tx.send(()).unwrap();
        while runner.is_busy() {
            yield_now().await;
        }

        assert!(runner.run(async {}));
    }

    #[compio::test]
    async fn clones_share_the_slot() {
        let runner = TaskRunner::new();
        let clone = runner.clone();
        let (tx, rx) = futures::channel::oneshot::channel::<()>();

        assert!(runner.run(async move {
            let _ = rx.await;
        }));
        assert!(clone.is_busy());
        assert!(!clone.run(async {}));

        tx.send(()).unwrap();
        while clone.is_busy() {
            yield_now().await;
        }
        assert!(clone.run(async {}));
    }
}
