//! Closable async semaphore with graceful drain
//!
//! Provides a semaphore that bounds the number of concurrent permit holders
//! and additionally carries a broadcastable, idempotent stop signal. Once
//! stopped, every pending and future [`acquire`](Semaphore::acquire) resolves
//! to [`Stopped`] and no permit is ever granted again; an optional drain wait
//! blocks shutdown until every outstanding permit has been returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use stopgate::Semaphore;
//!
//! # async fn example() {
//! let sem = Semaphore::new(3);
//!
//! // Workers loop until the semaphore is stopped.
//! while let Ok(permit) = sem.acquire().await {
//!     // At most 3 holders run this section concurrently.
//!     drop(permit);
//! }
//!
//! // Elsewhere: request shutdown and wait for all holders to finish.
//! sem.shutdown().await;
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace};

use crate::error::{Stopped, TryAcquireError};

/// A closable async semaphore for bounding concurrency with graceful shutdown
///
/// The semaphore maintains a fixed capacity of permits. [`acquire`] waits
/// while all permits are held and the semaphore is open, and resolves to
/// [`Stopped`] once shutdown has been requested. Permits are RAII guards:
/// dropping a [`SemaphorePermit`] returns it.
///
/// # Lifecycle
///
/// The semaphore moves through at most three states, and never backwards:
///
/// - **Open**: permits are granted while capacity remains.
/// - **Draining**: shutdown was requested with a drain wait; no permit is
///   granted, outstanding holders are still running.
/// - **Closed**: shutdown is complete (or was requested without a drain).
///
/// The first call to [`stop`] or [`shutdown`] decides whether a drain
/// happens; later calls observe the outcome and return without effect.
///
/// # Design
///
/// - All mutable state (`held`, lifecycle, waiter queues) lives behind one
///   mutex, so the permit count and the lifecycle always change in mutual
///   view of each other.
/// - Waiters park a [`Waker`] and re-check the state on every wake-up.
/// - Waiters are woken oldest-first, but no fairness is guaranteed: a fresh
///   `acquire` may take a freed permit before a woken waiter runs.
/// - Dropping an in-flight [`acquire`] future never consumes a permit.
///
/// # Example
///
/// ```rust,no_run
/// use stopgate::Semaphore;
///
/// # async fn example() {
/// let sem = Semaphore::new(100);
///
/// for i in 0..1000 {
///     let sem = sem.clone();
///     compio::runtime::spawn(async move {
///         if let Ok(_permit) = sem.acquire().await {
///             // Only 100 tasks run concurrently; the loop body is skipped
///             // entirely once the semaphore is stopped.
///             println!("processing {i}");
///         }
///     })
///     .detach();
/// }
/// # }
/// ```
///
/// [`acquire`]: Semaphore::acquire
/// [`stop`]: Semaphore::stop
/// [`shutdown`]: Semaphore::shutdown
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<Inner>,
}

/// Lifecycle state of a [`Semaphore`]. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Draining,
    Closed,
}

/// Internal shared state for the semaphore
struct Inner {
    /// Permit capacity, fixed at construction
    capacity: usize,
    /// Everything that mutates, guarded by a single lock
    shared: Mutex<Shared>,
}

struct Shared {
    /// Permits currently held; `0 <= held <= capacity` at all times
    held: usize,
    lifecycle: Lifecycle,
    /// Set exactly once, by whichever stop call wins
    stop_requested: bool,
    /// Parked `acquire` callers, oldest first
    acquirers: VecDeque<Waiter>,
    /// Parked `shutdown`/`drained` callers
    drainers: Vec<Waiter>,
    next_key: u64,
}

struct Waiter {
    key: u64,
    waker: Waker,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // The critical sections below never unwind, so a poisoned lock can
        // only carry consistent state.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Shared {
    fn next_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        key
    }

    /// Insert or refresh an acquirer entry. A woken waiter has already been
    /// removed from the queue, so a re-park goes to the back.
    fn register_acquirer(&mut self, key: u64, waker: &Waker) {
        if let Some(entry) = self.acquirers.iter_mut().find(|w| w.key == key) {
            if !entry.waker.will_wake(waker) {
                entry.waker = waker.clone();
            }
        } else {
            self.acquirers.push_back(Waiter {
                key,
                waker: waker.clone(),
            });
        }
    }

    /// Remove an acquirer entry; `false` means a wake-up already consumed it.
    fn remove_acquirer(&mut self, key: u64) -> bool {
        if let Some(pos) = self.acquirers.iter().position(|w| w.key == key) {
            self.acquirers.remove(pos);
            true
        } else {
            false
        }
    }

    fn pop_acquirer(&mut self) -> Option<Waker> {
        self.acquirers.pop_front().map(|w| w.waker)
    }

    fn take_acquirers(&mut self) -> Vec<Waker> {
        self.acquirers.drain(..).map(|w| w.waker).collect()
    }

    fn register_drainer(&mut self, key: u64, waker: &Waker) {
        if let Some(entry) = self.drainers.iter_mut().find(|w| w.key == key) {
            if !entry.waker.will_wake(waker) {
                entry.waker = waker.clone();
            }
        } else {
            self.drainers.push(Waiter {
                key,
                waker: waker.clone(),
            });
        }
    }

    fn remove_drainer(&mut self, key: u64) {
        self.drainers.retain(|w| w.key != key);
    }

    fn take_drainers(&mut self) -> Vec<Waker> {
        std::mem::take(&mut self.drainers)
            .into_iter()
            .map(|w| w.waker)
            .collect()
    }
}

impl Semaphore {
    /// Create a new semaphore with the given permit capacity
    ///
    /// A capacity of `0` is accepted: such a semaphore never grants a
    /// permit, so every `acquire` waits until the semaphore is stopped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stopgate::Semaphore;
    ///
    /// let sem = Semaphore::new(1024);
    /// assert_eq!(sem.capacity(), 1024);
    /// assert_eq!(sem.held(), 0);
    /// assert!(sem.is_open());
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                shared: Mutex::new(Shared {
                    held: 0,
                    lifecycle: Lifecycle::Open,
                    stop_requested: false,
                    acquirers: VecDeque::new(),
                    drainers: Vec::new(),
                    next_key: 0,
                }),
            }),
        }
    }

    /// Acquire a permit, waiting while all permits are held
    ///
    /// Resolves to `Ok` with a [`SemaphorePermit`] once a permit is granted,
    /// or to `Err(`[`Stopped`]`)` once shutdown has been requested. Every
    /// caller still waiting when [`stop`](Semaphore::stop) or
    /// [`shutdown`](Semaphore::shutdown) runs is denied; no permit is ever
    /// granted after that point, even when capacity is free.
    ///
    /// Dropping the returned future before it resolves abandons the attempt
    /// without consuming a permit; a wake-up the abandoned waiter had
    /// already claimed is passed on to the next waiter.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] if the semaphore has been stopped.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use stopgate::Semaphore;
    ///
    /// # async fn example() {
    /// let sem = Semaphore::new(10);
    ///
    /// match sem.acquire().await {
    ///     Ok(permit) => {
    ///         // do bounded work
    ///         drop(permit);
    ///     }
    ///     Err(_) => {
    ///         // shutting down; stop producing work
    ///     }
    /// }
    /// # }
    /// ```
    pub async fn acquire(&self) -> Result<SemaphorePermit, Stopped> {
        Acquire {
            semaphore: self.clone(),
            key: None,
        }
        .await
    }

    /// Try to acquire a permit without waiting
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError::Stopped`] once shutdown has been
    /// requested, or [`TryAcquireError::NoPermits`] while all permits are
    /// held.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stopgate::{Semaphore, TryAcquireError};
    ///
    /// let sem = Semaphore::new(1);
    ///
    /// let permit = sem.try_acquire().unwrap();
    /// assert_eq!(sem.try_acquire().unwrap_err(), TryAcquireError::NoPermits);
    ///
    /// drop(permit);
    /// sem.stop();
    /// assert_eq!(sem.try_acquire().unwrap_err(), TryAcquireError::Stopped);
    /// ```
    pub fn try_acquire(&self) -> Result<SemaphorePermit, TryAcquireError> {
        let mut shared = self.inner.lock();
        if shared.lifecycle != Lifecycle::Open {
            return Err(TryAcquireError::Stopped);
        }
        if shared.held < self.inner.capacity {
            shared.held += 1;
            Ok(SemaphorePermit {
                semaphore: self.clone(),
            })
        } else {
            Err(TryAcquireError::NoPermits)
        }
    }

    /// Stop the semaphore without waiting for outstanding permits
    ///
    /// Idempotent: only the first stop call (by this method or by
    /// [`shutdown`](Semaphore::shutdown), across all clones) has effect;
    /// later calls return immediately. All waiting and future `acquire`
    /// calls resolve to [`Stopped`]. Outstanding permits stay valid and are
    /// still returned by dropping them; the freed capacity is never
    /// re-granted.
    ///
    /// Never blocks, and is safe to call while a drain started by
    /// `shutdown` is in flight (the drain keeps waiting; this call returns
    /// at once).
    pub fn stop(&self) {
        let wakers = {
            let mut shared = self.inner.lock();
            if shared.stop_requested {
                return;
            }
            shared.stop_requested = true;
            shared.lifecycle = Lifecycle::Closed;
            debug!(held = shared.held, "semaphore stopped");
            shared.take_acquirers()
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Stop the semaphore and wait until every outstanding permit is returned
    ///
    /// If this is the first stop call, the semaphore denies all waiting and
    /// future `acquire` calls and then drains: the future resolves once
    /// `held` reaches zero (immediately, if nothing is held). If a drain is
    /// already in flight, this call joins it. If the semaphore was already
    /// stopped without a drain, this call returns immediately: only the
    /// first stop call decides whether a drain happens.
    ///
    /// Any number of tasks may call `shutdown` concurrently; all of them
    /// resolve once the semaphore is closed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use stopgate::Semaphore;
    ///
    /// # async fn example(sem: &Semaphore) {
    /// sem.shutdown().await;
    /// assert_eq!(sem.held(), 0);
    /// # }
    /// ```
    pub async fn shutdown(&self) {
        let wakers = {
            let mut shared = self.inner.lock();
            if shared.stop_requested {
                if shared.lifecycle == Lifecycle::Closed {
                    return;
                }
                Vec::new()
            } else {
                shared.stop_requested = true;
                if shared.held == 0 {
                    shared.lifecycle = Lifecycle::Closed;
                    debug!("semaphore stopped; nothing held");
                } else {
                    shared.lifecycle = Lifecycle::Draining;
                    debug!(held = shared.held, "semaphore draining");
                }
                shared.take_acquirers()
            }
        };
        for waker in wakers {
            waker.wake();
        }
        self.drained().await;
    }

    /// Wait until no permit is held, without requesting shutdown
    ///
    /// Intended for a caller that has already triggered [`stop`] from
    /// another task and wants to block until the holders have finished.
    /// Resolves immediately when nothing is held. Note that this waits for
    /// `held == 0` in any lifecycle state, including an open semaphore
    /// whose permit count happens to reach zero.
    ///
    /// [`stop`]: Semaphore::stop
    pub async fn drained(&self) {
        Drained {
            semaphore: self.clone(),
            key: None,
        }
        .await
    }

    /// Whether the semaphore is still open
    ///
    /// Advisory by design: the state may change between this call and any
    /// later operation. Useful for a task that already holds a permit and
    /// wants to decide whether to keep doing incremental work before
    /// releasing it.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Open
    }

    /// Permit capacity, as passed to [`new`](Semaphore::new)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of permits currently held
    ///
    /// Best-effort: the value may be stale the instant it is returned.
    #[must_use]
    pub fn held(&self) -> usize {
        self.inner.lock().held
    }

    /// Number of permits currently grantable (`capacity - held`)
    ///
    /// Best-effort, like [`held`](Semaphore::held). A stopped semaphore
    /// reports its unclaimed capacity but will not grant it.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.capacity.saturating_sub(self.inner.lock().held)
    }

    /// Consistent diagnostic snapshot of `{capacity, held, open}`
    ///
    /// The three fields are read under the state lock, so they are mutually
    /// consistent, but the snapshot may be stale by the time it is used.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stopgate::Semaphore;
    ///
    /// let sem = Semaphore::new(3);
    /// let _permit = sem.try_acquire().unwrap();
    /// let stats = sem.stats();
    /// assert_eq!((stats.capacity, stats.held, stats.open), (3, 1, true));
    /// ```
    #[must_use]
    pub fn stats(&self) -> SemaphoreStats {
        let shared = self.inner.lock();
        SemaphoreStats {
            capacity: self.inner.capacity,
            held: shared.held,
            open: shared.lifecycle == Lifecycle::Open,
        }
    }

    /// Return one permit (called by `SemaphorePermit::drop`)
    fn release(&self) {
        let mut acquire_waker = None;
        let mut drain_wakers = Vec::new();
        {
            let mut shared = self.inner.lock();
            debug_assert!(shared.held > 0, "permit released with no permits held");
            shared.held = shared.held.saturating_sub(1);
            match shared.lifecycle {
                Lifecycle::Open => {
                    acquire_waker = shared.pop_acquirer();
                    if shared.held == 0 {
                        drain_wakers = shared.take_drainers();
                    }
                }
                // Past Open, a freed permit is absorbed, never re-granted.
                Lifecycle::Draining | Lifecycle::Closed => {
                    if shared.held == 0 {
                        if shared.lifecycle == Lifecycle::Draining {
                            shared.lifecycle = Lifecycle::Closed;
                            trace!("last permit returned; semaphore closed");
                        }
                        drain_wakers = shared.take_drainers();
                    }
                }
            }
        }
        if let Some(waker) = acquire_waker {
            waker.wake();
        }
        for waker in drain_wakers {
            waker.wake();
        }
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Semaphore")
            .field("capacity", &stats.capacity)
            .field("held", &stats.held)
            .field("open", &stats.open)
            .finish()
    }
}

/// Diagnostic snapshot of a [`Semaphore`], taken by [`Semaphore::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreStats {
    /// Permit capacity, fixed at construction
    pub capacity: usize,
    /// Permits held when the snapshot was taken
    pub held: usize,
    /// Whether the semaphore was still open
    pub open: bool,
}

impl fmt::Display for SemaphoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Semaphore {{ capacity: {}, held: {}, open: {} }}",
            self.capacity, self.held, self.open
        )
    }
}

/// RAII guard for one acquired permit; returns the permit on drop
///
/// Returned by [`Semaphore::acquire`] and [`Semaphore::try_acquire`].
/// Dropping the guard is the only way to return a permit, so a release
/// happens on every exit path, including panics, and an unbalanced release
/// cannot be expressed. A permit stays valid after the semaphore stops;
/// dropping it then simply decrements the held count.
#[must_use = "a permit is returned as soon as it is dropped"]
pub struct SemaphorePermit {
    semaphore: Semaphore,
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl fmt::Debug for SemaphorePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphorePermit").finish_non_exhaustive()
    }
}

/// Future returned by [`Semaphore::acquire`]
///
/// Every poll re-checks the shared state under the lock:
/// 1. past Open → deny with [`Stopped`];
/// 2. capacity free → grant, incrementing `held`;
/// 3. otherwise park the waker, keyed so cancellation can find it.
struct Acquire {
    semaphore: Semaphore,
    /// Waiter key once parked; `None` before the first park and after
    /// completion
    key: Option<u64>,
}

impl Future for Acquire {
    type Output = Result<SemaphorePermit, Stopped>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut shared = this.semaphore.inner.lock();

        if shared.lifecycle != Lifecycle::Open {
            if let Some(key) = this.key.take() {
                shared.remove_acquirer(key);
            }
            return Poll::Ready(Err(Stopped));
        }

        if shared.held < this.semaphore.inner.capacity {
            shared.held += 1;
            if let Some(key) = this.key.take() {
                shared.remove_acquirer(key);
            }
            return Poll::Ready(Ok(SemaphorePermit {
                semaphore: this.semaphore.clone(),
            }));
        }

        match this.key {
            Some(key) => shared.register_acquirer(key, cx.waker()),
            None => {
                let key = shared.next_key();
                shared.register_acquirer(key, cx.waker());
                this.key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let handoff = {
                let mut shared = self.semaphore.inner.lock();
                let was_queued = shared.remove_acquirer(key);
                // A missing entry means a wake-up already singled this waiter
                // out for a free permit; pass that permit on instead of
                // swallowing the wake-up.
                if !was_queued
                    && shared.lifecycle == Lifecycle::Open
                    && shared.held < self.semaphore.inner.capacity
                {
                    shared.pop_acquirer()
                } else {
                    None
                }
            };
            if let Some(waker) = handoff {
                waker.wake();
            }
        }
    }
}

/// Future returned by [`Semaphore::drained`]; resolves when `held == 0`
struct Drained {
    semaphore: Semaphore,
    key: Option<u64>,
}

impl Future for Drained {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut shared = this.semaphore.inner.lock();

        if shared.held == 0 {
            if let Some(key) = this.key.take() {
                shared.remove_drainer(key);
            }
            return Poll::Ready(());
        }

        match this.key {
            Some(key) => shared.register_drainer(key, cx.waker()),
            None => {
                let key = shared.next_key();
                shared.register_drainer(key, cx.waker());
                this.key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl Drop for Drained {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut shared = self.semaphore.inner.lock();
            shared.remove_drainer(key);
        }
    }
}
