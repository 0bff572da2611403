//! Synchronization utilities with graceful shutdown for the compio runtime
//!
//! The centerpiece is [`Semaphore`], a closable async semaphore: it bounds
//! the number of concurrent permit holders to a fixed capacity and carries a
//! broadcastable, idempotent stop signal. Stopping wakes every waiting
//! acquirer with a denial, and an optional drain wait blocks until all
//! outstanding permits have been returned. Alongside it live a handful of
//! small, independent utilities.
//!
//! # Primitives
//!
//! - [`Semaphore`] - closable semaphore with graceful drain
//! - [`CowMap`] - copy-on-write string map for read-heavy data
//! - [`TaskRunner`] - runs at most one task at a time
//! - [`sort_normalized`] - normalization-aware sort with stable tie-break
//! - [`shuffle`] - Fisher–Yates shuffle over any swappable sequence
//!
//! # Example
//!
//! ```rust,no_run
//! use stopgate::Semaphore;
//!
//! #[compio::main]
//! async fn main() {
//!     let sem = Semaphore::new(3);
//!
//!     // Spawn many workers; at most 3 hold a permit at once, and every
//!     // worker's loop ends once the semaphore is stopped.
//!     for id in 0..10 {
//!         let sem = sem.clone();
//!         compio::runtime::spawn(async move {
//!             while let Ok(_permit) = sem.acquire().await {
//!                 println!("worker {id} holds a permit");
//!             }
//!         })
//!         .detach();
//!     }
//!
//!     // Stop and wait for the holders to finish.
//!     sem.shutdown().await;
//! }
//! ```

pub mod cow;
pub mod error;
pub mod runner;
pub mod semaphore;
pub mod shuffle;
pub mod sort;

// Re-export commonly used types
pub use cow::CowMap;
pub use error::{Stopped, TryAcquireError};
pub use runner::TaskRunner;
pub use semaphore::{Semaphore, SemaphorePermit, SemaphoreStats};
pub use shuffle::{shuffle, SwapSlice};
pub use sort::{sort_case_insensitive, sort_normalized, trim_lowercase};
