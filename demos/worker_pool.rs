//! Demonstration of bounded concurrency with graceful shutdown
//!
//! Ten workers compete for three permits, so no more than three run at any
//! one time. After two seconds the semaphore is stopped and the pool drains
//! cleanly: waiting workers are denied, running workers finish their slice
//! of work and exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stopgate::Semaphore;

const WORKERS: usize = 10;
const CAPACITY: usize = 3;

#[compio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let sem = Semaphore::new(CAPACITY);
    let active = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for id in 0..WORKERS {
        let sem = sem.clone();
        let active = active.clone();
        workers.push(compio::runtime::spawn(async move {
            while let Ok(permit) = sem.acquire().await {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                println!("worker {id:2} started   ({now} active)");
                compio::time::sleep(Duration::from_millis(300)).await;
                let now = active.fetch_sub(1, Ordering::SeqCst) - 1;
                println!("worker {id:2} finished  ({now} active)");
                drop(permit);
            }
            println!("worker {id:2} stopped");
        }));
    }

    compio::time::sleep(Duration::from_secs(2)).await;
    println!("requesting shutdown: {}", sem.stats());
    sem.shutdown().await;
    println!("drained: {}", sem.stats());

    for worker in workers {
        worker.await.unwrap();
    }
}
