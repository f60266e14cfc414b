//! Bounded worker pool with cancel-on-first-error.
//!
//! ```text
//!  producer ──► bounded job queue ──► N scoped workers ──► result channel
//!     ▲                                   │
//!     └──────────── cancelled flag ◄──────┘ (first Err)
//! ```
//!
//! The producer blocks while the job queue is full. The first failing job
//! raises the shared flag: the producer stops enqueuing, workers stop
//! taking jobs, and that error is returned once every worker has exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::debug;

/// Run `job` over `items` on `workers` threads.
///
/// Results come back in input order. `capacity` bounds the number of
/// queued jobs.
///
/// # Errors
///
/// Returns the first error any job produced; remaining jobs are skipped.
pub fn run_bounded<I, O, E, F>(items: Vec<I>, workers: usize, capacity: usize, job: F) -> Result<Vec<O>, E>
where
    I: Send,
    O: Send,
    E: Send,
    F: Fn(I) -> Result<O, E> + Sync,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, total);
    debug!(jobs = total, workers, capacity, "starting worker pool");

    let (job_tx, job_rx) = bounded::<(usize, I)>(capacity.max(1));
    let (result_tx, result_rx) = unbounded::<(usize, Result<O, E>)>();
    let cancelled = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            let cancelled = &cancelled;
            let job = &job;
            scope.spawn(move || {
                for (index, item) in rx {
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    let result = job(item);
                    if result.is_err() {
                        cancelled.store(true, Ordering::Release);
                    }
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        for entry in items.into_iter().enumerate() {
            if cancelled.load(Ordering::Acquire) || job_tx.send(entry).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(total).collect();
    for (index, result) in result_rx {
        slots[index] = Some(result?);
    }
    Ok(slots.into_iter().flatten().collect())
}
