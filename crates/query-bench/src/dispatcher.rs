//! Bounded-concurrency task dispatch.
//!
//! A producer turns each work item into a spawned task and pushes its handle
//! onto a bounded queue; a consumer pops handles in enqueue order and awaits
//! each one to completion. A full queue blocks the producer, which is what
//! bounds the number of tasks in flight.
//!
//! The producer reserves a queue slot *before* spawning, and the task held by
//! the consumer occupies the last of the `concurrency` slots, so the queue
//! itself holds `concurrency - 1` entries. At no point are more than
//! `concurrency` spawned tasks unresolved.
//!
//! Consumption is FIFO with respect to enqueue order, not completion order: a
//! slow task at the head of the queue holds back progress reporting (and the
//! admission of new work) even if later tasks already finished.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{BenchError, BenchResult};
use crate::progress::{NoProgress, ProgressObserver};

/// Queue entry: a spawned task, or the end-of-input marker.
enum Slot<T> {
    Task {
        index: u64,
        handle: JoinHandle<BenchResult<T>>,
    },
    Done,
}

/// Drives work items through a task factory with at most `concurrency`
/// tasks unresolved at once.
///
/// * `1` runs strictly sequentially: each task is awaited before the next
///   item is even taken from the input.
/// * `0` admits every item immediately (used for warmup).
pub struct Dispatcher {
    concurrency: u32,
    total_hint: Option<u64>,
    progress: Arc<dyn ProgressObserver>,
}

impl Dispatcher {
    pub fn new(concurrency: u32) -> Self {
        Self {
            concurrency,
            total_hint: None,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Expected number of items, passed through to the progress observer.
    pub fn with_total_hint(mut self, total: Option<u64>) -> Self {
        self.total_hint = total;
        self
    }

    /// Run `task` for every item, stopping at the first failure.
    ///
    /// Each task's outcome stands on its own: one failing task never cancels
    /// its siblings. Once the consumer observes a failure the producer stops
    /// pulling input, tasks already queued are awaited to completion, and the
    /// run returns that failure as [`BenchError::Task`]. A panicking task is
    /// fatal at every concurrency level: tasks still queued are aborted and
    /// the run returns [`BenchError::TaskPanicked`].
    ///
    /// Returns the number of tasks executed. An empty input is an error.
    pub async fn run<I, F, Fut, T>(&self, items: I, mut task: F) -> BenchResult<u64>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = BenchResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        debug!(concurrency = self.concurrency, total = ?self.total_hint, "Dispatch started");
        self.progress.start(self.total_hint);

        let outcome = if self.concurrency == 1 {
            self.run_sequential(items, &mut task).await
        } else {
            self.run_queued(items, &mut task).await
        };

        self.progress.finish();
        let outcome = outcome?;
        debug!(
            completed = outcome.completed,
            failed = outcome.failed,
            "Dispatch finished"
        );
        outcome.into_result()
    }

    async fn run_sequential<I, F, Fut, T>(&self, items: I, task: &mut F) -> BenchResult<Outcome>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = BenchResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut outcome = Outcome::default();
        for (index, item) in items.into_iter().enumerate() {
            let index = index as u64;
            match tokio::spawn(task(item)).await {
                Ok(result) => outcome.settle(index, result),
                Err(e) => {
                    warn!(index, error = %e, "Task panicked, stopping dispatch");
                    return Err(BenchError::TaskPanicked(e.to_string()));
                }
            }
            self.progress.advance();
            if outcome.first_failure.is_some() {
                break;
            }
        }
        Ok(outcome)
    }

    async fn run_queued<I, F, Fut, T>(&self, items: I, task: &mut F) -> BenchResult<Outcome>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = BenchResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Slot<T>>(queue_capacity(self.concurrency));

        let producer = async move {
            for (index, item) in items.into_iter().enumerate() {
                // Fails only once the consumer has stopped accepting work.
                let Ok(permit) = tx.reserve().await else {
                    return;
                };
                let handle = tokio::spawn(task(item));
                permit.send(Slot::Task {
                    index: index as u64,
                    handle,
                });
            }
            if let Ok(permit) = tx.reserve().await {
                permit.send(Slot::Done);
            }
        };

        let consumer = async {
            let mut outcome = Outcome::default();
            let mut draining = false;
            while let Some(slot) = rx.recv().await {
                let Slot::Task { index, handle } = slot else {
                    break;
                };
                match handle.await {
                    Ok(result) => outcome.settle(index, result),
                    Err(e) => {
                        warn!(index, error = %e, "Task panicked, stopping dispatch");
                        rx.close();
                        abort_queued(&mut rx).await;
                        return Err(BenchError::TaskPanicked(e.to_string()));
                    }
                }
                self.progress.advance();
                if outcome.first_failure.is_some() && !draining {
                    // Queued tasks still settle; nothing new is admitted.
                    debug!(index, "Task failed, draining queued tasks");
                    rx.close();
                    draining = true;
                }
            }
            Ok(outcome)
        };

        let ((), outcome) = tokio::join!(producer, consumer);
        outcome
    }
}

/// Queue capacity for a concurrency level. The consumer's in-hand task takes
/// one of the `concurrency` slots.
fn queue_capacity(concurrency: u32) -> usize {
    match concurrency {
        0 => Semaphore::MAX_PERMITS,
        c => (c as usize - 1).max(1),
    }
}

/// Abort and reap every task left in a closed queue.
async fn abort_queued<T>(rx: &mut mpsc::Receiver<Slot<T>>) {
    while let Some(slot) = rx.recv().await {
        if let Slot::Task { handle, .. } = slot {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[derive(Default)]
struct Outcome {
    completed: u64,
    failed: u64,
    first_failure: Option<BenchError>,
}

impl Outcome {
    fn settle<T>(&mut self, index: u64, result: BenchResult<T>) {
        self.completed += 1;
        if let Err(e) = result {
            debug!(index, error = %e, "Task failed");
            self.failed += 1;
            if self.first_failure.is_none() {
                self.first_failure = Some(BenchError::Task {
                    index,
                    source: Box::new(e),
                });
            }
        }
    }

    fn into_result(self) -> BenchResult<u64> {
        if self.completed == 0 {
            return Err(BenchError::EmptyWorkload);
        }
        match self.first_failure {
            Some(e) => Err(e),
            None => Ok(self.completed),
        }
    }
}
