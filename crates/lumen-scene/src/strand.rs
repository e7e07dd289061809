//! Serialized worker queue for off-frame asynchronous work.
//!
//! Jobs posted to a [`Strand`] run one at a time, in posting order, on a
//! background tokio runtime. The frame loop observes completion through a
//! [`PendingTask`] without blocking. There is no cancellation: a posted job
//! runs to completion or failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;

use tokio::sync::mpsc as job_channel;
use tracing::{error, info};

use crate::error::SceneError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A non-blocking handle to a job posted on a [`Strand`].
/// Call `try_recv()` each frame to check for results without blocking the frame loop.
pub struct PendingTask<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> PendingTask<T> {
    /// Non-blocking check for the result. Returns `None` if still pending.
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Blocking wait for the result. Only use during loading screens.
    pub fn wait(self) -> Result<T, SceneError> {
        self.receiver.recv().map_err(|_| SceneError::StrandClosed)
    }
}

pub struct Strand {
    runtime: tokio::runtime::Runtime,
    jobs: job_channel::UnboundedSender<Job>,
}

impl Strand {
    /// Start a strand backed by a runtime with `worker_threads` threads.
    pub fn new(worker_threads: usize) -> Result<Self, SceneError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("lumen-strand")
            .enable_all()
            .build()
            .map_err(SceneError::Runtime)?;

        let (jobs, mut queue) = job_channel::unbounded_channel::<Job>();
        runtime.spawn(async move {
            while let Some(job) = queue.recv().await {
                // Run each job as its own task so a panic fails only that job.
                if let Err(e) = tokio::spawn(job).await {
                    error!("Strand job failed: {}", e);
                }
            }
        });

        info!("Strand started with {} worker threads", worker_threads.max(1));
        Ok(Self { runtime, jobs })
    }

    /// Queue a future. Its output is delivered through the returned handle.
    pub fn post<F, T>(&self, future: F) -> PendingTask<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.enqueue(Box::pin(async move {
            let _ = tx.send(future.await);
        }));
        PendingTask { receiver: rx }
    }

    /// Queue a closure to run on the strand, fire-and-forget.
    pub fn post_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::pin(async move { callback() }));
    }

    fn enqueue(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            error!("Strand queue is closed, job dropped");
        }
    }

    /// Handle to the backing runtime, for blocking I/O helpers.
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn post_delivers_result() {
        let strand = Strand::new(1).unwrap();
        let task = strand.post(async { 21 * 2 });
        assert_eq!(task.wait().unwrap(), 42);
    }

    #[test]
    fn jobs_run_one_at_a_time_in_order() {
        let strand = Strand::new(4).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for (i, delay) in [(1, 30u64), (2, 10), (3, 0)] {
            let order = Arc::clone(&order);
            tasks.push(strand.post(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                order.lock().push(i);
            }));
        }
        for task in tasks {
            task.wait().unwrap();
        }
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn callbacks_share_the_queue() {
        let strand = Strand::new(2).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        strand.post_callback(move || first.lock().push("callback"));
        let second = Arc::clone(&order);
        let task = strand.post(async move { second.lock().push("task") });
        task.wait().unwrap();
        assert_eq!(*order.lock(), vec!["callback", "task"]);
    }

    #[test]
    fn panicking_job_does_not_stop_the_strand() {
        let strand = Strand::new(1).unwrap();
        let failed: PendingTask<u8> = strand.post(async { panic!("job panic") });
        let next = strand.post(async { "still running" });
        assert_eq!(next.wait().unwrap(), "still running");
        assert!(matches!(failed.wait(), Err(SceneError::StrandClosed)));
    }

    #[test]
    fn try_recv_is_non_blocking() {
        let strand = Strand::new(1).unwrap();
        let gate = Arc::new(std::sync::Barrier::new(2));
        let job_gate = Arc::clone(&gate);
        let task = strand.post(async move {
            job_gate.wait();
            7
        });
        assert!(task.try_recv().is_none());
        gate.wait();
        assert_eq!(task.wait().unwrap(), 7);
    }
}
