//! Worker pool - pulls jobs off the queue and runs them

use crate::lifecycle::ClarityNow;
use crate::tasks;
use claritynow_common::{Job, Task, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub num_workers: usize,

    /// How long a pop blocks before the shutdown flag is checked again
    pub poll_timeout: Duration,
}

/// One worker: runs a single job at a time
pub struct Worker {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    app: Arc<ClarityNow>,
    poll_timeout: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn TaskQueue>,
        app: Arc<ClarityNow>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            app,
            poll_timeout,
        }
    }

    /// Process jobs until `shutdown` flips to true. A job already running
    /// finishes first.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "Worker started, waiting for jobs...");

        while !*shutdown.borrow() {
            match self.queue.pop(self.poll_timeout).await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                }
                Ok(None) => {
                    // Timeout, check for shutdown
                }
                Err(e) => {
                    error!(worker = self.id, "Error popping job from queue: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker = self.id, "Worker stopped");
    }

    /// Execute one job and store its final state
    pub async fn process_job(&self, mut job: Job) -> Job {
        info!(worker = self.id, "Processing job: {} ({})", job.id, job.task.name);

        job.mark_running();
        if let Err(e) = self.queue.update(&job).await {
            error!("Failed to update job status: {}", e);
        }

        match Task::from_call(&job.task) {
            Ok(task) => match tasks::run(&self.app, &task).await {
                Ok(envelope) => job.mark_completed(envelope),
                Err(e) => job.mark_failed(e.to_string()),
            },
            Err(e) => {
                error!("Rejected job {}: {}", job.id, e);
                job.mark_failed(e.to_string());
            }
        }

        if let Err(e) = self.queue.update(&job).await {
            error!("Failed to update job status: {}", e);
        }

        info!(worker = self.id, "Job {} finished: {:?}", job.id, job.status);
        job
    }
}

/// Spawn one worker per queue handle, all sharing one platform. Handles must
/// not share a connection, since a worker's blocking pop holds its own.
pub fn start_workers(
    config: &WorkerConfig,
    queues: Vec<Arc<dyn TaskQueue>>,
    app: Arc<ClarityNow>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    if queues.len() != config.num_workers {
        warn!(
            "Configured for {} workers but given {} queue handles",
            config.num_workers,
            queues.len()
        );
    }

    queues
        .into_iter()
        .enumerate()
        .map(|(id, queue)| {
            let worker = Worker::new(id, queue, app.clone(), config.poll_timeout);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect()
}
