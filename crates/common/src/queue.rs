//! Task queue shared by the API (submit, poll) and the workers (pop, finish)

use crate::error::Result;
use crate::job::Job;
use crate::task::Task;
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};
use uuid::Uuid;

const QUEUE_KEY: &str = "claritynow:queue";

fn job_key(job_id: &str) -> String {
    format!("claritynow:job:{}", job_id)
}

/// Queue transport between the HTTP layer and the worker pool
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task and return the new job id
    async fn submit(&self, task: &Task) -> Result<String>;

    /// Look up a job by id
    async fn job(&self, job_id: &str) -> Result<Option<Job>>;

    /// Wait up to `timeout` for the next pending job
    async fn pop(&self, timeout: Duration) -> Result<Option<Job>>;

    /// Store the job's current state
    async fn update(&self, job: &Job) -> Result<()>;
}

/// Redis-backed queue. Each handle owns one connection, and a blocking `pop`
/// holds it until it returns.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    result_ttl_secs: u64,
}

impl RedisQueue {
    /// Connect to Redis. Finished jobs expire after `result_ttl_secs`.
    pub async fn new(redis_url: &str, result_ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            result_ttl_secs,
        })
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn submit(&self, task: &Task) -> Result<String> {
        let job = Job::new(Uuid::new_v4().to_string(), task.to_call());
        let json = serde_json::to_string(&job)?;

        let mut conn = self.conn.clone();
        let _: () = conn.set(job_key(&job.id), json).await?;
        let _: () = conn.rpush(QUEUE_KEY, &job.id).await?;

        info!("Queued job: {} task: {}", job.id, job.task.name);
        Ok(job.id)
    }

    async fn job(&self, job_id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(job_key(job_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> =
            conn.blpop(QUEUE_KEY, timeout.as_secs_f64()).await?;

        match result {
            Some((_, job_id)) => {
                debug!("Popped job from queue: {}", job_id);
                self.job(&job_id).await
            }
            None => Ok(None),
        }
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let json = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();

        if job.status.is_finished() {
            let _: () = redis::cmd("SET")
                .arg(job_key(&job.id))
                .arg(json)
                .arg("EX")
                .arg(self.result_ttl_secs)
                .query_async(&mut conn)
                .await?;
        } else {
            let _: () = conn.set(job_key(&job.id), json).await?;
        }

        debug!("Updated job: {} status: {:?}", job.id, job.status);
        Ok(())
    }
}

/// In-process queue, for running the API and workers without Redis
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<String>>,
    jobs: Mutex<HashMap<String, Job>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting for a worker
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn try_pop(&self) -> Option<Job> {
        let job_id = self.pending.lock().await.pop_front()?;
        self.jobs.lock().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn submit(&self, task: &Task) -> Result<String> {
        let job = Job::new(Uuid::new_v4().to_string(), task.to_call());
        let job_id = job.id.clone();

        self.jobs.lock().await.insert(job_id.clone(), job);
        self.pending.lock().await.push_back(job_id.clone());
        self.notify.notify_one();

        debug!("Queued job: {} task: {}", job_id, task.name());
        Ok(job_id)
    }

    async fn job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Job>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.try_pop().await {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn update(&self, job: &Job) -> Result<()> {
        self.jobs.lock().await.insert(job.id.clone(), job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, TaskEnvelope};
    use std::sync::Arc;

    fn show(username: &str) -> Task {
        Task::Show {
            username: username.to_string(),
        }
    }

    #[test]
    fn test_job_key_layout() {
        assert_eq!(job_key("abc"), "claritynow:job:abc");
    }

    #[tokio::test]
    async fn test_submit_then_pop_in_order() {
        let queue = MemoryQueue::new();

        let first = queue.submit(&show("alice")).await.unwrap();
        let second = queue.submit(&show("bob")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(queue.pending_len().await, 2);

        let job = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.task.args, vec!["alice"]);

        let job = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(job.id, second);
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let job = queue.pop(Duration::from_millis(20)).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_submit() {
        let queue = Arc::new(MemoryQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let job_id = queue.submit(&Task::Image).await.unwrap();

        let job = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(job.id, job_id);
    }

    #[tokio::test]
    async fn test_update_is_visible_to_pollers() {
        let queue = MemoryQueue::new();
        let job_id = queue.submit(&Task::Image).await.unwrap();

        let mut job = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        job.mark_running();
        job.mark_completed(TaskEnvelope::empty());
        queue.update(&job).await.unwrap();

        let stored = queue.job(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.result, Some(TaskEnvelope::empty()));
        assert!(queue.job("missing").await.unwrap().is_none());
    }
}
