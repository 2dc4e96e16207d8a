//! Compose job storage and work queue

use crate::models::ComposeJob;
use anyhow::{Context, Result};
use async_trait::async_trait;
use composer_common::StatusError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};
use uuid::Uuid;

const QUEUE_KEY: &str = "compose:queue";

fn job_key(id: &Uuid) -> String {
    format!("compose:job:{}", id)
}

/// Refuse to overwrite `stored` with a record that moves backwards.
fn check_transition(stored: &ComposeJob, next: &ComposeJob) -> Result<()> {
    if !stored
        .status()
        .can_advance_to(next.status(), stored.upload_requested())
    {
        return Err(StatusError::IllegalTransition {
            from: stored.status(),
            to: next.status(),
        })
        .with_context(|| format!("Refusing to update compose {}", next.id));
    }
    Ok(())
}

/// Storage backend for compose jobs
#[async_trait]
pub trait ComposeStore: Send + Sync {
    /// Persist a new job and queue it for a worker
    async fn insert(&self, job: &ComposeJob) -> Result<()>;

    /// Get a job by ID
    async fn get(&self, id: &Uuid) -> Result<Option<ComposeJob>>;

    /// Replace a stored job. Status regressions are rejected.
    async fn update(&self, job: &ComposeJob) -> Result<()>;

    /// Pop the next queued job, waiting at most `timeout`
    async fn pop(&self, timeout: Duration) -> Result<Option<ComposeJob>>;

    /// Number of jobs waiting for a worker
    async fn queue_length(&self) -> Result<usize>;
}

/// Redis-backed store
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl ComposeStore for RedisStore {
    async fn insert(&self, job: &ComposeJob) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(job).context("Failed to serialize compose")?;

        let _: () = conn.set(job_key(&job.id), &json).await?;
        let _: () = conn.rpush(QUEUE_KEY, job.id.to_string()).await?;

        info!("Queued compose: {}", job.id);
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ComposeJob>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(job_key(id)).await?;

        json.map(|data| serde_json::from_str(&data).context("Failed to deserialize compose"))
            .transpose()
    }

    async fn update(&self, job: &ComposeJob) -> Result<()> {
        // Single writer per compose (the worker holding it), so read-then-write is enough.
        if let Some(stored) = self.get(&job.id).await? {
            check_transition(&stored, job)?;
        }

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(job).context("Failed to serialize compose")?;
        let _: () = conn.set(job_key(&job.id), json).await?;

        debug!("Updated compose: {} status: {}", job.id, job.status());
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<ComposeJob>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(QUEUE_KEY)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        match result {
            Some((_, id)) => {
                debug!("Popped compose from queue: {}", id);
                let id = Uuid::parse_str(&id).context("Invalid compose id in queue")?;
                self.get(&id).await
            }
            None => Ok(None),
        }
    }

    async fn queue_length(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }
}

/// In-process store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, ComposeJob>>,
    queue: Mutex<VecDeque<Uuid>>,
    queued: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComposeStore for MemoryStore {
    async fn insert(&self, job: &ComposeJob) -> Result<()> {
        self.jobs.lock().await.insert(job.id, job.clone());
        self.queue.lock().await.push_back(job.id);
        self.queued.notify_one();

        info!("Queued compose: {}", job.id);
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ComposeJob>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn update(&self, job: &ComposeJob) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(stored) = jobs.get(&job.id) {
            check_transition(stored, job)?;
        }
        jobs.insert(job.id, job.clone());

        debug!("Updated compose: {} status: {}", job.id, job.status());
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<ComposeJob>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let queued = self.queued.notified();

            let next = self.queue.lock().await.pop_front();
            if let Some(id) = next {
                debug!("Popped compose from queue: {}", id);
                return self.get(&id).await;
            }

            if tokio::time::timeout_at(deadline, queued).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn queue_length(&self) -> Result<usize> {
        Ok(self.queue.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_common::{ComposeRequest, ImageStatusValue};
    use serde_json::json;
    use std::sync::Arc;

    fn sample_job() -> ComposeJob {
        let request: ComposeRequest = serde_json::from_value(json!({
            "distribution": "rhel-8",
            "image_requests": [{
                "architecture": "x86_64",
                "image_type": "vhd",
                "repositories": [{"rhsm": true}],
                "upload_request": {
                    "type": "azure",
                    "options": {
                        "subscription_id": "s",
                        "tenant_id": "t",
                        "resource_group": "rg",
                        "location": "westeurope"
                    }
                }
            }]
        }))
        .unwrap();
        ComposeJob::new(Uuid::new_v4(), request)
    }

    async fn exercise_store(store: &dyn ComposeStore) {
        let job = sample_job();
        store.insert(&job).await.unwrap();

        let stored = store.get(&job.id).await.unwrap().expect("Compose not found");
        assert_eq!(stored.status(), ImageStatusValue::Pending);

        let popped = store
            .pop(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("Queue was empty");
        assert_eq!(popped.id, job.id);

        let building = popped.advance(ImageStatusValue::Building).unwrap();
        store.update(&building).await.unwrap();
        assert_eq!(
            store.get(&job.id).await.unwrap().unwrap().status(),
            ImageStatusValue::Building
        );

        // Regressions never reach storage
        assert!(store.update(&job).await.is_err());
        assert_eq!(
            store.get(&job.id).await.unwrap().unwrap().status(),
            ImageStatusValue::Building
        );
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryStore::new();
        exercise_store(&store).await;
        assert_eq!(store.queue_length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_unknown_id() {
        let store = MemoryStore::new();
        assert!(store.get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_pop_times_out() {
        let store = MemoryStore::new();
        let popped = store.pop(Duration::from_millis(20)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_pop_wakes_on_insert() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.pop(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = sample_job();
        store.insert(&job).await.unwrap();

        let popped = waiter.await.unwrap().unwrap().expect("Waiter saw no job");
        assert_eq!(popped.id, job.id);
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_redis_store_lifecycle() {
        let store = RedisStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis");
        exercise_store(&store).await;
    }
}
