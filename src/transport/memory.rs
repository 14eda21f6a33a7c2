//! In-memory queue transport using DashMap.
//!
//! Queues live only in this process. Used by tests and for local runs without
//! a Disque node.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::protocol::OutboundJob;

use super::{Job, QueueTransport, TransportError};

pub struct MemoryQueue {
    queues: DashMap<String, VecDeque<Job>>,
    acknowledged: Mutex<Vec<String>>,
    notify: Notify,
    poll_timeout: Duration,
    closed: AtomicBool,
}

impl MemoryQueue {
    /// `poll_timeout` bounds how long an empty fetch waits for new jobs
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            acknowledged: Mutex::new(Vec::new()),
            notify: Notify::new(),
            poll_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Append a job to a queue, returning its id
    pub fn push(&self, queue: &str, payload: impl Into<Bytes>) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            queue: queue.to_string(),
            payload: payload.into(),
        };

        self.queues.entry(queue.to_string()).or_default().push_back(job);
        self.notify.notify_waiters();
        id
    }

    /// Remove and return everything queued under `queue`
    pub fn drain(&self, queue: &str) -> Vec<Job> {
        self.queues
            .remove(queue)
            .map(|(_, jobs)| jobs.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    /// Ids passed to `acknowledge`, in order
    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn take(&self, queues: &[String], count: usize) -> Vec<Job> {
        let mut jobs = Vec::new();

        for name in queues {
            if jobs.len() >= count {
                break;
            }
            if let Some(mut queue) = self.queues.get_mut(name) {
                while jobs.len() < count {
                    match queue.pop_front() {
                        Some(job) => jobs.push(job),
                        None => break,
                    }
                }
            }
        }

        jobs
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn fetch(&self, queues: &[String], count: usize) -> Result<Vec<Job>, TransportError> {
        loop {
            // Registered before checking so a push in between still wakes us
            let notified = self.notify.notified();

            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            let jobs = self.take(queues, count);
            if !jobs.is_empty() {
                return Ok(jobs);
            }

            if tokio::time::timeout(self.poll_timeout, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn publish(&self, job: OutboundJob) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.push(&job.destination, job.payload);
        Ok(())
    }

    async fn acknowledge(&self, job_ids: &[String]) -> Result<(), TransportError> {
        self.acknowledged.lock().extend_from_slice(job_ids);
        Ok(())
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
