//! Disque transport over RESP
//!
//! Disque speaks the Redis protocol, so the `redis` crate's connection
//! manager carries its `GETJOB`/`ADDJOB`/`ACKJOB` commands. Fetching blocks
//! server-side, so it gets its own connection and never stalls publishing.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::protocol::OutboundJob;

use super::{Job, QueueTransport, TransportError};

/// Reply row of `GETJOB`: queue name, job id, body
type JobRow = (String, String, Vec<u8>);

pub struct DisqueTransport {
    fetch_conn: ConnectionManager,
    publish_conn: ConnectionManager,
    fetch_timeout: Duration,
}

impl DisqueTransport {
    pub async fn connect(
        host: &str,
        port: u16,
        fetch_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(format!("redis://{}:{}/", host, port))?;

        let fetch_conn = ConnectionManager::new(client.clone()).await?;
        let publish_conn = ConnectionManager::new(client).await?;

        info!(host = %host, port = port, "Connected to Disque");

        Ok(Self {
            fetch_conn,
            publish_conn,
            fetch_timeout,
        })
    }
}

fn getjob_cmd(queues: &[String], count: usize, timeout: Duration) -> redis::Cmd {
    let mut cmd = redis::cmd("GETJOB");
    cmd.arg("TIMEOUT")
        .arg(timeout.as_millis() as u64)
        .arg("COUNT")
        .arg(count)
        .arg("FROM")
        .arg(queues);
    cmd
}

fn addjob_cmd(job: &OutboundJob) -> redis::Cmd {
    let mut cmd = redis::cmd("ADDJOB");
    // Trailing 0: no synchronous replication timeout
    cmd.arg(&job.destination).arg(&job.payload[..]).arg(0);
    cmd
}

fn ackjob_cmd(job_ids: &[String]) -> redis::Cmd {
    let mut cmd = redis::cmd("ACKJOB");
    cmd.arg(job_ids);
    cmd
}

#[async_trait]
impl QueueTransport for DisqueTransport {
    async fn fetch(&self, queues: &[String], count: usize) -> Result<Vec<Job>, TransportError> {
        let mut conn = self.fetch_conn.clone();

        // Nil reply when the timeout passes with nothing queued
        let rows: Option<Vec<JobRow>> = getjob_cmd(queues, count, self.fetch_timeout)
            .query_async(&mut conn)
            .await?;

        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(|(queue, id, body)| Job {
                id,
                queue,
                payload: Bytes::from(body),
            })
            .collect())
    }

    async fn publish(&self, job: OutboundJob) -> Result<(), TransportError> {
        let mut conn = self.publish_conn.clone();
        let job_id: String = addjob_cmd(&job).query_async(&mut conn).await?;

        debug!(destination = %job.destination, job_id = %job_id, "Job added");
        Ok(())
    }

    async fn acknowledge(&self, job_ids: &[String]) -> Result<(), TransportError> {
        if job_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.publish_conn.clone();
        let _: i64 = ackjob_cmd(job_ids).query_async(&mut conn).await?;
        Ok(())
    }
}
