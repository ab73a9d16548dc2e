use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;

use crate::engine::{self, EngineError, JobState, QueryEngine, QuerySubmission, ResultRow};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("query engine request failed: {0}")]
    Transport(#[from] EngineError),

    #[error("query {state}: {reason}")]
    JobFailed { state: JobState, reason: String },

    #[error("query {job_id} still running after {}s", .waited.as_secs())]
    Timeout { job_id: String, waited: Duration },
}

#[derive(Clone, Copy, Debug)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Submits statements and waits for them: submit, poll on a fixed interval
/// until a terminal state or the deadline, then fetch and flatten.
#[derive(Clone)]
pub struct JobRunner {
    engine: Arc<dyn QueryEngine>,
    output_location: String,
    policy: PollPolicy,
}

impl JobRunner {
    pub fn new(engine: Arc<dyn QueryEngine>, output_location: String, policy: PollPolicy) -> Self {
        Self {
            engine,
            output_location,
            policy,
        }
    }

    pub async fn run(
        &self,
        sql: &str,
        database: &str,
        workgroup: &str,
    ) -> Result<Vec<ResultRow>, RunError> {
        let submission = QuerySubmission {
            sql,
            database,
            output_location: self.output_location.as_str(),
            workgroup,
        };
        let job = self.engine.submit(&submission).await?;
        let started = Instant::now();
        tracing::info!(job_id = %job, database, workgroup, "query submitted");

        loop {
            let status = self.engine.status(&job).await?;
            match status.state {
                JobState::Succeeded => break,
                JobState::Failed | JobState::Cancelled => {
                    let reason = status.reason.unwrap_or_default();
                    tracing::error!(
                        job_id = %job,
                        state = %status.state,
                        reason = reason.as_str(),
                        "query did not succeed"
                    );
                    return Err(RunError::JobFailed {
                        state: status.state,
                        reason,
                    });
                }
                JobState::Submitted | JobState::Queued | JobState::Running => {}
            }

            let waited = started.elapsed();
            if waited >= self.policy.max_wait {
                tracing::warn!(job_id = %job, waited_ms = waited.as_millis() as u64, "query deadline exceeded");
                if let Err(err) = self.engine.cancel(&job).await {
                    tracing::warn!(job_id = %job, error = %err, "query cancel failed");
                }
                return Err(RunError::Timeout {
                    job_id: job.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.policy.interval).await;
        }

        let results = self.engine.results(&job).await?;
        let rows = engine::flatten(results);
        tracing::info!(
            job_id = %job,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query completed"
        );
        Ok(rows)
    }
}
