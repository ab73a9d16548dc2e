use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_athena::{
    config::Region,
    error::DisplayErrorContext,
    types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration},
    Client,
};

use crate::engine::{
    EngineError, JobHandle, JobState, JobStatus, QueryEngine, QuerySubmission, ResultSet,
};

/// [`QueryEngine`] backed by Amazon Athena.
#[derive(Clone)]
pub struct AthenaEngine {
    client: Client,
}

impl AthenaEngine {
    /// Loads credentials from the default provider chain.
    pub async fn new(region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&shared),
        }
    }
}

fn transport<E: std::error::Error>(action: &str, err: E) -> EngineError {
    EngineError(format!("{action} failed: {}", DisplayErrorContext(&err)))
}

fn job_state(state: Option<&QueryExecutionState>) -> JobState {
    match state {
        Some(QueryExecutionState::Queued) => JobState::Queued,
        Some(QueryExecutionState::Running) => JobState::Running,
        Some(QueryExecutionState::Succeeded) => JobState::Succeeded,
        Some(QueryExecutionState::Failed) => JobState::Failed,
        Some(QueryExecutionState::Cancelled) => JobState::Cancelled,
        // Unknown states are treated as still in flight.
        _ => JobState::Submitted,
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn submit(&self, submission: &QuerySubmission<'_>) -> Result<JobHandle, EngineError> {
        let output = self
            .client
            .start_query_execution()
            .query_string(submission.sql)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(submission.database)
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(submission.output_location)
                    .build(),
            )
            .work_group(submission.workgroup)
            .send()
            .await
            .map_err(|err| transport("start query execution", err))?;
        output
            .query_execution_id()
            .map(JobHandle::new)
            .ok_or_else(|| EngineError("start query execution returned no id".to_string()))
    }

    async fn status(&self, job: &JobHandle) -> Result<JobStatus, EngineError> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(job.as_str())
            .send()
            .await
            .map_err(|err| transport("get query execution", err))?;
        let status = output.query_execution().and_then(|execution| execution.status());
        Ok(JobStatus {
            state: job_state(status.and_then(|status| status.state())),
            reason: status
                .and_then(|status| status.state_change_reason())
                .map(str::to_string),
        })
    }

    async fn results(&self, job: &JobHandle) -> Result<ResultSet, EngineError> {
        let mut rows = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_query_results()
                .query_execution_id(job.as_str())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| transport("get query results", err))?;
            if let Some(result_set) = output.result_set() {
                rows.extend(result_set.rows().iter().map(|row| {
                    row.data()
                        .iter()
                        .map(|datum| datum.var_char_value().map(str::to_string))
                        .collect::<Vec<_>>()
                }));
            }
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(ResultSet { rows })
    }

    async fn cancel(&self, job: &JobHandle) -> Result<(), EngineError> {
        self.client
            .stop_query_execution()
            .query_execution_id(job.as_str())
            .send()
            .await
            .map_err(|err| transport("stop query execution", err))?;
        Ok(())
    }
}
