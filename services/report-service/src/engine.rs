//! Contract with the managed query engine: submit a statement, poll its
//! status, fetch its results.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Opaque job identifier issued by the engine on submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            JobState::Submitted => "SUBMITTED",
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        write!(f, "{value}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub reason: Option<String>,
}

#[cfg(test)]
impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(state: JobState, reason: &str) -> Self {
        Self {
            state,
            reason: Some(reason.to_string()),
        }
    }
}

pub struct QuerySubmission<'a> {
    pub sql: &'a str,
    pub database: &'a str,
    pub output_location: &'a str,
    pub workgroup: &'a str,
}

/// Raw tabular output. The first row holds the column headers; every cell is
/// text, and a cell may be absent (SQL NULL).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub rows: Vec<Vec<Option<String>>>,
}

/// Transport-level failure talking to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn submit(&self, submission: &QuerySubmission<'_>) -> Result<JobHandle, EngineError>;

    async fn status(&self, job: &JobHandle) -> Result<JobStatus, EngineError>;

    async fn results(&self, job: &JobHandle) -> Result<ResultSet, EngineError>;

    /// Asks the engine to stop a job. Engines without cancellation ignore it.
    async fn cancel(&self, _job: &JobHandle) -> Result<(), EngineError> {
        Ok(())
    }
}

/// One flattened result row: column header to cell text, in header order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultRow {
    cells: Vec<(String, String)>,
}

impl ResultRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Later values for a repeated header replace earlier ones.
    pub fn insert(&mut self, column: String, value: String) {
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = ResultRow::default();
        for (column, value) in iter {
            row.insert(column.into(), value.into());
        }
        row
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Pairs each data row with the header row positionally. Short rows produce
/// missing keys, NULL cells are omitted.
pub fn flatten(results: ResultSet) -> Vec<ResultRow> {
    let mut rows = results.rows.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header: Vec<String> = header.into_iter().map(Option::unwrap_or_default).collect();

    rows.map(|cells| {
        let mut row = ResultRow::default();
        for (column, cell) in header.iter().zip(cells) {
            if let Some(value) = cell {
                row.insert(column.clone(), value);
            }
        }
        row
    })
    .collect()
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory engine for exercising the runner and the services.

    use super::*;
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };
    use tokio::time::Instant;

    #[derive(Default)]
    pub struct ScriptedEngine {
        statuses: Mutex<VecDeque<JobStatus>>,
        canned: Vec<(String, ResultSet)>,
        fail_submit: Option<String>,
        submitted: Mutex<Vec<String>>,
        pub status_calls: AtomicUsize,
        pub results_calls: AtomicUsize,
        pub cancel_calls: AtomicUsize,
        pub poll_instants: Mutex<Vec<Instant>>,
    }

    impl ScriptedEngine {
        /// Status answers are consumed in order; once exhausted every poll reports SUCCEEDED.
        pub fn with_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                ..Self::default()
            }
        }

        /// Jobs whose SQL contains `needle` return `rows` (header first).
        pub fn answering(mut self, needle: &str, rows: &[&[&str]]) -> Self {
            let rows = rows
                .iter()
                .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect())
                .collect();
            self.canned.push((needle.to_string(), ResultSet { rows }));
            self
        }

        pub fn failing_submit(mut self, message: &str) -> Self {
            self.fail_submit = Some(message.to_string());
            self
        }

        pub fn submitted_sql(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryEngine for ScriptedEngine {
        async fn submit(&self, submission: &QuerySubmission<'_>) -> Result<JobHandle, EngineError> {
            if let Some(message) = &self.fail_submit {
                return Err(EngineError(message.clone()));
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(submission.sql.to_string());
            Ok(JobHandle::new(format!("job-{}", submitted.len() - 1)))
        }

        async fn status(&self, _job: &JobHandle) -> Result<JobStatus, EngineError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.poll_instants.lock().unwrap().push(Instant::now());
            let next = self.statuses.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| JobStatus::new(JobState::Succeeded)))
        }

        async fn results(&self, job: &JobHandle) -> Result<ResultSet, EngineError> {
            self.results_calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = job
                .as_str()
                .trim_start_matches("job-")
                .parse()
                .map_err(|_| EngineError("unknown job".to_string()))?;
            let sql = self.submitted.lock().unwrap()[index].clone();
            Ok(self
                .canned
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default())
        }

        async fn cancel(&self, _job: &JobHandle) -> Result<(), EngineError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
