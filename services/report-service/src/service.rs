use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use crate::builder::{self, DroppedFilter, QueryCriteria};
use crate::catalog::{self, SearchKind, CANNED_REPORTS};
use crate::dashboard::{self, Dashboard};
use crate::engine::ResultRow;
use crate::fields::ReportKind;
use crate::models::{CannedReportSummary, ErrorResponse, FieldSummary, SidsRequest};
use crate::runner::RunError;
use crate::sap::{self, SapFilters};
use crate::state::AppState;

pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message,
                detail: None,
            },
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message.to_string())
    }

    pub fn not_found(message: String) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl From<RunError> for ServiceError {
    fn from(err: RunError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                code: "query_failed",
                message: "query execution failed".to_string(),
                detail: Some(err.to_string()),
            },
        }
    }
}

pub struct SearchOutcome {
    pub rows: Vec<ResultRow>,
    pub dropped: Vec<DroppedFilter>,
}

/// Decodes a JSON body. An absent, `null` or malformed body is a client error.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServiceError::bad_request("request body is required"));
    }
    let parsed: Option<T> = serde_json::from_slice(body).map_err(|err| {
        ServiceError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("invalid request body: {err}"),
        )
    })?;
    parsed.ok_or_else(|| ServiceError::bad_request("request body is required"))
}

pub async fn search(
    state: &AppState,
    kind: ReportKind,
    criteria: &QueryCriteria,
) -> Result<SearchOutcome, ServiceError> {
    let config = state.reports.get(kind);
    let built = builder::build(criteria, config);
    let rows = state
        .runner
        .run(&built.sql, &state.settings.log_database, &state.settings.workgroup)
        .await
        .map_err(|err| {
            tracing::error!(report = %kind, error = %err, "search failed");
            ServiceError::from(err)
        })?;
    Ok(SearchOutcome {
        rows,
        dropped: built.dropped,
    })
}

pub async fn search_body(
    state: &AppState,
    kind: ReportKind,
    body: &[u8],
) -> Result<SearchOutcome, ServiceError> {
    let criteria: QueryCriteria = parse_body(body)?;
    search(state, kind, &criteria).await
}

pub async fn search_term(
    state: &AppState,
    kind: &str,
    term: &str,
) -> Result<SearchOutcome, ServiceError> {
    let Some(kind) = SearchKind::parse(kind) else {
        return Err(ServiceError::not_found(format!("unknown search type: {kind}")));
    };
    if term.trim().is_empty() {
        return Err(ServiceError::bad_request("search term is required"));
    }

    let config = state
        .reports
        .get(ReportKind::FlowEstablished)
        .with_limit(Some(state.settings.search_row_limit));
    let built = builder::build(&kind.criteria(term), &config);
    let rows = state
        .runner
        .run(&built.sql, &state.settings.log_database, &state.settings.workgroup)
        .await?;
    Ok(SearchOutcome {
        rows,
        dropped: built.dropped,
    })
}

pub fn report_fields(state: &AppState, report: &str) -> Result<Vec<FieldSummary>, ServiceError> {
    let kind: ReportKind = report
        .parse()
        .map_err(|_| ServiceError::not_found(format!("unknown report: {report}")))?;
    let config = state.reports.get(kind);
    Ok(config
        .fields
        .keys()
        .filter_map(|key| config.fields.get(key))
        .map(FieldSummary::from)
        .collect())
}

pub fn list_canned_reports() -> Vec<CannedReportSummary> {
    CANNED_REPORTS
        .iter()
        .map(|report| CannedReportSummary {
            id: report.id,
            title: report.title,
        })
        .collect()
}

pub async fn canned_report(state: &AppState, id: &str) -> Result<Vec<ResultRow>, ServiceError> {
    let report = catalog::canned_report(id)
        .ok_or_else(|| ServiceError::not_found(format!("unknown report: {id}")))?;
    let rows = state
        .runner
        .run(&report.sql(), &state.settings.log_database, &state.settings.workgroup)
        .await?;
    Ok(rows)
}

pub async fn sap_clients(state: &AppState) -> Result<Vec<ResultRow>, ServiceError> {
    let rows = state
        .runner
        .run(
            &sap::available_clients(),
            &state.settings.sap_database,
            &state.settings.workgroup,
        )
        .await?;
    Ok(rows)
}

pub async fn sap_sids(state: &AppState, body: &[u8]) -> Result<Vec<ResultRow>, ServiceError> {
    let request: SidsRequest = parse_body(body)?;
    tracing::debug!(clients = request.clients.len(), "loading sids");
    let rows = state
        .runner
        .run(
            &sap::available_sids(&request.clients),
            &state.settings.sap_database,
            &state.settings.workgroup,
        )
        .await?;
    Ok(rows)
}

pub async fn sap_dashboard(state: &AppState, body: &[u8]) -> Result<Dashboard, ServiceError> {
    let filters: SapFilters = parse_body(body)?;
    validate_period(&filters)?;

    let rows = dashboard::load(
        &state.runner,
        &state.settings.sap_database,
        &state.settings.workgroup,
        &filters,
    )
    .await
    .map_err(|err| {
        tracing::error!(error = %err, "dashboard load failed");
        ServiceError::from(err)
    })?;
    Ok(dashboard::summarize(rows))
}

/// Per-day, per-client counts of failed service checks.
pub async fn sap_services_timeline(
    state: &AppState,
    body: &[u8],
) -> Result<Vec<ResultRow>, ServiceError> {
    let filters: SapFilters = parse_body(body)?;
    let rows = state
        .runner
        .run(
            &sap::services_timeline(&filters),
            &state.settings.sap_database,
            &state.settings.workgroup,
        )
        .await?;
    Ok(rows)
}

fn validate_period(filters: &SapFilters) -> Result<(), ServiceError> {
    let (Some(start), Some(end)) = (&filters.start_date, &filters.end_date) else {
        return Err(ServiceError::bad_request("startDate and endDate are required"));
    };
    match (sap::parse_date(start), sap::parse_date(end)) {
        (Some(start), Some(end)) if start <= end => Ok(()),
        (Some(_), Some(_)) => Err(ServiceError::bad_request(
            "startDate must not be after endDate",
        )),
        _ => Err(ServiceError::bad_request("dates must use YYYY-MM-DD")),
    }
}
