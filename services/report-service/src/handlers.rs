use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::fields::ReportKind;
use crate::models::HealthResponse;
use crate::service::{self, SearchOutcome, ServiceError};
use crate::state::AppState;

pub const DROPPED_FILTERS_HEADER: &str = "x-dropped-filters";

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn not_found() -> impl IntoResponse {
    let err = ServiceError::not_found("endpoint not found".to_string());
    (err.status, Json(err.body))
}

fn search_response(result: Result<SearchOutcome, ServiceError>) -> Response {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            [(DROPPED_FILTERS_HEADER, outcome.dropped.len().to_string())],
            Json(outcome.rows),
        )
            .into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn flow_established(State(state): State<AppState>, body: Bytes) -> Response {
    search_response(service::search_body(&state, ReportKind::FlowEstablished, &body).await)
}

pub async fn domain_blocked(State(state): State<AppState>, body: Bytes) -> Response {
    search_response(service::search_body(&state, ReportKind::DomainBlocked, &body).await)
}

pub async fn search_term(
    State(state): State<AppState>,
    Path((kind, term)): Path<(String, String)>,
) -> Response {
    search_response(service::search_term(&state, &kind, &term).await)
}

pub async fn report_fields(
    State(state): State<AppState>,
    Path(report): Path<String>,
) -> impl IntoResponse {
    match service::report_fields(&state, &report) {
        Ok(fields) => (StatusCode::OK, Json(fields)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn list_reports() -> impl IntoResponse {
    Json(service::list_canned_reports())
}

pub async fn canned_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match service::canned_report(&state, &id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn sap_clients(State(state): State<AppState>) -> impl IntoResponse {
    match service::sap_clients(&state).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn sap_sids(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match service::sap_sids(&state, &body).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn sap_dashboard(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match service::sap_dashboard(&state, &body).await {
        Ok(dashboard) => (StatusCode::OK, Json(dashboard)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn sap_services_timeline(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match service::sap_services_timeline(&state, &body).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}
