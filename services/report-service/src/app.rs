use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    canned_report, domain_blocked, flow_established, health, healthz, list_reports, not_found,
    report_fields, sap_clients, sap_dashboard, sap_services_timeline, sap_sids, search_term,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/health", get(health))
        .route("/api/flow-established", post(flow_established))
        .route("/api/domain-blocked", post(domain_blocked))
        .route("/api/fields/:report", get(report_fields))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/:id", get(canned_report))
        .route("/api/reports/:kind/:term", get(search_term))
        .route("/api/sap/clients", get(sap_clients))
        .route("/api/sap/sids", post(sap_sids))
        .route("/api/sap/dashboard", post(sap_dashboard))
        .route("/api/sap/services-timeline", post(sap_services_timeline))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::engine::{testing::ScriptedEngine, JobState, JobStatus};
    use crate::handlers::DROPPED_FILTERS_HEADER;
    use crate::runner::JobRunner;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(engine: Arc<ScriptedEngine>) -> Router {
        let settings = Settings::default();
        let runner = JobRunner::new(engine, settings.output_location.clone(), settings.poll);
        build_router(AppState::new(runner, settings))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let dropped = response
            .headers()
            .get(DROPPED_FILTERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, dropped, json)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, _, body) = send(app(Arc::default()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let (status, _, body) = send(app(Arc::default()), get("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn search_returns_rows_and_dropped_count() {
        let engine = Arc::new(ScriptedEngine::default().answering(
            "flow-established",
            &[&["initiator", "sourceip"], &["O'Brien", "10.0.0.1"]],
        ));
        let request = post_json(
            "/api/flow-established",
            r#"{"filters":[{"field":"initiator","operator":"=","value":"O'Brien"},{"field":"bogus","value":"x"}]}"#,
        );
        let (status, dropped, body) = send(app(engine.clone()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(dropped.as_deref(), Some("1"));
        assert_eq!(body, json!([{"initiator": "O'Brien", "sourceip": "10.0.0.1"}]));
        let sql = engine.submitted_sql();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("initiator = 'O''Brien'"));
        assert!(!sql[0].contains("bogus"));
    }

    #[tokio::test]
    async fn malformed_filter_entries_do_not_fail_the_search() {
        let engine = Arc::new(ScriptedEngine::default());
        let request = post_json(
            "/api/domain-blocked",
            r#"{"filters":[{"field":5,"value":"x"},{"field":"domain","operator":[],"value":"example.com"}]}"#,
        );
        let (status, dropped, body) = send(app(engine.clone()), request).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(dropped.as_deref(), Some("1"));
        assert!(engine.submitted_sql()[0].contains(r#""log"."domainname" = 'example.com'"#));
    }

    #[tokio::test]
    async fn missing_body_is_400() {
        let engine = Arc::new(ScriptedEngine::default());
        let (status, _, body) = send(app(engine.clone()), post_json("/api/domain-blocked", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
        assert!(engine.submitted_sql().is_empty());
    }

    #[tokio::test]
    async fn failed_job_is_500_with_reason() {
        let engine = Arc::new(ScriptedEngine::with_statuses([JobStatus::with_reason(
            JobState::Failed,
            "Insufficient permissions",
        )]));
        let (status, _, body) = send(app(engine), get("/api/reports/top-users-blocked")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "query_failed");
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("Insufficient permissions"));
    }

    #[tokio::test]
    async fn search_shortcut_caps_rows() {
        let engine = Arc::new(ScriptedEngine::default());
        let (status, _, body) = send(app(engine.clone()), get("/api/reports/by-user/alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
        assert!(engine.submitted_sql()[0].ends_with("initiator = 'alice' ORDER BY timestamp DESC LIMIT 500;"));

        let (status, _, _) = send(app(Arc::default()), get("/api/reports/by-email/alice")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn report_catalog_and_fields() {
        let (status, _, body) = send(app(Arc::default()), get("/api/reports")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(6));

        let (status, _, body) = send(app(Arc::default()), get("/api/fields/flow-established")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body
            .as_array()
            .unwrap()
            .iter()
            .any(|field| field["key"] == "destinationport" && field["type"] == "number"));

        let (status, _, _) = send(app(Arc::default()), get("/api/reports/unknown-report")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn every_frontend_report_is_served() {
        let engine = Arc::new(ScriptedEngine::default().answering(
            "total_connections",
            &[&["total_connections", "unique_users", "blocked_percentage"], &["120", "7", "12.50"]],
        ));
        for id in [
            "dashboard-kpis",
            "top-used-services",
            "top-users-blocked",
            "latest-blocked",
            "allowed-vs-blocked-summary",
            "hourly-blocked-analysis",
        ] {
            let (status, _, body) = send(app(engine.clone()), get(&format!("/api/reports/{id}"))).await;
            assert_eq!(status, StatusCode::OK, "{id}: {body}");
            assert!(body.is_array(), "{id}");
        }

        let (_, _, body) = send(app(engine), get("/api/reports/dashboard-kpis")).await;
        assert_eq!(
            body,
            json!([{"total_connections": "120", "unique_users": "7", "blocked_percentage": "12.50"}])
        );
    }

    #[tokio::test]
    async fn dashboard_requires_dates() {
        let (status, _, body) = send(
            app(Arc::default()),
            post_json("/api/sap/dashboard", r#"{"clients":["Acme"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "startDate and endDate are required");
    }

    #[tokio::test]
    async fn dashboard_aggregates_kpis() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .answering("BETWEEN '2024-05-02'", &[&["unused"]])
                .answering("COUNT(*) AS total_dumps", &[&["nomecliente", "total_dumps"], &["Acme", "5"]])
                .answering("COUNT(*) AS failed_backups", &[&["nomecliente", "failed_backups"], &["Acme", "2"]])
                .answering("COUNT(*) AS cancelled_jobs", &[&["nomecliente", "cancelled_jobs"], &["Acme", "0"]]),
        );
        let (status, _, body) = send(
            app(engine),
            post_json(
                "/api/sap/dashboard",
                r#"{"startDate":"2024-06-01","endDate":"2024-06-30","clients":["Acme"]}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["kpis"]["totalDumps"]["value"], 5);
        assert_eq!(body["kpis"]["failedBackups"]["value"], 2);
        assert_eq!(body["kpis"]["cancelledJobs"]["value"], 0);
        assert_eq!(body["kpis"]["totalDumps"]["trendLabel"], "+100%");
    }

    #[tokio::test]
    async fn sap_lookups() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .answering("DISTINCT sid", &[&["sid", "nomecliente"], &["PRD", "Acme"]])
                .answering("DISTINCT nomecliente", &[&["nomecliente"], &["Acme"]]),
        );
        let (status, _, body) = send(app(engine.clone()), get("/api/sap/clients")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"nomecliente": "Acme"}]));

        let (status, _, body) =
            send(app(engine.clone()), post_json("/api/sap/sids", r#"{"clients":["Acme"]}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"sid": "PRD", "nomecliente": "Acme"}]));
        assert!(engine.submitted_sql()[1].contains("nomecliente IN ('Acme')"));
    }

    #[tokio::test]
    async fn services_timeline_filters_by_period() {
        let engine = Arc::new(ScriptedEngine::default().answering(
            "dump_ko",
            &[&["datacontrollo", "nomecliente", "dump_ko"], &["2024-06-01", "Acme", "1"]],
        ));
        let (status, _, body) = send(
            app(engine.clone()),
            post_json(
                "/api/sap/services-timeline",
                r#"{"startDate":"2024-06-01","endDate":"2024-06-30"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["dump_ko"], "1");
        assert!(engine.submitted_sql()[0].contains("BETWEEN '2024-06-01' AND '2024-06-30'"));
    }
}
