mod app;
mod athena;
mod builder;
mod catalog;
mod config;
mod dashboard;
mod engine;
mod fields;
mod handlers;
mod models;
mod runner;
mod sanitize;
mod sap;
mod service;
mod state;

use report_common::{bind_listener, init_tracing, shutdown_signal};
use std::sync::Arc;

use crate::athena::AthenaEngine;
use crate::config::Settings;
use crate::runner::JobRunner;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("report-service");

    let settings = Settings::from_env();
    tracing::info!(
        region = settings.region.as_str(),
        workgroup = settings.workgroup.as_str(),
        poll_interval_ms = settings.poll.interval.as_millis() as u64,
        max_wait_secs = settings.poll.max_wait.as_secs(),
        "starting report service"
    );

    let engine = AthenaEngine::new(&settings.region).await;
    let runner = JobRunner::new(
        Arc::new(engine),
        settings.output_location.clone(),
        settings.poll,
    );
    let port = settings.port;
    let app = app::build_router(AppState::new(runner, settings));
    let listener = bind_listener(port).await.expect("bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}
