use std::sync::Arc;

use crate::config::Settings;
use crate::fields::ReportConfigs;
use crate::runner::JobRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
    pub reports: Arc<ReportConfigs>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(runner: JobRunner, settings: Settings) -> Self {
        Self {
            runner,
            reports: Arc::new(ReportConfigs::standard()),
            settings: Arc::new(settings),
        }
    }
}
