use report_common::{env_or, env_string};
use std::time::Duration;

use crate::runner::PollPolicy;

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub region: String,
    pub log_database: String,
    pub sap_database: String,
    pub workgroup: String,
    pub output_location: String,
    pub poll: PollPolicy,
    pub search_row_limit: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        // Defaults match the production deployment in eu-west-1.
        let poll_interval_ms = env_or("ATHENA_POLL_INTERVAL_MS", 2000u64).max(1);
        let max_wait_secs = env_or("ATHENA_MAX_WAIT_SECS", 300u64);

        Self {
            port: env_or("PORT", 8080u16),
            region: env_string("AWS_REGION", "eu-west-1"),
            log_database: env_string("ATHENA_DB", "cloudconnexa_logs_db"),
            sap_database: env_string("SAP_DB", "sap_reports_db"),
            workgroup: env_string("ATHENA_WORKGROUP", "primary"),
            output_location: env_string(
                "ATHENA_OUTPUT_LOCATION",
                "s3://horsaruncloudconnexalog/athena-results/",
            ),
            poll: PollPolicy {
                interval: Duration::from_millis(poll_interval_ms),
                max_wait: Duration::from_secs(max_wait_secs),
            },
            search_row_limit: env_or("SEARCH_ROW_LIMIT", 500u32),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            region: "eu-west-1".to_string(),
            log_database: "cloudconnexa_logs_db".to_string(),
            sap_database: "sap_reports_db".to_string(),
            workgroup: "primary".to_string(),
            output_location: "s3://horsaruncloudconnexalog/athena-results/".to_string(),
            poll: PollPolicy::default(),
            search_row_limit: 500,
        }
    }
}
