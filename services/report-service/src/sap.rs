//! Statement family for the SAP health reports. Every caller-supplied
//! literal goes through [`sanitize::quote_literal`].

use chrono::{Days, NaiveDate};
use serde::Deserialize;

use crate::sanitize;

const SAP_TABLE: &str = r#""sap_reports_db"."reportparquet""#;
const FAILED_BACKUP: &str = "(backup.status LIKE '%failed%' OR backup.status LIKE '%FAILED%')";
const CANCELLED_JOB: &str = "job.status = 'CANCELLED'";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SapFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub sids: Vec<String>,
}

impl SapFilters {
    fn with_period(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start.format(DATE_FORMAT).to_string()),
            end_date: Some(end.format(DATE_FORMAT).to_string()),
            ..self.clone()
        }
    }
}

/// Predicates shared by every SAP statement, without the `WHERE` keyword.
pub fn base_conditions(filters: &SapFilters) -> Vec<String> {
    let mut conditions = Vec::new();
    if let (Some(start), Some(end)) = (&filters.start_date, &filters.end_date) {
        conditions.push(format!(
            "datacontrollo BETWEEN {} AND {}",
            sanitize::quote_literal(start),
            sanitize::quote_literal(end)
        ));
    }
    if !filters.clients.is_empty() {
        conditions.push(format!("nomecliente IN ({})", literal_list(&filters.clients)));
    }
    if !filters.sids.is_empty() {
        conditions.push(format!("sid IN ({})", literal_list(&filters.sids)));
    }
    conditions
}

fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| sanitize::quote_literal(value))
        .collect::<Vec<_>>()
        .join(",")
}

fn where_clause(filters: &SapFilters, extra: Option<&str>) -> String {
    let mut conditions = base_conditions(filters);
    conditions.extend(extra.map(str::to_string));
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

pub fn total_dumps(filters: &SapFilters) -> String {
    format!(
        "SELECT nomecliente, datacontrollo, COUNT(*) AS total_dumps \
         FROM {SAP_TABLE} CROSS JOIN UNNEST(abap_short_dumps) AS t(dump) {} \
         GROUP BY nomecliente, datacontrollo",
        where_clause(filters, None)
    )
}

pub fn failed_backups(filters: &SapFilters) -> String {
    format!(
        "SELECT nomecliente, datacontrollo, COUNT(*) AS failed_backups \
         FROM {SAP_TABLE} CROSS JOIN UNNEST(situazione_backup) AS t(backup) {} \
         GROUP BY nomecliente, datacontrollo",
        where_clause(filters, Some(FAILED_BACKUP))
    )
}

pub fn cancelled_jobs(filters: &SapFilters) -> String {
    format!(
        "SELECT nomecliente, datacontrollo, COUNT(*) AS cancelled_jobs \
         FROM {SAP_TABLE} CROSS JOIN UNNEST(abap_batch_jobs) AS t(job) {} \
         GROUP BY nomecliente, datacontrollo",
        where_clause(filters, Some(CANCELLED_JOB))
    )
}

pub fn services_ko(filters: &SapFilters) -> String {
    format!(
        "SELECT nomecliente, datacontrollo, \
         stato_servizi.dump AS dump_status, \
         stato_servizi.job_in_errore AS job_error_status, \
         stato_servizi.processi_attivi AS active_processes_status, \
         stato_servizi.spazio_database AS db_space_status, \
         stato_servizi.spazio_log AS log_space_status \
         FROM {SAP_TABLE} {}",
        where_clause(filters, None)
    )
}

pub fn dump_types(filters: &SapFilters) -> String {
    format!(
        "SELECT dump.short_dump_type AS dump_type, COUNT(*) AS count, nomecliente \
         FROM {SAP_TABLE} CROSS JOIN UNNEST(abap_short_dumps) AS t(dump) {} \
         GROUP BY dump.short_dump_type, nomecliente ORDER BY count DESC",
        where_clause(filters, None)
    )
}

pub fn issues_by_client(filters: &SapFilters) -> String {
    format!(
        "WITH dumps AS (\
         SELECT nomecliente, COUNT(*) AS dump_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(abap_short_dumps) AS t(dump) {} GROUP BY nomecliente), \
         failed_backups AS (\
         SELECT nomecliente, COUNT(*) AS backup_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(situazione_backup) AS t(backup) {} GROUP BY nomecliente), \
         cancelled_jobs AS (\
         SELECT nomecliente, COUNT(*) AS job_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(abap_batch_jobs) AS t(job) {} GROUP BY nomecliente) \
         SELECT COALESCE(d.nomecliente, fb.nomecliente, cj.nomecliente) AS nomecliente, \
         COALESCE(d.dump_count, 0) AS dumps, \
         COALESCE(fb.backup_count, 0) AS failed_backups, \
         COALESCE(cj.job_count, 0) AS cancelled_jobs \
         FROM dumps d \
         FULL OUTER JOIN failed_backups fb ON d.nomecliente = fb.nomecliente \
         FULL OUTER JOIN cancelled_jobs cj ON COALESCE(d.nomecliente, fb.nomecliente) = cj.nomecliente",
        where_clause(filters, None),
        where_clause(filters, Some(FAILED_BACKUP)),
        where_clause(filters, Some(CANCELLED_JOB)),
    )
}

pub fn available_clients() -> String {
    format!("SELECT DISTINCT nomecliente FROM {SAP_TABLE} ORDER BY nomecliente")
}

pub fn available_sids(clients: &[String]) -> String {
    let filter = if clients.is_empty() {
        String::new()
    } else {
        format!(" WHERE nomecliente IN ({})", literal_list(clients))
    };
    format!("SELECT DISTINCT sid, nomecliente FROM {SAP_TABLE}{filter} ORDER BY sid")
}

pub fn services_timeline(filters: &SapFilters) -> String {
    let counters = [
        ("dump", "dump_ko"),
        ("job_in_errore", "job_ko"),
        ("processi_attivi", "processes_ko"),
        ("spazio_database", "db_ko"),
        ("spazio_log", "log_ko"),
        ("scadenza_certificati", "cert_ko"),
        ("update_in_errore", "update_ko"),
        ("spool", "spool_ko"),
    ]
    .iter()
    .map(|(column, alias)| {
        format!("SUM(CASE WHEN stato_servizi.{column} = 'ko' THEN 1 ELSE 0 END) AS {alias}")
    })
    .collect::<Vec<_>>()
    .join(", ");
    format!(
        "SELECT datacontrollo, nomecliente, {counters} FROM {SAP_TABLE} {} \
         GROUP BY datacontrollo, nomecliente ORDER BY datacontrollo ASC",
        where_clause(filters, None)
    )
}

pub fn problems_timeline(filters: &SapFilters) -> String {
    format!(
        "WITH daily_dumps AS (\
         SELECT datacontrollo, COUNT(*) AS dump_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(abap_short_dumps) AS t(dump) {} GROUP BY datacontrollo), \
         daily_backups AS (\
         SELECT datacontrollo, COUNT(*) AS backup_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(situazione_backup) AS t(backup) {} GROUP BY datacontrollo), \
         daily_jobs AS (\
         SELECT datacontrollo, COUNT(*) AS job_count FROM {SAP_TABLE} \
         CROSS JOIN UNNEST(abap_batch_jobs) AS t(job) {} GROUP BY datacontrollo) \
         SELECT COALESCE(dd.datacontrollo, db.datacontrollo, dj.datacontrollo) AS datacontrollo, \
         COALESCE(dd.dump_count, 0) AS dumps, \
         COALESCE(db.backup_count, 0) AS failed_backups, \
         COALESCE(dj.job_count, 0) AS cancelled_jobs \
         FROM daily_dumps dd \
         FULL OUTER JOIN daily_backups db ON dd.datacontrollo = db.datacontrollo \
         FULL OUTER JOIN daily_jobs dj ON COALESCE(dd.datacontrollo, db.datacontrollo) = dj.datacontrollo \
         ORDER BY datacontrollo ASC",
        where_clause(filters, None),
        where_clause(filters, Some(FAILED_BACKUP)),
        where_clause(filters, Some(CANCELLED_JOB)),
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodMetric {
    Dumps,
    Backups,
    Jobs,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// The equally long window that ends the day before `start`.
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let span = u64::try_from((end - start).num_days()).ok()?;
    let prev_end = start.checked_sub_days(Days::new(1))?;
    let prev_start = prev_end.checked_sub_days(Days::new(span))?;
    Some((prev_start, prev_end))
}

/// The same metric statement over the previous period. `None` when the
/// dates are missing, malformed or reversed.
pub fn previous_period_query(filters: &SapFilters, metric: PeriodMetric) -> Option<String> {
    let start = parse_date(filters.start_date.as_deref()?)?;
    let end = parse_date(filters.end_date.as_deref()?)?;
    let (prev_start, prev_end) = previous_period(start, end)?;
    let previous = filters.with_period(prev_start, prev_end);
    Some(match metric {
        PeriodMetric::Dumps => total_dumps(&previous),
        PeriodMetric::Backups => failed_backups(&previous),
        PeriodMetric::Jobs => cancelled_jobs(&previous),
    })
}
