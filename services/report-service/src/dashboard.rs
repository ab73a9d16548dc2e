//! SAP dashboard: runs the metric statements in parallel and reduces the
//! returned rows into KPIs and chart series.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::ResultRow;
use crate::runner::{JobRunner, RunError};
use crate::sap::{self, PeriodMetric, SapFilters};

const SERVICE_STATUS_COLUMNS: [&str; 5] = [
    "dump_status",
    "job_error_status",
    "active_processes_status",
    "db_space_status",
    "log_space_status",
];

/// Rows returned by every statement the dashboard needs.
#[derive(Clone, Debug, Default)]
pub struct DashboardRows {
    pub dumps: Vec<ResultRow>,
    pub backups: Vec<ResultRow>,
    pub jobs: Vec<ResultRow>,
    pub previous_dumps: Vec<ResultRow>,
    pub previous_backups: Vec<ResultRow>,
    pub previous_jobs: Vec<ResultRow>,
    pub services: Vec<ResultRow>,
    pub dump_types: Vec<ResultRow>,
    pub issues_by_client: Vec<ResultRow>,
    pub problems_timeline: Vec<ResultRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub value: u64,
    pub trend: i64,
    pub trend_label: String,
}

impl Kpi {
    pub fn new(value: u64, previous: u64) -> Self {
        let trend = percent_change(value, previous);
        let trend_label = match trend {
            t if t > 0 => format!("+{t}%"),
            t => format!("{t}%"),
        };
        Self {
            value,
            trend,
            trend_label,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Count {
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total_dumps: Kpi,
    pub failed_backups: Kpi,
    pub cancelled_jobs: Kpi,
    #[serde(rename = "servicesKO")]
    pub services_ko: Count,
}

/// Keys follow the column names of the issues-by-client statement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientIssues {
    pub nomecliente: String,
    pub dumps: u64,
    pub failed_backups: u64,
    pub cancelled_jobs: u64,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DumpTypeCount {
    pub dump_type: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemsTimeline {
    pub labels: Vec<String>,
    pub dumps: Vec<u64>,
    pub failed_backups: Vec<u64>,
    pub cancelled_jobs: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub issues_by_client: Vec<ClientIssues>,
    pub dump_types: Vec<DumpTypeCount>,
    pub problems_timeline: ProblemsTimeline,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawData {
    pub dumps: Vec<ResultRow>,
    pub failed_backups: Vec<ResultRow>,
    pub cancelled_jobs: Vec<ResultRow>,
    pub services: Vec<ResultRow>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub kpis: Kpis,
    pub charts: Charts,
    pub raw_data: RawData,
}

/// Runs every dashboard statement concurrently. The first failure fails the
/// whole dashboard; jobs already submitted are left to finish on their own.
pub async fn load(
    runner: &JobRunner,
    database: &str,
    workgroup: &str,
    filters: &SapFilters,
) -> Result<DashboardRows, RunError> {
    let run_previous = |metric| {
        let sql = sap::previous_period_query(filters, metric);
        async move {
            match sql {
                Some(sql) => runner.run(&sql, database, workgroup).await,
                None => Ok(Vec::new()),
            }
        }
    };

    let dumps_sql = sap::total_dumps(filters);
    let backups_sql = sap::failed_backups(filters);
    let jobs_sql = sap::cancelled_jobs(filters);
    let services_sql = sap::services_ko(filters);
    let dump_types_sql = sap::dump_types(filters);
    let issues_sql = sap::issues_by_client(filters);
    let timeline_sql = sap::problems_timeline(filters);

    let (
        dumps,
        backups,
        jobs,
        previous_dumps,
        previous_backups,
        previous_jobs,
        services,
        dump_types,
        issues_by_client,
        problems_timeline,
    ) = tokio::try_join!(
        runner.run(&dumps_sql, database, workgroup),
        runner.run(&backups_sql, database, workgroup),
        runner.run(&jobs_sql, database, workgroup),
        run_previous(PeriodMetric::Dumps),
        run_previous(PeriodMetric::Backups),
        run_previous(PeriodMetric::Jobs),
        runner.run(&services_sql, database, workgroup),
        runner.run(&dump_types_sql, database, workgroup),
        runner.run(&issues_sql, database, workgroup),
        runner.run(&timeline_sql, database, workgroup),
    )?;

    Ok(DashboardRows {
        dumps,
        backups,
        jobs,
        previous_dumps,
        previous_backups,
        previous_jobs,
        services,
        dump_types,
        issues_by_client,
        problems_timeline,
    })
}

pub fn summarize(rows: DashboardRows) -> Dashboard {
    let kpis = Kpis {
        total_dumps: Kpi::new(
            sum_column(&rows.dumps, "total_dumps"),
            sum_column(&rows.previous_dumps, "total_dumps"),
        ),
        failed_backups: Kpi::new(
            sum_column(&rows.backups, "failed_backups"),
            sum_column(&rows.previous_backups, "failed_backups"),
        ),
        cancelled_jobs: Kpi::new(
            sum_column(&rows.jobs, "cancelled_jobs"),
            sum_column(&rows.previous_jobs, "cancelled_jobs"),
        ),
        services_ko: Count {
            value: rows.services.iter().filter(|row| has_ko_service(row)).count() as u64,
        },
    };

    let charts = Charts {
        issues_by_client: client_issues(&rows.issues_by_client),
        dump_types: dump_type_counts(&rows.dump_types),
        problems_timeline: problems_timeline(&rows.problems_timeline),
    };

    Dashboard {
        kpis,
        charts,
        raw_data: RawData {
            dumps: rows.dumps,
            failed_backups: rows.backups,
            cancelled_jobs: rows.jobs,
            services: rows.services,
        },
    }
}

/// Cells are text; anything that is not a non-negative integer counts as 0.
fn count(row: &ResultRow, column: &str) -> u64 {
    row.get(column)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

pub fn sum_column(rows: &[ResultRow], column: &str) -> u64 {
    rows.iter().map(|row| count(row, column)).sum()
}

/// Rounded percentage change against the previous period.
pub fn percent_change(current: u64, previous: u64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    let delta = current as f64 - previous as f64;
    (delta / previous as f64 * 100.0).round() as i64
}

fn has_ko_service(row: &ResultRow) -> bool {
    SERVICE_STATUS_COLUMNS.iter().any(|column| {
        row.get(column)
            .is_some_and(|status| status.trim().eq_ignore_ascii_case("ko"))
    })
}

fn client_issues(rows: &[ResultRow]) -> Vec<ClientIssues> {
    let mut issues: Vec<ClientIssues> = rows
        .iter()
        .map(|row| {
            let dumps = count(row, "dumps");
            let failed_backups = count(row, "failed_backups");
            let cancelled_jobs = count(row, "cancelled_jobs");
            ClientIssues {
                nomecliente: row.get("nomecliente").unwrap_or_default().to_string(),
                dumps,
                failed_backups,
                cancelled_jobs,
                total: dumps + failed_backups + cancelled_jobs,
            }
        })
        .collect();
    issues.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.nomecliente.cmp(&b.nomecliente)));
    issues
}

/// Per-client rows summed per dump type, largest first.
fn dump_type_counts(rows: &[ResultRow]) -> Vec<DumpTypeCount> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for row in rows {
        let dump_type = row.get("dump_type").unwrap_or("Unknown");
        *totals.entry(dump_type).or_default() += count(row, "count");
    }
    let mut ranked: Vec<DumpTypeCount> = totals
        .into_iter()
        .map(|(dump_type, count)| DumpTypeCount {
            dump_type: dump_type.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.dump_type.cmp(&b.dump_type)));
    ranked
}

fn problems_timeline(rows: &[ResultRow]) -> ProblemsTimeline {
    let mut timeline = ProblemsTimeline::default();
    for row in rows {
        timeline
            .labels
            .push(row.get("datacontrollo").unwrap_or_default().to_string());
        timeline.dumps.push(count(row, "dumps"));
        timeline.failed_backups.push(count(row, "failed_backups"));
        timeline.cancelled_jobs.push(count(row, "cancelled_jobs"));
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{testing::ScriptedEngine, JobState, JobStatus};
    use crate::runner::PollPolicy;
    use std::sync::Arc;

    fn row(cells: &[(&str, &str)]) -> ResultRow {
        cells.iter().copied().collect()
    }

    #[test]
    fn sums_kpis_from_parallel_results() {
        let dashboard = summarize(DashboardRows {
            dumps: vec![row(&[("total_dumps", "5")])],
            backups: vec![row(&[("failed_backups", "2")])],
            jobs: vec![row(&[("cancelled_jobs", "0")])],
            ..DashboardRows::default()
        });
        assert_eq!(dashboard.kpis.total_dumps.value, 5);
        assert_eq!(dashboard.kpis.failed_backups.value, 2);
        assert_eq!(dashboard.kpis.cancelled_jobs.value, 0);
    }

    #[test]
    fn trend_against_previous_period() {
        assert_eq!(percent_change(5, 4), 25);
        assert_eq!(percent_change(1, 3), -67);
        assert_eq!(percent_change(3, 0), 100);
        assert_eq!(percent_change(0, 0), 0);
        assert_eq!(Kpi::new(5, 4).trend_label, "+25%");
        assert_eq!(Kpi::new(2, 4).trend_label, "-50%");
        assert_eq!(Kpi::new(0, 0).trend_label, "0%");
    }

    #[test]
    fn non_numeric_cells_count_as_zero() {
        let rows = vec![
            row(&[("total_dumps", "3")]),
            row(&[("total_dumps", "n/a")]),
            row(&[("other", "9")]),
        ];
        assert_eq!(sum_column(&rows, "total_dumps"), 3);
    }

    #[test]
    fn charts_are_ranked() {
        let dashboard = summarize(DashboardRows {
            services: vec![
                row(&[("dump_status", "ok"), ("log_space_status", "KO")]),
                row(&[("dump_status", "ok")]),
            ],
            dump_types: vec![
                row(&[("dump_type", "TIME_OUT"), ("count", "2"), ("nomecliente", "A")]),
                row(&[("dump_type", "MESSAGE_TYPE_X"), ("count", "4"), ("nomecliente", "A")]),
                row(&[("dump_type", "TIME_OUT"), ("count", "3"), ("nomecliente", "B")]),
            ],
            issues_by_client: vec![
                row(&[("nomecliente", "A"), ("dumps", "1"), ("failed_backups", "0"), ("cancelled_jobs", "0")]),
                row(&[("nomecliente", "B"), ("dumps", "2"), ("failed_backups", "1"), ("cancelled_jobs", "1")]),
            ],
            ..DashboardRows::default()
        });
        assert_eq!(dashboard.kpis.services_ko.value, 1);
        let dump_types: Vec<(&str, u64)> = dashboard
            .charts
            .dump_types
            .iter()
            .map(|entry| (entry.dump_type.as_str(), entry.count))
            .collect();
        assert_eq!(dump_types, vec![("TIME_OUT", 5), ("MESSAGE_TYPE_X", 4)]);
        assert_eq!(dashboard.charts.issues_by_client[0].nomecliente, "B");
        assert_eq!(dashboard.charts.issues_by_client[0].total, 4);
    }

    #[test]
    fn dashboard_json_shape() {
        let json = serde_json::to_value(summarize(DashboardRows {
            dump_types: vec![row(&[("dump_type", "TIME_OUT"), ("count", "2")])],
            issues_by_client: vec![row(&[
                ("nomecliente", "Acme"),
                ("dumps", "1"),
                ("failed_backups", "2"),
                ("cancelled_jobs", "0"),
            ])],
            ..DashboardRows::default()
        }))
        .unwrap();
        assert_eq!(json["kpis"]["totalDumps"]["trendLabel"], "0%");
        assert_eq!(json["kpis"]["servicesKO"]["value"], 0);
        assert_eq!(
            json["charts"]["issuesByClient"],
            serde_json::json!([{
                "nomecliente": "Acme",
                "dumps": 1,
                "failed_backups": 2,
                "cancelled_jobs": 0,
                "total": 3
            }])
        );
        assert_eq!(
            json["charts"]["dumpTypes"],
            serde_json::json!([{"dump_type": "TIME_OUT", "count": 2}])
        );
        assert!(json["rawData"]["failedBackups"].is_array());
    }

    #[tokio::test(start_paused = true)]
    async fn loads_every_statement() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .answering("BETWEEN '2024-01-30'", &[&["total_dumps"], &["9"]])
                .answering("total_dumps", &[&["total_dumps"], &["5"]])
                .answering("COUNT(*) AS failed_backups", &[&["failed_backups"], &["2"]])
                .answering("COUNT(*) AS cancelled_jobs", &[&["cancelled_jobs"], &["0"]]),
        );
        let runner = JobRunner::new(engine.clone(), "s3://out/".to_string(), PollPolicy::default());
        let filters = SapFilters {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-03-31".to_string()),
            ..SapFilters::default()
        };

        let rows = load(&runner, "sap_reports_db", "primary", &filters).await.unwrap();
        assert_eq!(engine.submitted_sql().len(), 10);

        let dashboard = summarize(rows);
        assert_eq!(dashboard.kpis.total_dumps.value, 5);
        assert_eq!(dashboard.kpis.total_dumps.trend, -44);
        assert_eq!(dashboard.kpis.failed_backups.value, 2);
        assert_eq!(dashboard.kpis.cancelled_jobs.value, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_job_fails_the_dashboard() {
        let engine = Arc::new(ScriptedEngine::with_statuses([JobStatus::with_reason(
            JobState::Failed,
            "Insufficient permissions",
        )]));
        let runner = JobRunner::new(engine, "s3://out/".to_string(), PollPolicy::default());
        let err = load(&runner, "sap_reports_db", "primary", &SapFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::JobFailed { .. }));
    }
}
