use crate::builder::{FilterCriterion, QueryCriteria};
use crate::fields::LOG_TABLE;

/// A fixed statement served by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CannedReport {
    pub id: &'static str,
    pub title: &'static str,
    sql: &'static str,
}

impl CannedReport {
    pub fn sql(&self) -> String {
        self.sql.replace("{table}", LOG_TABLE)
    }
}

/// Column aliases are the keys the reporting frontend reads from each row.
pub static CANNED_REPORTS: [CannedReport; 6] = [
    CannedReport {
        id: "dashboard-kpis",
        title: "Connection KPIs, last 24 hours",
        sql: "SELECT COUNT(*) AS total_connections, \
              COUNT(DISTINCT initiator) AS unique_users, \
              ROUND(100.0 * SUM(CASE WHEN \"log\".\"allowed\" = false THEN 1 ELSE 0 END) \
              / NULLIF(COUNT(*), 0), 2) AS blocked_percentage \
              FROM {table} \
              WHERE eventname = 'flow-established' \
              AND from_iso8601_timestamp(timestamp) >= current_timestamp - INTERVAL '1' DAY;",
    },
    CannedReport {
        id: "top-used-services",
        title: "Most used destination services",
        sql: "SELECT \"log\".\"destinationparentname\" AS servizio_destinazione, \
              COUNT(*) AS comannessioni_riuscite FROM {table} \
              WHERE eventname = 'flow-established' AND \"log\".\"allowed\" = true \
              GROUP BY 1 ORDER BY comannessioni_riuscite DESC LIMIT 10;",
    },
    CannedReport {
        id: "latest-blocked",
        title: "Latest blocked connections",
        sql: "SELECT timestamp, initiator, \
              \"log\".\"destinationparentname\" AS servizio_destinazione FROM {table} \
              WHERE eventname = 'flow-established' AND \"log\".\"allowed\" = false \
              ORDER BY timestamp DESC LIMIT 5;",
    },
    CannedReport {
        id: "allowed-vs-blocked-summary",
        title: "Allowed vs blocked connections",
        sql: "SELECT CASE WHEN \"log\".\"allowed\" THEN 'allowed' ELSE 'blocked' END AS stato_connessione, \
              COUNT(*) AS totale FROM {table} \
              WHERE eventname = 'flow-established' GROUP BY 1 ORDER BY totale DESC;",
    },
    CannedReport {
        id: "top-users-blocked",
        title: "Users with the most blocked connections",
        sql: "SELECT initiator, COUNT(*) AS numero_connessioni_bloccate FROM {table} \
              WHERE eventname = 'flow-established' AND \"log\".\"allowed\" = false \
              GROUP BY initiator ORDER BY numero_connessioni_bloccate DESC LIMIT 10;",
    },
    CannedReport {
        id: "hourly-blocked-analysis",
        title: "Blocked connections by hour of day",
        sql: "SELECT hour(from_iso8601_timestamp(timestamp)) AS ora_del_giorno, \
              COUNT(*) AS totale_connessioni_bloccate FROM {table} \
              WHERE eventname = 'flow-established' AND \"log\".\"allowed\" = false \
              GROUP BY 1 ORDER BY 1;",
    },
];

pub fn canned_report(id: &str) -> Option<&'static CannedReport> {
    CANNED_REPORTS.iter().find(|report| report.id == id)
}

/// Single-term lookups, run against the flow-established report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    User,
    Ip,
}

impl SearchKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" | "by-user" => Some(SearchKind::User),
            "ip" | "by-ip" => Some(SearchKind::Ip),
            _ => None,
        }
    }

    fn field(self) -> &'static str {
        match self {
            SearchKind::User => "initiator",
            SearchKind::Ip => "sourceip",
        }
    }

    pub fn criteria(self, term: &str) -> QueryCriteria {
        QueryCriteria {
            filters: vec![FilterCriterion::equals(self.field(), term.trim())],
            select_fields: None,
        }
    }
}
