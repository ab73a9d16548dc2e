use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::sanitize;

pub const LOG_TABLE: &str = r#""cloudconnexa_logs_db"."extracted_logs""#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
}

impl FieldType {
    /// Numbers and booleans are emitted as bare tokens; everything else is quoted.
    pub fn is_quoted(self) -> bool {
        !matches!(self, FieldType::Number | FieldType::Boolean)
    }
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub key: String,
    pub expression: String,
    pub field_type: FieldType,
    pub label: String,
}

impl FieldDescriptor {
    pub fn new(key: &str, expression: &str, field_type: FieldType, label: &str) -> Self {
        Self {
            key: key.to_string(),
            expression: expression.to_string(),
            field_type,
            label: label.to_string(),
        }
    }
}

/// Logical field name to SQL expression. Its keys are the column whitelist.
#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl FieldMap {
    pub fn new(fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|field| (field.key.clone(), field))
                .collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the descriptor only for whitelisted keys.
    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        if !sanitize::is_allowed(key, self.keys()) {
            return None;
        }
        self.fields.get(key)
    }
}

/// Everything the builder needs to produce one report's statement.
#[derive(Clone, Debug)]
pub struct ReportConfig {
    pub name: &'static str,
    pub table: String,
    pub fields: FieldMap,
    pub default_select: Vec<String>,
    /// Trusted, fixed predicate. Never built from request data.
    pub base_where: Option<String>,
    pub order_by: String,
    pub limit: Option<u32>,
}

impl ReportConfig {
    pub fn with_limit(&self, limit: Option<u32>) -> Self {
        Self {
            limit,
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    FlowEstablished,
    DomainBlocked,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ReportKind::FlowEstablished => "flow-established",
            ReportKind::DomainBlocked => "domain-blocked",
        };
        write!(f, "{value}")
    }
}

impl FromStr for ReportKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow-established" => Ok(ReportKind::FlowEstablished),
            "domain-blocked" => Ok(ReportKind::DomainBlocked),
            _ => Err(()),
        }
    }
}

/// The immutable set of search report configurations, built once at startup.
#[derive(Clone, Debug)]
pub struct ReportConfigs {
    flow_established: ReportConfig,
    domain_blocked: ReportConfig,
}

impl ReportConfigs {
    pub fn standard() -> Self {
        Self {
            flow_established: flow_established(),
            domain_blocked: domain_blocked(),
        }
    }

    pub fn get(&self, kind: ReportKind) -> &ReportConfig {
        match kind {
            ReportKind::FlowEstablished => &self.flow_established,
            ReportKind::DomainBlocked => &self.domain_blocked,
        }
    }
}

impl Default for ReportConfigs {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn flow_established() -> ReportConfig {
    let fields = FieldMap::new([
        FieldDescriptor::new("timestamp", "timestamp", FieldType::Date, "Timestamp"),
        FieldDescriptor::new("initiator", "initiator", FieldType::String, "User"),
        FieldDescriptor::new("sourceip", r#""log"."sourceip""#, FieldType::String, "Source IP"),
        FieldDescriptor::new(
            "destinationip",
            r#""log"."destinationentityip""#,
            FieldType::String,
            "Destination IP",
        ),
        FieldDescriptor::new(
            "destinationport",
            r#""log"."destinationport""#,
            FieldType::Number,
            "Destination port",
        ),
        FieldDescriptor::new(
            "customer",
            r#""log"."destinationparentname""#,
            FieldType::String,
            "Customer",
        ),
        FieldDescriptor::new("protocol", r#""log"."protocolname""#, FieldType::String, "Protocol"),
        FieldDescriptor::new("allowed", r#""log"."allowed""#, FieldType::Boolean, "Allowed"),
    ]);

    ReportConfig {
        name: "flow-established",
        table: LOG_TABLE.to_string(),
        fields,
        default_select: keys(&[
            "timestamp",
            "initiator",
            "sourceip",
            "destinationip",
            "destinationport",
            "customer",
            "allowed",
        ]),
        base_where: Some("eventname = 'flow-established'".to_string()),
        order_by: "timestamp DESC".to_string(),
        limit: None,
    }
}

pub fn domain_blocked() -> ReportConfig {
    let fields = FieldMap::new([
        FieldDescriptor::new("timestamp", "timestamp", FieldType::Date, "Timestamp"),
        FieldDescriptor::new("initiator", "initiator", FieldType::String, "User"),
        FieldDescriptor::new("sourceip", r#""log"."sourceip""#, FieldType::String, "Source IP"),
        FieldDescriptor::new("domain", r#""log"."domainname""#, FieldType::String, "Domain"),
        FieldDescriptor::new(
            "customer",
            r#""log"."destinationparentname""#,
            FieldType::String,
            "Customer",
        ),
        FieldDescriptor::new("protocol", r#""log"."protocolname""#, FieldType::String, "Protocol"),
    ]);

    ReportConfig {
        name: "domain-blocked",
        table: LOG_TABLE.to_string(),
        fields,
        default_select: keys(&["timestamp", "initiator", "sourceip", "domain", "customer"]),
        base_where: Some("eventname = 'domain-blocked'".to_string()),
        order_by: "timestamp DESC".to_string(),
        limit: None,
    }
}

fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
