use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::fields::{FieldDescriptor, FieldType, ReportConfig};
use crate::sanitize::{self, SqlValue};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryCriteria {
    #[serde(default, deserialize_with = "lenient_filters")]
    pub filters: Vec<FilterCriterion>,
    #[serde(default, rename = "selectFields")]
    pub select_fields: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterCriterion {
    #[serde(default, deserialize_with = "lenient_field")]
    pub field: String,
    #[serde(default, deserialize_with = "lenient_operator")]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
}

// Malformed filters must reach the builder so they are dropped, not turned
// into a rejected request.
fn lenient_filters<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<FilterCriterion>, D::Error> {
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| serde_json::from_value::<FilterCriterion>(entry).unwrap_or_default())
        .collect())
}

fn lenient_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(field) => field,
        _ => String::new(),
    })
}

fn lenient_operator<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(operator) => Some(operator),
        _ => None,
    })
}

impl FilterCriterion {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator: Some("=".to_string()),
            value: value.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Like,
}

impl Operator {
    /// Anything other than `=` or `LIKE` falls back to `=`.
    pub fn resolve(requested: Option<&str>) -> Self {
        match requested.map(str::trim) {
            Some(op) if op.eq_ignore_ascii_case("LIKE") => Operator::Like,
            _ => Operator::Eq,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Like => "LIKE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    UnknownField,
    EmptyValue,
    UnsupportedValue,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::UnknownField => "unknown_field",
            DropReason::EmptyValue => "empty_value",
            DropReason::UnsupportedValue => "unsupported_value",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedFilter {
    pub field: String,
    pub reason: DropReason,
}

/// The statement text plus the filters that were left out of it.
#[derive(Clone, Debug)]
pub struct BuiltQuery {
    pub sql: String,
    pub dropped: Vec<DroppedFilter>,
}

pub fn build(criteria: &QueryCriteria, config: &ReportConfig) -> BuiltQuery {
    let projection = render_projection(criteria.select_fields.as_deref(), config);

    let mut predicates: Vec<String> = config.base_where.iter().cloned().collect();
    let mut dropped = Vec::new();
    for filter in &criteria.filters {
        match render_filter(filter, config) {
            Ok(predicate) => predicates.push(predicate),
            Err(reason) => {
                tracing::warn!(
                    report = config.name,
                    field = filter.field.as_str(),
                    reason = reason.as_str(),
                    "filter dropped"
                );
                dropped.push(DroppedFilter {
                    field: filter.field.clone(),
                    reason,
                });
            }
        }
    }

    let mut sql = format!("SELECT {projection} FROM {}", config.table);
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&config.order_by);
    if let Some(limit) = config.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql.push(';');

    tracing::debug!(report = config.name, sql = sql.as_str(), "query built");
    BuiltQuery { sql, dropped }
}

fn render_projection(select_fields: Option<&[String]>, config: &ReportConfig) -> String {
    let requested = select_fields
        .filter(|keys| !keys.is_empty())
        .unwrap_or(config.default_select.as_slice());
    let mut columns = resolve_columns(requested, config);
    if columns.is_empty() {
        columns = resolve_columns(&config.default_select, config);
    }
    if columns.is_empty() {
        return "*".to_string();
    }
    columns.join(", ")
}

fn resolve_columns(keys: &[String], config: &ReportConfig) -> Vec<String> {
    keys.iter()
        .filter_map(|key| config.fields.get(key))
        .map(|field| format!("{} AS \"{}\"", field.expression, field.key))
        .collect()
}

fn render_filter(filter: &FilterCriterion, config: &ReportConfig) -> Result<String, DropReason> {
    let field = config
        .fields
        .get(&filter.field)
        .ok_or(DropReason::UnknownField)?;
    if is_empty_value(&filter.value) {
        return Err(DropReason::EmptyValue);
    }
    let value = sanitize::sanitize_value(&filter.value).ok_or(DropReason::UnsupportedValue)?;
    render_predicate(field, Operator::resolve(filter.operator.as_deref()), &value)
        .ok_or(DropReason::UnsupportedValue)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// The single place where a caller value is placed into statement text.
pub fn render_predicate(field: &FieldDescriptor, op: Operator, value: &SqlValue) -> Option<String> {
    let token = if field.field_type.is_quoted() {
        value.render(true)
    } else {
        bare_token(field.field_type, value)?
    };
    Some(format!("{} {} {}", field.expression, op.as_sql(), token))
}

/// Bare tokens must be real numbers or booleans; text that does not parse as
/// the declared type is refused.
fn bare_token(field_type: FieldType, value: &SqlValue) -> Option<String> {
    match (field_type, value) {
        (FieldType::Number, SqlValue::Number(number)) => Some(number.to_string()),
        (FieldType::Number, SqlValue::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(|_| text.trim().to_string()),
        (FieldType::Boolean, SqlValue::Bool(flag)) => Some(flag.to_string()),
        (FieldType::Boolean, SqlValue::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some("true".to_string()),
            "false" => Some("false".to_string()),
            _ => None,
        },
        _ => None,
    }
}
