use serde_json::Value;

/// A caller-supplied filter value that survived sanitization.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// Text with every single quote already doubled.
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl SqlValue {
    /// Renders the value as a SQL token. Text is only ever emitted inside quotes.
    pub fn render(&self, quoted: bool) -> String {
        match (self, quoted) {
            (SqlValue::Text(text), _) => format!("'{text}'"),
            (SqlValue::Number(number), false) => number.to_string(),
            (SqlValue::Bool(flag), false) => flag.to_string(),
            (SqlValue::Number(number), true) => format!("'{number}'"),
            (SqlValue::Bool(flag), true) => format!("'{flag}'"),
        }
    }
}

pub fn is_allowed<'a, I>(field: &str, allowed: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    !field.is_empty() && allowed.into_iter().any(|candidate| candidate == field)
}

/// Accepts strings, numbers and booleans; anything else yields `None` and
/// the caller must skip the filter.
pub fn sanitize_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(text) => Some(SqlValue::Text(escape_literal(text))),
        Value::Number(number) => Some(SqlValue::Number(number.clone())),
        Value::Bool(flag) => Some(SqlValue::Bool(*flag)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Doubles single quotes. Only safe inside a quoted literal.
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Escapes and wraps `text` as a SQL string literal.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", escape_literal(text))
}
