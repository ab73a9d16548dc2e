use serde::{Deserialize, Serialize};

use crate::fields::{FieldDescriptor, FieldType};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize)]
pub struct CannedReportSummary {
    pub id: &'static str,
    pub title: &'static str,
}

#[derive(Serialize)]
pub struct FieldSummary {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: &'static str,
}

impl From<&FieldDescriptor> for FieldSummary {
    fn from(field: &FieldDescriptor) -> Self {
        let field_type = match field.field_type {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        };
        Self {
            key: field.key.clone(),
            label: field.label.clone(),
            field_type,
        }
    }
}

#[derive(Deserialize)]
pub struct SidsRequest {
    #[serde(default)]
    pub clients: Vec<String>,
}
