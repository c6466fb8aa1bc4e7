//! RFC 9457 problem details for rejected requests.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ValidationError;
use crate::limits::LimitError;

/// RFC 9457 problem details document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Extended fields, `errors` in dev mode
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl ProblemDetails {
    pub fn new(status: u16, kind: &str, title: impl Into<String>) -> Self {
        Self {
            error_type: problem_type(kind),
            title: title.into(),
            status,
            detail: None,
            instance: None,
            extensions: HashMap::new(),
        }
    }

    /// Problem for a failed validation; the type and title follow the first
    /// error. In dev mode every error is listed under `errors`.
    pub fn from_errors(errors: &[ValidationError], status: u16, dev_mode: bool) -> Self {
        let (kind, title) = match errors.first() {
            Some(first) => (first.kind(), title_for(first)),
            None => ("validation_failed", "Request validation failed"),
        };

        let mut problem = Self::new(status, kind, title);
        problem.detail = match errors {
            [] => None,
            [single] => Some(single.to_string()),
            _ => Some(format!("{} validation errors", errors.len())),
        };

        if dev_mode && !errors.is_empty() {
            let details = errors
                .iter()
                .map(|e| {
                    let mut detail = serde_json::Map::new();
                    detail.insert("field".into(), Value::String(e.field()));
                    detail.insert("location".into(), Value::String(e.location()));
                    detail.insert("reason".into(), Value::String(e.to_string()));
                    Value::Object(detail)
                })
                .collect();
            problem.extensions.insert("errors".into(), Value::Array(details));
        }

        problem
    }

    /// Problem for a request rejected before validation.
    pub fn from_limit(error: &LimitError, dev_mode: bool) -> Self {
        let mut problem = Self::new(error.status(), error.kind(), "Request limit exceeded");
        problem.detail = Some(error.to_string());
        if dev_mode {
            let mut detail = serde_json::Map::new();
            detail.insert("field".into(), Value::String(error.field()));
            detail.insert("reason".into(), Value::String(error.to_string()));
            problem
                .extensions
                .insert("errors".into(), Value::Array(vec![Value::Object(detail)]));
        }
        problem
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"urn:palisade:error:internal","title":"Serialization error","status":500}"#.into()
        })
    }
}

fn problem_type(kind: &str) -> String {
    format!("urn:palisade:error:{}", kind.replace('_', "-"))
}

fn title_for(error: &ValidationError) -> &'static str {
    match error.kind() {
        "path_not_found" => "Not found",
        "method_not_allowed" => "Method not allowed",
        "media_type_not_allowed" => "Unsupported media type",
        "security_not_satisfied" => "Unauthorized",
        _ => "Request validation failed",
    }
}
