//! Combining stage outcomes into a single verdict.

use palisade_spec::Operation;
use serde_json::{Map, Value};

use crate::deserialize::DeserializedValues;
use crate::error::{SchemaViolation, ValidationError};
use crate::security::Credentials;

/// Identity of the matched operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRef {
    pub method: String,
    /// The path template, not the request path.
    pub path: String,
    pub operation_id: Option<String>,
}

impl From<&Operation> for OperationRef {
    fn from(operation: &Operation) -> Self {
        Self {
            method: operation.method.clone(),
            path: operation.path.clone(),
            operation_id: operation.operation_id.clone(),
        }
    }
}

/// The outcome of validating one request.
///
/// `errors` is empty exactly when the request is valid; the typed values are
/// only populated then.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub operation: Option<OperationRef>,
    pub path_params: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub header_params: Map<String, Value>,
    pub cookie_params: Map<String, Value>,
    pub body: Option<Value>,
    pub media_type: Option<String>,
    pub credentials: Credentials,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    pub fn operation_id(&self) -> Option<&str> {
        self.operation.as_ref()?.operation_id.as_deref()
    }

    fn failed(operation: Option<OperationRef>, errors: Vec<ValidationError>) -> Self {
        Self {
            operation,
            errors,
            ..Self::default()
        }
    }
}

/// Combine the outcome of each stage.
///
/// Stages are given in pipeline order; `None` means the stage did not run.
/// The earliest failing stage decides the result and later outcomes are
/// ignored, so errors of different kinds are never mixed.
pub fn aggregate(
    operation: Result<OperationRef, ValidationError>,
    deserialized: Option<Result<DeserializedValues, Vec<ValidationError>>>,
    violations: Option<Vec<SchemaViolation>>,
    security: Option<Result<Credentials, ValidationError>>,
) -> ValidationResult {
    let operation = match operation {
        Ok(operation) => operation,
        Err(e) => return ValidationResult::failed(None, vec![e]),
    };

    let values = match deserialized {
        Some(Ok(values)) => values,
        Some(Err(errors)) => return ValidationResult::failed(Some(operation), errors),
        None => DeserializedValues::default(),
    };

    if let Some(violations) = violations.filter(|v| !v.is_empty()) {
        let errors = violations
            .into_iter()
            .map(ValidationError::SchemaViolation)
            .collect();
        return ValidationResult::failed(Some(operation), errors);
    }

    let credentials = match security {
        Some(Ok(credentials)) => credentials,
        Some(Err(e)) => return ValidationResult::failed(Some(operation), vec![e]),
        None => Credentials::default(),
    };

    ValidationResult {
        operation: Some(operation),
        path_params: values.path,
        query_params: values.query,
        header_params: values.headers,
        cookie_params: values.cookies,
        body: values.body,
        media_type: values.media_type,
        credentials,
        errors: Vec::new(),
    }
}
