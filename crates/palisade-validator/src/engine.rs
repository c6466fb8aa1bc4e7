//! The validation pipeline.

use std::sync::Arc;

use palisade_spec::{Operation, ParameterLocation, Specification};

use crate::deserialize::{deserialize, DeserializedValues};
use crate::error::{DeserializeError, SchemaViolation, ValidationError};
use crate::matcher::Matcher;
use crate::request::RawRequest;
use crate::result::{aggregate, OperationRef, ValidationResult};
use crate::schema::collect_violations;
use crate::security::validate_security;

/// Validates requests against one specification.
///
/// Cheap to share: the specification is behind an `Arc` and the matcher is
/// immutable after construction.
#[derive(Debug)]
pub struct RequestValidator {
    spec: Arc<Specification>,
    matcher: Matcher,
}

impl RequestValidator {
    pub fn new(spec: Arc<Specification>) -> Self {
        let matcher = Matcher::new(&spec);
        Self { spec, matcher }
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    /// Run match, deserialize, schema and security stages in order,
    /// stopping at the first stage that fails.
    pub fn validate(&self, request: &RawRequest) -> ValidationResult {
        let result = run(&self.spec, &self.matcher, request);

        match result.first_error() {
            None => tracing::debug!(
                method = %request.method,
                path = %request.path,
                operation = result.operation_id().unwrap_or("-"),
                "request valid"
            ),
            Some(first) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                kind = first.kind(),
                errors = result.errors.len(),
                error = %first,
                "request invalid"
            ),
        }

        result
    }
}

/// Validate a single request without keeping a [`RequestValidator`].
pub fn validate_request(spec: &Specification, request: &RawRequest) -> ValidationResult {
    run(spec, &Matcher::new(spec), request)
}

fn run(spec: &Specification, matcher: &Matcher, request: &RawRequest) -> ValidationResult {
    let matched = match matcher.find(spec, &request.method, &request.path) {
        Ok(matched) => matched,
        Err(e) => return aggregate(Err(e), None, None, None),
    };
    let operation = matched.operation;
    let operation_ref = OperationRef::from(operation);

    let deserialized = deserialize(operation, request, &matched.path_params);
    let values = match with_capture_errors(&matched.capture_errors, deserialized) {
        Ok(values) => values,
        Err(errors) => return aggregate(Ok(operation_ref), Some(Err(errors)), None, None),
    };

    let violations = schema_violations(operation, &values);
    let security = violations
        .is_empty()
        .then(|| validate_security(spec, operation, request));

    aggregate(Ok(operation_ref), Some(Ok(values)), Some(violations), security)
}

/// Undecodable path captures go first, replacing the missing-parameter
/// errors that their absence from the captures produced.
fn with_capture_errors(
    capture_errors: &[DeserializeError],
    deserialized: Result<DeserializedValues, Vec<ValidationError>>,
) -> Result<DeserializedValues, Vec<ValidationError>> {
    if capture_errors.is_empty() {
        return deserialized;
    }

    let mut errors: Vec<ValidationError> = capture_errors
        .iter()
        .cloned()
        .map(ValidationError::DeserializationFailed)
        .collect();
    if let Err(others) = deserialized {
        errors.extend(others.into_iter().filter(|e| {
            !matches!(
                e,
                ValidationError::DeserializationFailed(DeserializeError::MissingParameter {
                    name,
                    location: ParameterLocation::Path,
                }) if capture_errors.iter().any(|c| c.field() == name.as_str())
            )
        }));
    }
    Err(errors)
}

/// Schema violations of every deserialized parameter, then of the body.
fn schema_violations(operation: &Operation, values: &DeserializedValues) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();

    for param in &operation.parameters {
        if let Some(value) = values.parameter(param.location, &param.name) {
            let location = format!("{} parameter '{}'", param.location, param.name);
            violations.extend(collect_violations(&param.schema, value, &location));
        }
    }

    let body_schema = operation
        .request_body
        .as_ref()
        .zip(values.media_type.as_deref())
        .and_then(|(body, media_type)| body.content.iter().find(|m| m.media_type == media_type))
        .and_then(|media| media.schema.as_deref());
    if let (Some(schema), Some(body)) = (body_schema, &values.body) {
        violations.extend(collect_violations(schema, body, "body"));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_spec::parse_spec;
    use serde_json::json;

    const SPEC: &str = r#"
openapi: "3.0.3"
info: { title: Notes, version: "1" }
components:
  securitySchemes:
    bearerAuth: { type: http, scheme: bearer }
paths:
  /notes:
    get:
      operationId: listNotes
      parameters:
        - { name: limit, in: query, schema: { type: integer, maximum: 50 } }
    post:
      operationId: createNote
      security: [ { bearerAuth: [] } ]
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [subject]
              properties:
                subject: { type: string, minLength: 1 }
  /notes/{id}:
    get:
      operationId: getNote
      parameters:
        - { name: id, in: path, required: true, schema: { type: string } }
        - { name: limit, in: query, schema: { type: integer } }
"#;

    fn validator() -> RequestValidator {
        RequestValidator::new(Arc::new(parse_spec(SPEC).unwrap()))
    }

    #[test]
    fn valid_request_carries_typed_values() {
        let result = validator().validate(&RawRequest::new("GET", "/notes?limit=10"));
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.query_params["limit"], json!(10));
        assert_eq!(result.operation_id(), Some("listNotes"));
    }

    #[test]
    fn parameter_schema_violations_name_the_parameter() {
        let result = validator().validate(&RawRequest::new("GET", "/notes?limit=99"));
        assert_eq!(result.errors.len(), 1);
        let err = result.first_error().unwrap();
        assert_eq!(err.kind(), "schema_violation");
        assert_eq!(err.location(), "query parameter 'limit'");
    }

    #[test]
    fn schema_violations_hide_security_failures() {
        let request = RawRequest::new("POST", "/notes").json(&json!({"subject": ""}));
        let result = validator().validate(&request);
        assert!(result.errors.iter().all(|e| e.kind() == "schema_violation"));
    }

    #[test]
    fn security_runs_last() {
        let request = RawRequest::new("POST", "/notes").json(&json!({"subject": "groceries"}));
        let result = validator().validate(&request);
        assert_eq!(result.first_error().map(|e| e.kind()), Some("security_not_satisfied"));

        let request = request.header("authorization", "Bearer token");
        let result = validator().validate(&request);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.credentials.get("bearerAuth").is_some());
    }

    #[test]
    fn undecodable_path_capture_fails_deserialization() {
        let result = validator().validate(&RawRequest::new("GET", "/notes/%C3%28"));
        assert_eq!(result.errors.len(), 1);
        let err = result.first_error().unwrap();
        assert_eq!(err.kind(), "deserialization_failed");
        assert_eq!(err.field(), "id");
        assert_eq!(result.operation_id(), Some("getNote"));

        let result = validator().validate(&RawRequest::new("GET", "/notes/%C3%28?limit=many"));
        let fields: Vec<String> = result.errors.iter().map(|e| e.field()).collect();
        assert_eq!(fields, vec!["id".to_string(), "limit".to_string()]);

        let result = validator().validate(&RawRequest::new("GET", "/notes/caf%C3%A9"));
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.path_params["id"], json!("café"));
    }

    #[test]
    fn one_shot_matches_validator() {
        let spec = parse_spec(SPEC).unwrap();
        let validator = RequestValidator::new(Arc::new(spec.clone()));
        for request in [
            RawRequest::new("GET", "/notes?limit=5"),
            RawRequest::new("GET", "/notes?limit=500"),
            RawRequest::new("DELETE", "/notes"),
            RawRequest::new("POST", "/notes").body("not json").header("content-type", "application/json"),
        ] {
            assert_eq!(validate_request(&spec, &request), validator.validate(&request));
        }
    }
}
