//! Response builders and the validation-error status mapping.

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{Response, StatusCode};
use http_body_util::Full;

use palisade_spec::{HttpScheme, SecurityScheme, Specification};
use palisade_validator::{NotFoundReason, ProblemDetails, SecurityFailure, ValidationError};

pub const JSON: &str = "application/json";
pub const PROBLEM_JSON: &str = "application/problem+json";
pub const YAML: &str = "application/x-yaml";

/// Realm advertised in authentication challenges.
const REALM: &str = "palisade";

/// Status for the first validation error of a request.
pub fn status_for(error: &ValidationError) -> StatusCode {
    match error {
        ValidationError::OperationNotFound {
            reason: NotFoundReason::PathNotFound,
            ..
        } => StatusCode::NOT_FOUND,
        ValidationError::OperationNotFound {
            reason: NotFoundReason::MethodNotAllowed { .. },
            ..
        } => StatusCode::METHOD_NOT_ALLOWED,
        ValidationError::MediaTypeNotAllowed { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ValidationError::DeserializationFailed(_) | ValidationError::SchemaViolation(_) => {
            StatusCode::BAD_REQUEST
        }
        ValidationError::SecurityNotSatisfied { .. } => StatusCode::UNAUTHORIZED,
    }
}

/// A response with a body and content type.
pub fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    with_body(status, JSON, value.to_string())
}

pub fn problem(problem: &ProblemDetails) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    with_body(status, PROBLEM_JSON, problem.to_json())
}

/// Problem response for a failed validation, with `Allow` on 405 and
/// `WWW-Authenticate` on 401.
pub fn validation_failed(
    spec: &Specification,
    errors: &[ValidationError],
    instance: &str,
    dev_mode: bool,
) -> Response<Full<Bytes>> {
    let status = errors.first().map_or(StatusCode::BAD_REQUEST, status_for);
    let details = ProblemDetails::from_errors(errors, status.as_u16(), dev_mode).with_instance(instance);
    let mut response = problem(&details);

    match errors.first() {
        Some(ValidationError::OperationNotFound {
            reason: NotFoundReason::MethodNotAllowed { allowed },
            ..
        }) => {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        Some(ValidationError::SecurityNotSatisfied { failures }) => {
            for challenge in challenges(spec, failures) {
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response.headers_mut().append(WWW_AUTHENTICATE, value);
                }
            }
        }
        _ => {}
    }

    response
}

/// One challenge per distinct scheme that failed.
fn challenges(spec: &Specification, failures: &[SecurityFailure]) -> Vec<String> {
    let mut challenges: Vec<String> = Vec::new();
    for failure in failures {
        let challenge = match spec.security_scheme(&failure.scheme) {
            Some(SecurityScheme::Http {
                scheme: HttpScheme::Basic,
                ..
            }) => format!("Basic realm=\"{REALM}\""),
            Some(SecurityScheme::Http {
                scheme: HttpScheme::Other(name),
                ..
            }) => format!("{name} realm=\"{REALM}\""),
            Some(SecurityScheme::ApiKey { name, location }) => {
                format!("ApiKey realm=\"{REALM}\", in=\"{}\", name=\"{name}\"", location.as_str())
            }
            _ => format!("Bearer realm=\"{REALM}\""),
        };
        if !challenges.contains(&challenge) {
            challenges.push(challenge);
        }
    }
    if challenges.is_empty() {
        challenges.push(format!("Bearer realm=\"{REALM}\""));
    }
    challenges
}
