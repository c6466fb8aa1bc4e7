use std::fmt;

use palisade_spec::ParameterLocation;
use thiserror::Error;

/// Why a request failed validation.
///
/// Callers match on the kind to choose a transport response; the usual
/// mapping is 404/405, 415, 400, 400, 401 in declaration order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{reason}: {method} {path}")]
    OperationNotFound {
        method: String,
        path: String,
        reason: NotFoundReason,
    },

    #[error("media type '{content_type}' is not allowed (expected one of: {})", allowed.join(", "))]
    MediaTypeNotAllowed {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("{0}")]
    DeserializationFailed(DeserializeError),

    #[error("{0}")]
    SchemaViolation(SchemaViolation),

    #[error("security requirements not satisfied: {}", describe_failures(failures))]
    SecurityNotSatisfied { failures: Vec<SecurityFailure> },
}

impl ValidationError {
    /// Stable snake_case name of the error kind, for logs and problem types.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::OperationNotFound {
                reason: NotFoundReason::PathNotFound,
                ..
            } => "path_not_found",
            ValidationError::OperationNotFound {
                reason: NotFoundReason::MethodNotAllowed { .. },
                ..
            } => "method_not_allowed",
            ValidationError::MediaTypeNotAllowed { .. } => "media_type_not_allowed",
            ValidationError::DeserializationFailed(_) => "deserialization_failed",
            ValidationError::SchemaViolation(_) => "schema_violation",
            ValidationError::SecurityNotSatisfied { .. } => "security_not_satisfied",
        }
    }

    /// The request field the error is about (`body`, `password`, ...).
    pub fn field(&self) -> String {
        match self {
            ValidationError::OperationNotFound { .. } => "path".into(),
            ValidationError::MediaTypeNotAllowed { .. } => "content-type".into(),
            ValidationError::DeserializationFailed(e) => e.field().into(),
            ValidationError::SchemaViolation(v) => v.field(),
            ValidationError::SecurityNotSatisfied { .. } => "authorization".into(),
        }
    }

    /// Where in the request the field lives.
    pub fn location(&self) -> String {
        match self {
            ValidationError::OperationNotFound { .. } => "path".into(),
            ValidationError::MediaTypeNotAllowed { .. } => "header".into(),
            ValidationError::DeserializationFailed(e) => e.location(),
            ValidationError::SchemaViolation(v) => v.location.clone(),
            ValidationError::SecurityNotSatisfied { .. } => "credentials".into(),
        }
    }
}

/// Distinguishes the two causes of [`ValidationError::OperationNotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No path template matches.
    PathNotFound,
    /// A template matches but declares none of the request's method.
    MethodNotAllowed { allowed: Vec<String> },
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::PathNotFound => f.write_str("no path matches"),
            NotFoundReason::MethodNotAllowed { allowed } => {
                write!(f, "method not allowed (allowed: {})", allowed.join(", "))
            }
        }
    }
}

/// A raw request value could not be turned into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeserializeError {
    #[error("missing required {location} parameter '{name}'")]
    MissingParameter {
        name: String,
        location: ParameterLocation,
    },

    #[error("invalid {location} parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        location: ParameterLocation,
        reason: String,
    },

    #[error("missing required request body")]
    MissingBody,

    #[error("malformed {media_type} body: {reason}")]
    MalformedBody { media_type: String, reason: String },
}

impl DeserializeError {
    pub fn field(&self) -> &str {
        match self {
            DeserializeError::MissingParameter { name, .. }
            | DeserializeError::InvalidParameter { name, .. } => name,
            DeserializeError::MissingBody | DeserializeError::MalformedBody { .. } => "body",
        }
    }

    pub fn location(&self) -> String {
        match self {
            DeserializeError::MissingParameter { location, .. }
            | DeserializeError::InvalidParameter { location, .. } => location.to_string(),
            DeserializeError::MissingBody | DeserializeError::MalformedBody { .. } => {
                "body".into()
            }
        }
    }
}

/// A value does not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// What was validated: `body`, `query parameter 'limit'`, ...
    pub location: String,
    /// JSON pointer to the offending value, empty for the root.
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    /// The last pointer segment, or the location for the root value.
    pub fn field(&self) -> String {
        match self.path.rsplit('/').next() {
            Some(last) if !self.path.is_empty() => last.replace("~1", "/").replace("~0", "~"),
            _ => self.location.clone(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.location, self.reason)
        } else {
            write!(f, "{} at '{}': {}", self.location, self.path, self.reason)
        }
    }
}

/// The first failed check of one security alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityFailure {
    /// Scheme names of the alternative, in declaration order.
    pub alternative: Vec<String>,
    /// The scheme that failed.
    pub scheme: String,
    pub reason: String,
}

impl fmt::Display for SecurityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.alternative.join(" + "), self.scheme, self.reason)
    }
}

fn describe_failures(failures: &[SecurityFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
