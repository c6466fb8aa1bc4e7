use thiserror::Error;

/// Errors produced while loading a specification document.
///
/// Codes: E1000 I/O, E1001 not OpenAPI 3.x, E1002 syntax, E1003 `$ref`
/// resolution (unresolved, cyclic, remote), E1004 structural rule.
///
/// Loading is all-or-nothing: any of these aborts the load and no partial
/// model is returned.
#[derive(Debug, Error)]
pub enum SpecParseError {
    /// E1001: The document is not an OpenAPI 3.x document.
    #[error("E1001: not a valid OpenAPI 3.x document")]
    UnknownFormat,

    /// E1001: The `openapi` field names a version we do not support.
    #[error("E1001: unsupported OpenAPI version: {0} (only 3.x supported)")]
    UnsupportedVersion(String),

    /// E1002: YAML/JSON syntax error.
    #[error("E1002: parse error: {0}")]
    Syntax(String),

    /// E1003: A `$ref` points at nothing.
    #[error("E1003: {location}: unresolved $ref '{reference}'")]
    UnresolvedRef { reference: String, location: String },

    /// E1003: A `$ref` chain loops back onto itself.
    #[error("E1003: {location}: $ref cycle through '{reference}'")]
    CyclicRef { reference: String, location: String },

    /// E1003: A `$ref` points outside the document.
    #[error("E1003: {location}: remote $ref '{reference}' is not supported")]
    RemoteRef { reference: String, location: String },

    /// E1004: A structural rule of the document model is broken.
    #[error("E1004: {location}: {message}")]
    Invalid { location: String, message: String },

    /// I/O error reading the document.
    #[error("E1000: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpecParseError {
    pub(crate) fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        SpecParseError::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            SpecParseError::Io(_) => "E1000",
            SpecParseError::UnknownFormat | SpecParseError::UnsupportedVersion(_) => "E1001",
            SpecParseError::Syntax(_) => "E1002",
            SpecParseError::UnresolvedRef { .. }
            | SpecParseError::CyclicRef { .. }
            | SpecParseError::RemoteRef { .. } => "E1003",
            SpecParseError::Invalid { .. } => "E1004",
        }
    }

    /// The document location the error refers to, when there is one.
    pub fn location(&self) -> Option<&str> {
        match self {
            SpecParseError::UnresolvedRef { location, .. }
            | SpecParseError::CyclicRef { location, .. }
            | SpecParseError::RemoteRef { location, .. }
            | SpecParseError::Invalid { location, .. } => Some(location),
            _ => None,
        }
    }
}
