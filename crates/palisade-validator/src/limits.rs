//! Request size limits, checked before validation.

use std::collections::HashMap;

use thiserror::Error;

/// A request exceeded one of the configured limits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("request body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    /// The body ran past the limit while being read; its full size is unknown.
    #[error("request body exceeds limit of {limit} bytes")]
    BodyLimitExceeded { limit: usize },

    #[error("too many headers: {count} exceeds limit of {limit}")]
    TooManyHeaders { count: usize, limit: usize },

    #[error("URI too long: {length} characters exceeds limit of {limit}")]
    UriTooLong { length: usize, limit: usize },

    #[error("header '{name}' too large: {size} bytes exceeds limit of {limit} bytes")]
    HeaderTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
}

impl LimitError {
    /// HTTP status for the rejection.
    pub fn status(&self) -> u16 {
        match self {
            LimitError::BodyTooLarge { .. } | LimitError::BodyLimitExceeded { .. } => 413,
            LimitError::UriTooLong { .. } => 414,
            LimitError::TooManyHeaders { .. } | LimitError::HeaderTooLarge { .. } => 431,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LimitError::BodyTooLarge { .. } | LimitError::BodyLimitExceeded { .. } => {
                "body_too_large"
            }
            LimitError::TooManyHeaders { .. } => "too_many_headers",
            LimitError::UriTooLong { .. } => "uri_too_long",
            LimitError::HeaderTooLarge { .. } => "header_too_large",
        }
    }

    pub fn field(&self) -> String {
        match self {
            LimitError::BodyTooLarge { .. } | LimitError::BodyLimitExceeded { .. } => {
                "body".into()
            }
            LimitError::TooManyHeaders { .. } => "headers".into(),
            LimitError::UriTooLong { .. } => "uri".into(),
            LimitError::HeaderTooLarge { name, .. } => format!("header:{name}"),
        }
    }
}

/// Request limits configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLimits {
    /// Maximum request body size in bytes (default: 1MB).
    pub max_body_size: usize,
    /// Maximum number of headers (default: 100).
    pub max_headers: usize,
    /// Maximum size of one header, name plus value (default: 8KB).
    pub max_header_size: usize,
    /// Maximum URI length in characters (default: 8KB).
    pub max_uri_length: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1 MB
            max_headers: 100,
            max_header_size: 8 * 1024, // 8 KB
            max_uri_length: 8 * 1024,  // 8 KB
        }
    }
}

impl RequestLimits {
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn validate_uri(&self, uri: &str) -> Result<(), LimitError> {
        if uri.len() > self.max_uri_length {
            return Err(LimitError::UriTooLong {
                length: uri.len(),
                limit: self.max_uri_length,
            });
        }
        Ok(())
    }

    /// Header count, then each header's size.
    pub fn validate_headers(&self, headers: &HashMap<String, String>) -> Result<(), LimitError> {
        if headers.len() > self.max_headers {
            return Err(LimitError::TooManyHeaders {
                count: headers.len(),
                limit: self.max_headers,
            });
        }

        for (name, value) in headers {
            let size = name.len() + value.len();
            if size > self.max_header_size {
                return Err(LimitError::HeaderTooLarge {
                    name: name.clone(),
                    size,
                    limit: self.max_header_size,
                });
            }
        }

        Ok(())
    }

    pub fn validate_body_size(&self, body_len: usize) -> Result<(), LimitError> {
        if body_len > self.max_body_size {
            return Err(LimitError::BodyTooLarge {
                size: body_len,
                limit: self.max_body_size,
            });
        }
        Ok(())
    }

    /// Every limit violation, URI first.
    pub fn validate_all(
        &self,
        uri: &str,
        headers: &HashMap<String, String>,
        body_len: usize,
    ) -> Result<(), Vec<LimitError>> {
        let errors: Vec<LimitError> = [
            self.validate_uri(uri),
            self.validate_headers(headers),
            self.validate_body_size(body_len),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
