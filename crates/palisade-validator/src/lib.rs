//! OpenAPI request validation.
//!
//! Validates inbound requests against a loaded [`palisade_spec::Specification`]
//! in a fixed order: operation matching, parameter and body deserialization,
//! schema validation, then security requirements. The first failing stage
//! decides the outcome so callers can map it to a single HTTP status.
//!
//! ```ignore
//! let validator = RequestValidator::new(Arc::new(spec));
//! let result = validator.validate(&RawRequest::new("GET", "/notes/abc"));
//! if let Some(error) = result.first_error() {
//!     // 404/405, 415, 400, 400 or 401 depending on error.kind()
//! }
//! ```

pub mod deserialize;
pub mod engine;
pub mod error;
pub mod formats;
pub mod limits;
pub mod matcher;
pub mod problem;
pub mod request;
pub mod result;
pub mod schema;
pub mod security;

pub use deserialize::{deserialize, select_media_type, DeserializedValues, DEFAULT_MEDIA_TYPE};
pub use engine::{validate_request, RequestValidator};
pub use error::{DeserializeError, NotFoundReason, SchemaViolation, SecurityFailure, ValidationError};
pub use limits::{LimitError, RequestLimits};
pub use matcher::{match_operation, MatchedOperation, Matcher};
pub use problem::ProblemDetails;
pub use request::RawRequest;
pub use result::{aggregate, OperationRef, ValidationResult};
pub use schema::validate as validate_schema;
pub use security::{validate_security, Credential, Credentials};
