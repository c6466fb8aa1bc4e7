//! Shared server state and the per-request flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use thiserror::Error;

use palisade_spec::{parse_spec, SpecParseError, Specification};
use palisade_telemetry::{log_request_completed, log_spec_loaded, log_validation_failure};
use palisade_validator::{LimitError, ProblemDetails, RawRequest, RequestLimits, RequestValidator};

use crate::handlers;
use crate::response;

/// Where the raw document is served from.
pub const SPEC_ROUTE: &str = "/openapi.yaml";

/// Failure to load the document at startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Spec {
        path: PathBuf,
        source: SpecParseError,
    },
}

/// Shared server state.
pub struct App {
    validator: RequestValidator,
    /// The document as loaded, served verbatim.
    document: Bytes,
    limits: RequestLimits,
    dev_mode: bool,
}

impl App {
    pub fn new(spec: Specification, document: impl Into<Bytes>, limits: RequestLimits, dev_mode: bool) -> Self {
        Self {
            validator: RequestValidator::new(Arc::new(spec)),
            document: document.into(),
            limits,
            dev_mode,
        }
    }

    /// Load the document from disk.
    pub fn load(path: &Path, limits: RequestLimits, dev_mode: bool) -> Result<Self, LoadError> {
        let document = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = parse_spec(&document).map_err(|source| LoadError::Spec {
            path: path.to_path_buf(),
            source,
        })?;

        log_spec_loaded!(
            path = %path.display(),
            title = %spec.title,
            version = %spec.api_version,
            operations = spec.operations().count()
        );

        Ok(Self::new(spec, document, limits, dev_mode))
    }

    pub fn spec(&self) -> &Specification {
        self.validator.spec()
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Handle one request and log its completion.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let mut response = self.route(req).await;

        if let Ok(value) = http::HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        log_request_completed!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0
        );

        response
    }

    async fn route<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let uri = req.uri().to_string();
        let path = req.uri().path().to_string();

        if let Err(e) = self.limits.validate_uri(&uri) {
            return response::problem(&ProblemDetails::from_limit(&e, self.dev_mode));
        }

        if req.method() == Method::GET && path == SPEC_ROUTE {
            return response::with_body(StatusCode::OK, response::YAML, self.document.clone());
        }

        let mut raw = RawRequest::new(req.method().as_str(), &path);
        raw.query = req.uri().query().map(str::to_string);
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                raw.append_header(name.as_str(), value.to_string());
            }
        }

        if let Err(e) = self.limits.validate_headers(&raw.headers) {
            return response::problem(&ProblemDetails::from_limit(&e, self.dev_mode));
        }

        // Reject early when the declared length is already too large
        if let Some(len) = declared_length(&raw.headers) {
            if let Err(e) = self.limits.validate_body_size(len) {
                return response::problem(&ProblemDetails::from_limit(&e, self.dev_mode));
            }
        }

        // The declared length may be absent or wrong; enforce while reading
        let limit = self.limits.max_body_size;
        let body = match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                let e = LimitError::BodyLimitExceeded { limit };
                return response::problem(&ProblemDetails::from_limit(&e, self.dev_mode));
            }
            Err(e) => {
                let problem = ProblemDetails::new(400, "bad_request", "Bad Request")
                    .with_detail(format!("failed to read request body: {e}"));
                return response::problem(&problem);
            }
        };
        raw.body = body.to_vec();

        let result = self.validator.validate(&raw);
        if let Some(first) = result.first_error() {
            log_validation_failure!(
                method = %raw.method,
                path = %raw.path,
                kind = first.kind(),
                errors = result.errors.len(),
                error = %first
            );
            return response::validation_failed(self.spec(), &result.errors, &path, self.dev_mode);
        }

        match result.operation_id().and_then(handlers::lookup) {
            Some(handler) => handler(&result),
            None => {
                let label = result
                    .operation
                    .as_ref()
                    .map(|op| {
                        op.operation_id
                            .clone()
                            .unwrap_or_else(|| format!("{} {}", op.method, op.path))
                    })
                    .unwrap_or_default();
                let problem = ProblemDetails::new(501, "not_implemented", "Not Implemented")
                    .with_detail(format!("no handler for operation '{label}'"))
                    .with_instance(path);
                response::problem(&problem)
            }
        }
    }
}

fn declared_length(headers: &HashMap<String, String>) -> Option<usize> {
    headers.get("content-length")?.trim().parse().ok()
}
