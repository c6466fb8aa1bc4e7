use palisade_router::{normalize_path, RouteEntry, RouteMatch, Router};
use palisade_spec::{Operation, ParameterLocation, Specification};
use percent_encoding::percent_decode_str;

use crate::error::{DeserializeError, NotFoundReason, ValidationError};

/// Maps request method + path to a declared operation.
///
/// Built once per specification; the index pairs point into
/// `Specification::paths[..].operations[..]`.
#[derive(Debug)]
pub struct Matcher {
    router: Router,
    operations: Vec<(usize, usize)>,
    /// Server base paths, longest first.
    prefixes: Vec<String>,
    /// Whether requests may also match without a server prefix.
    root_allowed: bool,
}

/// A matched operation and its decoded path captures.
#[derive(Debug, Clone)]
pub struct MatchedOperation<'s> {
    pub operation: &'s Operation,
    pub path_params: Vec<(String, String)>,
    /// Captures whose percent-decoding is not UTF-8. They are left out of
    /// `path_params`.
    pub capture_errors: Vec<DeserializeError>,
}

impl Matcher {
    pub fn new(spec: &Specification) -> Self {
        let mut router = Router::new();
        let mut operations = Vec::new();

        for (p, item) in spec.paths.iter().enumerate() {
            for (o, operation) in item.operations.iter().enumerate() {
                router.insert(
                    &item.template,
                    &operation.method,
                    RouteEntry {
                        operation_index: operations.len(),
                    },
                );
                operations.push((p, o));
            }
        }

        let mut prefixes: Vec<String> = spec.base_paths().into_iter().map(str::to_string).collect();
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let root_allowed =
            spec.servers.is_empty() || spec.servers.iter().any(|s| s.base_path.is_empty());

        tracing::debug!(
            templates = router.template_count(),
            operations = operations.len(),
            prefixes = ?prefixes,
            "matcher built"
        );

        Self {
            router,
            operations,
            prefixes,
            root_allowed,
        }
    }

    /// Find the operation for a request.
    ///
    /// When the path matches under several server prefixes, the first found
    /// operation wins; otherwise a method-not-allowed outcome is preferred
    /// over path-not-found.
    pub fn find<'s>(
        &self,
        spec: &'s Specification,
        method: &str,
        path: &str,
    ) -> Result<MatchedOperation<'s>, ValidationError> {
        let mut not_allowed: Option<Vec<String>> = None;
        let normalized = normalize_path(path);

        for candidate in self.candidate_paths(&normalized) {
            match self.router.lookup(candidate, method) {
                RouteMatch::Found { entry, params } => {
                    let Some(operation) = self.operation(spec, entry.operation_index) else {
                        continue;
                    };
                    let mut path_params = Vec::with_capacity(params.len());
                    let mut capture_errors = Vec::new();
                    for (name, raw) in params {
                        match percent_decode_str(&raw).decode_utf8() {
                            Ok(value) => path_params.push((name, value.into_owned())),
                            Err(_) => capture_errors.push(DeserializeError::InvalidParameter {
                                reason: format!("'{raw}' does not decode to UTF-8"),
                                name,
                                location: ParameterLocation::Path,
                            }),
                        }
                    }
                    return Ok(MatchedOperation {
                        operation,
                        path_params,
                        capture_errors,
                    });
                }
                RouteMatch::MethodNotAllowed { allowed } => {
                    not_allowed.get_or_insert(allowed);
                }
                RouteMatch::NotFound => {}
            }
        }

        let reason = match not_allowed {
            Some(allowed) => NotFoundReason::MethodNotAllowed { allowed },
            None => NotFoundReason::PathNotFound,
        };
        Err(ValidationError::OperationNotFound {
            method: method.to_string(),
            path: path.to_string(),
            reason,
        })
    }

    fn operation<'s>(&self, spec: &'s Specification, index: usize) -> Option<&'s Operation> {
        let (p, o) = *self.operations.get(index)?;
        spec.paths.get(p)?.operations.get(o)
    }

    /// The normalized request path with each matching server prefix removed.
    fn candidate_paths<'p>(&self, path: &'p str) -> Vec<&'p str> {
        let mut candidates = Vec::new();
        for prefix in &self.prefixes {
            if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                if rest.is_empty() {
                    candidates.push("/");
                } else if rest.starts_with('/') {
                    candidates.push(rest);
                }
            }
        }
        if self.root_allowed {
            candidates.push(path);
        }
        candidates
    }
}

/// Match a request against a specification.
///
/// Builds a throwaway [`Matcher`]; callers validating many requests should
/// keep one around instead.
pub fn match_operation<'s>(
    spec: &'s Specification,
    method: &str,
    path: &str,
) -> Result<MatchedOperation<'s>, ValidationError> {
    Matcher::new(spec).find(spec, method, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_spec::parse_spec;

    const NOTES: &str = r#"
openapi: "3.0.3"
info: { title: Notes, version: "1" }
paths:
  /login:
    post: { operationId: login }
  /notes/{identifier}:
    get: { operationId: getNote }
    delete: { operationId: deleteNote }
  /notes/latest:
    post: { operationId: createLatest }
  /files/{name}.{ext}:
    get: { operationId: getFile }
"#;

    fn spec() -> Specification {
        parse_spec(NOTES).unwrap()
    }

    fn operation_id<'s>(result: &Result<MatchedOperation<'s>, ValidationError>) -> Option<&'s str> {
        result.as_ref().ok()?.operation.operation_id.as_deref()
    }

    #[test]
    fn matches_templates_and_decodes_captures() {
        let spec = spec();
        let matched = match_operation(&spec, "GET", "/notes/abc").unwrap();
        assert_eq!(matched.operation.operation_id.as_deref(), Some("getNote"));
        assert_eq!(matched.path_params, vec![("identifier".into(), "abc".into())]);

        let matched = match_operation(&spec, "get", "/notes/hello%20world").unwrap();
        assert_eq!(matched.path_params[0].1, "hello world");

        let matched = match_operation(&spec, "GET", "/files/report.pdf").unwrap();
        assert_eq!(
            matched.path_params,
            vec![("name".into(), "report".into()), ("ext".into(), "pdf".into())]
        );
    }

    #[test]
    fn undecodable_captures_are_reported() {
        let spec = spec();
        let matched = match_operation(&spec, "GET", "/notes/%FF%FE").unwrap();
        assert_eq!(matched.operation.operation_id.as_deref(), Some("getNote"));
        assert!(matched.path_params.is_empty());
        assert_eq!(matched.capture_errors.len(), 1);
        assert_eq!(matched.capture_errors[0].field(), "identifier");
        assert_eq!(matched.capture_errors[0].location(), "path");
    }

    #[test]
    fn unknown_path_is_path_not_found() {
        let spec = spec();
        let err = match_operation(&spec, "GET", "/unknown").unwrap_err();
        assert_eq!(
            err,
            ValidationError::OperationNotFound {
                method: "GET".into(),
                path: "/unknown".into(),
                reason: NotFoundReason::PathNotFound,
            }
        );
    }

    #[test]
    fn undeclared_method_is_method_not_allowed() {
        let spec = spec();
        let err = match_operation(&spec, "PUT", "/notes/abc").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OperationNotFound {
                reason: NotFoundReason::MethodNotAllowed { ref allowed },
                ..
            } if allowed == &["DELETE".to_string(), "GET".to_string()]
        ));
    }

    #[test]
    fn literal_template_without_method_falls_back() {
        let spec = spec();
        assert_eq!(operation_id(&match_operation(&spec, "GET", "/notes/latest")), Some("getNote"));
        assert_eq!(
            operation_id(&match_operation(&spec, "POST", "/notes/latest")),
            Some("createLatest")
        );

        let err = match_operation(&spec, "PATCH", "/notes/latest").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OperationNotFound {
                reason: NotFoundReason::MethodNotAllowed { ref allowed },
                ..
            } if allowed == &["DELETE".to_string(), "GET".to_string(), "POST".to_string()]
        ));
    }

    #[test]
    fn server_prefixes_are_stripped() {
        let yaml = r#"
openapi: "3.0.3"
info: { title: Prefixed, version: "1" }
servers:
  - url: https://api.example.com/v1
  - url: /internal/api
paths:
  /:
    get: { operationId: root }
  /health:
    get: { operationId: health }
"#;
        let spec = parse_spec(yaml).unwrap();
        let matcher = Matcher::new(&spec);

        let id = |path: &str| operation_id(&matcher.find(&spec, "GET", path));
        assert_eq!(id("/v1/health"), Some("health"));
        assert_eq!(id("/internal/api/health/"), Some("health"));
        assert_eq!(id("/v1"), Some("root"));
        assert_eq!(id("/health"), None, "no root server declared");
        assert_eq!(id("/v1health"), None);
        assert_eq!(id("//v1/health"), Some("health"));
        assert_eq!(id("/v1//health//"), Some("health"));
    }

    #[test]
    fn root_server_keeps_unprefixed_paths() {
        let yaml = r#"
openapi: "3.0.3"
info: { title: Mixed, version: "1" }
servers:
  - url: /v2
  - url: http://localhost:8888
paths:
  /health:
    get: { operationId: health }
"#;
        let spec = parse_spec(yaml).unwrap();
        let matcher = Matcher::new(&spec);
        assert!(matcher.find(&spec, "GET", "/v2/health").is_ok());
        assert!(matcher.find(&spec, "GET", "/health").is_ok());
    }
}
