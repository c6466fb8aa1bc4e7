//! Security requirement checks.
//!
//! Presence and well-formedness only: tokens are not verified, that is left
//! to the caller. Alternatives are ORed, schemes within one are ANDed.

use std::collections::BTreeMap;

use base64::Engine;
use palisade_spec::{
    ApiKeyLocation, HttpScheme, Operation, SecurityRequirement, SecurityScheme, Specification,
};

use crate::error::{SecurityFailure, ValidationError};
use crate::request::RawRequest;

/// A credential found in the request for one security scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Basic { username: String, password: String },
    Bearer(String),
    /// Another `http` scheme: the scheme name and the rest of the header.
    Other { scheme: String, value: String },
}

/// Credentials of the satisfied alternative, keyed by scheme name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    schemes: BTreeMap<String, Credential>,
}

impl Credentials {
    pub fn get(&self, scheme: &str) -> Option<&Credential> {
        self.schemes.get(scheme)
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Credential)> {
        self.schemes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Check the operation's security requirements against the request.
///
/// The first fully satisfied alternative wins. An operation without
/// requirements, or with an empty alternative, needs no credentials.
pub fn validate_security(
    spec: &Specification,
    operation: &Operation,
    request: &RawRequest,
) -> Result<Credentials, ValidationError> {
    if operation.security.is_empty() {
        return Ok(Credentials::default());
    }

    let mut failures = Vec::with_capacity(operation.security.len());
    for requirement in &operation.security {
        match check_requirement(spec, requirement, request) {
            Ok(credentials) => return Ok(credentials),
            Err(failure) => failures.push(failure),
        }
    }

    tracing::trace!(
        operation = %operation.label(),
        alternatives = failures.len(),
        "no security alternative satisfied"
    );

    Err(ValidationError::SecurityNotSatisfied { failures })
}

fn check_requirement(
    spec: &Specification,
    requirement: &SecurityRequirement,
    request: &RawRequest,
) -> Result<Credentials, SecurityFailure> {
    let mut credentials = Credentials::default();

    for required in &requirement.schemes {
        let fail = |reason: String| SecurityFailure {
            alternative: requirement.schemes.iter().map(|s| s.name.clone()).collect(),
            scheme: required.name.clone(),
            reason,
        };

        let scheme = spec
            .security_scheme(&required.name)
            .ok_or_else(|| fail("undefined security scheme".into()))?;
        let credential = check_scheme(scheme, request).map_err(fail)?;
        credentials.schemes.insert(required.name.clone(), credential);
    }

    Ok(credentials)
}

fn check_scheme(scheme: &SecurityScheme, request: &RawRequest) -> Result<Credential, String> {
    match scheme {
        SecurityScheme::ApiKey { name, location } => {
            let value = match location {
                ApiKeyLocation::Header => request.header_value(name).map(str::to_string),
                ApiKeyLocation::Query => request
                    .query_pairs()
                    .into_iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v),
                ApiKeyLocation::Cookie => request.cookie(name).map(str::to_string),
            };
            match value {
                Some(v) if !v.trim().is_empty() => Ok(Credential::ApiKey(v)),
                Some(_) => Err(format!("empty {} '{}'", location.as_str(), name)),
                None => Err(format!("missing {} '{}'", location.as_str(), name)),
            }
        }
        SecurityScheme::Http {
            scheme: HttpScheme::Basic,
            ..
        } => basic_credential(request),
        SecurityScheme::Http {
            scheme: HttpScheme::Bearer,
            bearer_format,
        } => bearer_credential(request, bearer_format.as_deref()),
        SecurityScheme::Http {
            scheme: HttpScheme::Other(name),
            ..
        } => {
            let (scheme, value) = authorization(request)?;
            if scheme.eq_ignore_ascii_case(name) {
                Ok(Credential::Other {
                    scheme: name.clone(),
                    value: value.to_string(),
                })
            } else {
                Err(format!("expected '{name}' authorization scheme"))
            }
        }
        SecurityScheme::OAuth2 | SecurityScheme::OpenIdConnect { .. } => {
            bearer_credential(request, None)
        }
        SecurityScheme::MutualTls => Err("mutual TLS cannot be checked on a request".into()),
    }
}

/// Split `Authorization: <scheme> <value>`.
fn authorization(request: &RawRequest) -> Result<(&str, &str), String> {
    let header = request
        .header_value("authorization")
        .ok_or_else(|| "missing Authorization header".to_string())?
        .trim();
    match header.split_once(' ') {
        Some((scheme, value)) => Ok((scheme, value.trim())),
        None => Ok((header, "")),
    }
}

fn basic_credential(request: &RawRequest) -> Result<Credential, String> {
    let (scheme, encoded) = authorization(request)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err("expected 'Basic' authorization scheme".into());
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| "basic credentials are not valid base64".to_string())?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| "basic credentials are not valid UTF-8".to_string())?;

    match decoded.split_once(':') {
        Some((username, password)) if !username.is_empty() => Ok(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }),
        Some(_) => Err("basic credentials have an empty username".into()),
        None => Err("basic credentials must be 'user:password'".into()),
    }
}

fn bearer_credential(request: &RawRequest, bearer_format: Option<&str>) -> Result<Credential, String> {
    let (scheme, token) = authorization(request)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("expected 'Bearer' authorization scheme".into());
    }
    if token.is_empty() {
        return Err("empty bearer token".into());
    }
    if bearer_format.is_some_and(|f| f.eq_ignore_ascii_case("jwt")) && !is_jwt(token) {
        return Err("bearer token is not a JWT".into());
    }
    Ok(Credential::Bearer(token.to_string()))
}

/// Three dot-separated base64url segments; the signature may be empty.
fn is_jwt(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    let base64url = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=')
    };
    segments.len() == 3
        && !segments[0].is_empty()
        && !segments[1].is_empty()
        && segments.iter().all(|s| base64url(s))
}
