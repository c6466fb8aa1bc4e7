use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::schema::Schema;

/// A loaded OpenAPI document. Immutable once built.
#[derive(Debug, Clone)]
pub struct Specification {
    /// The `openapi` version string (e.g. "3.0.3").
    pub openapi: String,
    /// The `info.title` field.
    pub title: String,
    /// The `info.version` field.
    pub api_version: String,
    /// Declared servers.
    pub servers: Vec<Server>,
    /// Path items in declaration order.
    pub paths: Vec<PathItem>,
    /// Resolved `components.schemas`.
    pub schemas: BTreeMap<String, Arc<Schema>>,
    /// `components.securitySchemes`.
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    /// Root-level `security`.
    pub security: Vec<SecurityRequirement>,
}

impl Specification {
    /// All operations, path by path, in declaration order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.paths.iter().flat_map(|p| p.operations.iter())
    }

    pub fn operation_by_id(&self, operation_id: &str) -> Option<&Operation> {
        self.operations()
            .find(|op| op.operation_id.as_deref() == Some(operation_id))
    }

    pub fn path_item(&self, template: &str) -> Option<&PathItem> {
        self.paths.iter().find(|p| p.template == template)
    }

    pub fn security_scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.security_schemes.get(name)
    }

    /// Distinct non-root server base paths (e.g. "/v1").
    pub fn base_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for server in &self.servers {
            if !server.base_path.is_empty() && !paths.contains(&server.base_path.as_str()) {
                paths.push(&server.base_path);
            }
        }
        paths
    }
}

/// A `servers` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// The declared URL with variables substituted by their defaults.
    pub url: String,
    /// The path component without trailing slash; empty for the root.
    pub base_path: String,
}

/// A path template and the operations declared on it.
#[derive(Debug, Clone)]
pub struct PathItem {
    /// The path template (e.g. "/notes/{identifier}").
    pub template: String,
    /// Operations in declaration order.
    pub operations: Vec<Operation>,
}

impl PathItem {
    /// Find the operation for a method, ignoring case.
    pub fn operation(&self, method: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.method.eq_ignore_ascii_case(method))
    }

    /// Declared methods, uppercase.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.method.as_str())
    }
}

/// A single method + path combination.
#[derive(Debug, Clone)]
pub struct Operation {
    /// The HTTP method (uppercase).
    pub method: String,
    /// The path template this operation lives under.
    pub path: String,
    /// The OpenAPI operationId, if present.
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    /// Path-level and operation-level parameters, merged.
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<RequestBodySpec>,
    /// Effective security alternatives (operation-level or inherited).
    pub security: Vec<SecurityRequirement>,
    /// Status code (or "default") to response.
    pub responses: BTreeMap<String, ResponseSpec>,
    pub deprecated: bool,
}

impl Operation {
    /// Parameters declared for one location.
    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    /// A human-readable "METHOD /path" label.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Where a parameter lives in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// The style used when a parameter declares none.
    pub fn default_style(&self) -> ParameterStyle {
        match self {
            Self::Path | Self::Header => ParameterStyle::Simple,
            Self::Query | Self::Cookie => ParameterStyle::Form,
        }
    }

    /// Styles the OpenAPI 3 serialization table allows here.
    pub fn allows_style(&self, style: ParameterStyle) -> bool {
        use ParameterStyle as S;
        match self {
            Self::Path => matches!(style, S::Simple | S::Label | S::Matrix),
            Self::Query => matches!(
                style,
                S::Form | S::SpaceDelimited | S::PipeDelimited | S::DeepObject
            ),
            Self::Header => matches!(style, S::Simple),
            Self::Cookie => matches!(style, S::Form),
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization style of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matrix" => Some(Self::Matrix),
            "label" => Some(Self::Label),
            "form" => Some(Self::Form),
            "simple" => Some(Self::Simple),
            "spaceDelimited" => Some(Self::SpaceDelimited),
            "pipeDelimited" => Some(Self::PipeDelimited),
            "deepObject" => Some(Self::DeepObject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matrix => "matrix",
            Self::Label => "label",
            Self::Form => "form",
            Self::Simple => "simple",
            Self::SpaceDelimited => "spaceDelimited",
            Self::PipeDelimited => "pipeDelimited",
            Self::DeepObject => "deepObject",
        }
    }
}

impl fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParameterLocation,
    /// Always true for path parameters.
    pub required: bool,
    pub schema: Arc<Schema>,
    pub style: ParameterStyle,
    pub explode: bool,
    pub allow_empty_value: bool,
    /// Set when the parameter uses `content` instead of `schema`.
    pub media_type: Option<String>,
    pub deprecated: bool,
}

/// A declared request body.
#[derive(Debug, Clone)]
pub struct RequestBodySpec {
    pub required: bool,
    /// Media types in declaration order.
    pub content: Vec<MediaTypeSpec>,
}

impl RequestBodySpec {
    pub fn media_types(&self) -> Vec<&str> {
        self.content.iter().map(|m| m.media_type.as_str()).collect()
    }
}

/// A media type entry under `content`.
#[derive(Debug, Clone)]
pub struct MediaTypeSpec {
    pub media_type: String,
    pub schema: Option<Arc<Schema>>,
}

/// A declared response. Not used by request validation.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub description: String,
    pub content: Vec<MediaTypeSpec>,
}

/// One security alternative: every listed scheme must be satisfied.
///
/// An empty requirement (`{}`) allows anonymous access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement {
    pub schemes: Vec<RequiredScheme>,
}

impl SecurityRequirement {
    pub fn is_anonymous(&self) -> bool {
        self.schemes.is_empty()
    }
}

/// A scheme reference inside a security requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredScheme {
    pub name: String,
    pub scopes: Vec<String>,
}

/// A `components.securitySchemes` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    ApiKey {
        name: String,
        location: ApiKeyLocation,
    },
    Http {
        scheme: HttpScheme,
        bearer_format: Option<String>,
    },
    OAuth2,
    OpenIdConnect {
        url: String,
    },
    MutualTls,
}

/// Where an API key is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

impl ApiKeyLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "header" => Some(Self::Header),
            "query" => Some(Self::Query),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Cookie => "cookie",
        }
    }
}

/// The `scheme` of an `http` security scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpScheme {
    Basic,
    Bearer,
    Other(String),
}

impl HttpScheme {
    /// Scheme names are case-insensitive (RFC 7235).
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Self::Basic,
            "bearer" => Self::Bearer,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Basic => "basic",
            Self::Bearer => "bearer",
            Self::Other(s) => s,
        }
    }
}
