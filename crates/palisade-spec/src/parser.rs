use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::SpecParseError;
use crate::model::{
    ApiKeyLocation, HttpScheme, MediaTypeSpec, Operation, ParameterLocation, ParameterSpec,
    ParameterStyle, PathItem, RequestBodySpec, RequiredScheme, ResponseSpec, SecurityRequirement,
    SecurityScheme, Server, Specification,
};
use crate::resolve::Resolver;
use crate::schema::{Schema, SchemaType};

/// HTTP methods we recognize in OpenAPI path items.
const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Parse an OpenAPI 3.x document from a YAML/JSON string.
pub fn parse_spec(input: &str) -> Result<Specification, SpecParseError> {
    // Parse YAML (also handles JSON since JSON is valid YAML)
    let root: Value =
        serde_yaml::from_str(input).map_err(|e| SpecParseError::Syntax(e.to_string()))?;

    let root_obj = root
        .as_object()
        .ok_or_else(|| SpecParseError::Syntax("document root must be a mapping".into()))?;

    let openapi = detect_version(root_obj)?;

    let info = root_obj
        .get("info")
        .and_then(Value::as_object)
        .ok_or_else(|| SpecParseError::invalid("info", "missing 'info' object"))?;

    let title = info
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| SpecParseError::invalid("info", "missing 'info.title'"))?
        .to_string();

    let api_version = info
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();

    let mut resolver = Resolver::new(&root);

    let servers = parse_servers(root_obj)?;
    let schemas = parse_component_schemas(root_obj, &mut resolver)?;
    let security_schemes = parse_security_schemes(root_obj, &resolver)?;

    let security = match root_obj.get("security") {
        Some(v) => parse_security(v, &security_schemes, "security")?,
        None => Vec::new(),
    };

    let paths = parse_paths(root_obj, &mut resolver, &security_schemes, &security)?;

    let spec = Specification {
        openapi,
        title,
        api_version,
        servers,
        paths,
        schemas,
        security_schemes,
        security,
    };

    tracing::debug!(
        title = %spec.title,
        paths = spec.paths.len(),
        operations = spec.operations().count(),
        "specification parsed"
    );

    Ok(spec)
}

/// Parse a specification from a file path.
pub fn parse_spec_file(path: &std::path::Path) -> Result<Specification, SpecParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_spec(&content)
}

/// Check the `openapi` field and return the version string.
fn detect_version(root: &Map<String, Value>) -> Result<String, SpecParseError> {
    let Some(version) = root.get("openapi") else {
        return Err(SpecParseError::UnknownFormat);
    };

    // `openapi: 3.0` written without quotes arrives as a number
    let version = match version {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(SpecParseError::UnknownFormat),
    };

    if !version.starts_with("3.") {
        return Err(SpecParseError::UnsupportedVersion(version));
    }

    Ok(version)
}

fn parse_servers(root: &Map<String, Value>) -> Result<Vec<Server>, SpecParseError> {
    let Some(servers) = root.get("servers") else {
        return Ok(Vec::new());
    };

    let servers = servers
        .as_array()
        .ok_or_else(|| SpecParseError::invalid("servers", "servers must be an array"))?;

    let mut parsed = Vec::with_capacity(servers.len());
    for (i, server) in servers.iter().enumerate() {
        let location = format!("servers[{i}]");
        let url = server
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| SpecParseError::invalid(&location, "missing 'url'"))?;

        let url = substitute_server_variables(url, server.get("variables"));
        let base_path = server_base_path(&url);
        parsed.push(Server { url, base_path });
    }

    Ok(parsed)
}

/// Replace `{var}` placeholders in a server URL with the variables' defaults.
fn substitute_server_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(variables) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };

    let mut out = url.to_string();
    for (name, var) in variables {
        if let Some(default) = var.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{name}}}"), default);
        }
    }
    out
}

/// Extract the path component of a server URL ("" for the root).
fn server_base_path(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Relative server URLs ("/v1", "v1") are resolved against the host
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or("");
            format!("/{}", without_query.trim_start_matches('/'))
        }
    };

    path.trim_end_matches('/').to_string()
}

fn parse_component_schemas(
    root: &Map<String, Value>,
    resolver: &mut Resolver<'_>,
) -> Result<BTreeMap<String, Arc<Schema>>, SpecParseError> {
    let mut schemas = BTreeMap::new();

    let Some(components) = root
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
    else {
        return Ok(schemas);
    };

    for name in components.keys() {
        // Compile through the reference so every later `$ref` shares the link
        let reference = format!("#/components/schemas/{}", escape_pointer(name));
        let schema = resolver.schema_ref(&reference, &format!("components.schemas.{name}"))?;
        schemas.insert(name.clone(), schema);
    }

    Ok(schemas)
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn parse_security_schemes<'a>(
    root: &'a Map<String, Value>,
    resolver: &Resolver<'a>,
) -> Result<BTreeMap<String, SecurityScheme>, SpecParseError> {
    let mut schemes = BTreeMap::new();

    let Some(declared) = root
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object)
    else {
        return Ok(schemes);
    };

    for (name, value) in declared {
        let location = format!("components.securitySchemes.{name}");
        let value = resolver.follow(value, &location)?;
        schemes.insert(name.clone(), parse_security_scheme(value, &location)?);
    }

    Ok(schemes)
}

fn parse_security_scheme(value: &Value, location: &str) -> Result<SecurityScheme, SpecParseError> {
    let field = |key: &str| value.get(key).and_then(Value::as_str);

    let kind = field("type").ok_or_else(|| SpecParseError::invalid(location, "missing 'type'"))?;

    match kind {
        "apiKey" => {
            let name = field("name")
                .ok_or_else(|| SpecParseError::invalid(location, "apiKey scheme missing 'name'"))?;
            let key_location = field("in")
                .and_then(ApiKeyLocation::parse)
                .ok_or_else(|| {
                    SpecParseError::invalid(
                        location,
                        "apiKey scheme 'in' must be one of header, query, cookie",
                    )
                })?;
            Ok(SecurityScheme::ApiKey {
                name: name.to_string(),
                location: key_location,
            })
        }
        "http" => {
            let scheme = field("scheme")
                .ok_or_else(|| SpecParseError::invalid(location, "http scheme missing 'scheme'"))?;
            Ok(SecurityScheme::Http {
                scheme: HttpScheme::parse(scheme),
                bearer_format: field("bearerFormat").map(str::to_string),
            })
        }
        "oauth2" => Ok(SecurityScheme::OAuth2),
        "openIdConnect" => Ok(SecurityScheme::OpenIdConnect {
            url: field("openIdConnectUrl").unwrap_or_default().to_string(),
        }),
        "mutualTLS" => Ok(SecurityScheme::MutualTls),
        other => Err(SpecParseError::invalid(
            location,
            format!("unknown security scheme type '{}'", other),
        )),
    }
}

/// Parse a `security` list, checking every scheme name is declared.
fn parse_security(
    value: &Value,
    schemes: &BTreeMap<String, SecurityScheme>,
    location: &str,
) -> Result<Vec<SecurityRequirement>, SpecParseError> {
    let list = value
        .as_array()
        .ok_or_else(|| SpecParseError::invalid(location, "security must be an array"))?;

    let mut requirements = Vec::with_capacity(list.len());
    for (i, item) in list.iter().enumerate() {
        let item_location = format!("{location}[{i}]");
        let obj = item.as_object().ok_or_else(|| {
            SpecParseError::invalid(&item_location, "security requirement must be an object")
        })?;

        let mut requirement = SecurityRequirement::default();
        for (name, scopes) in obj {
            if !schemes.contains_key(name) {
                return Err(SpecParseError::invalid(
                    &item_location,
                    format!("undefined security scheme '{}'", name),
                ));
            }
            let scopes = scopes
                .as_array()
                .map(|s| {
                    s.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            requirement.schemes.push(RequiredScheme {
                name: name.clone(),
                scopes,
            });
        }
        requirements.push(requirement);
    }

    Ok(requirements)
}

/// Parse `paths` into path items, keeping declaration order.
fn parse_paths<'a>(
    root: &'a Map<String, Value>,
    resolver: &mut Resolver<'a>,
    schemes: &BTreeMap<String, SecurityScheme>,
    global_security: &[SecurityRequirement],
) -> Result<Vec<PathItem>, SpecParseError> {
    let mut items = Vec::new();

    let paths = match root.get("paths") {
        Some(p) => p
            .as_object()
            .ok_or_else(|| SpecParseError::invalid("paths", "paths must be an object"))?,
        None => return Ok(items), // No paths is valid (empty API)
    };

    for (template, path_item) in paths {
        let location = format!("paths.{template}");
        if !template.starts_with('/') {
            return Err(SpecParseError::invalid(&location, "path template must start with '/'"));
        }

        let path_item = resolver.follow(path_item, &location)?;
        let path_obj = path_item
            .as_object()
            .ok_or_else(|| SpecParseError::invalid(&location, "path item must be an object"))?;

        // Path-level parameters (inherited by all operations)
        let path_params = parse_parameters(path_obj, resolver, &location)?;

        let mut operations = Vec::new();
        for (key, op_value) in path_obj {
            if !HTTP_METHODS.contains(&key.as_str()) {
                continue;
            }
            let op_location = format!("{location}.{key}");
            let op_obj = op_value.as_object().ok_or_else(|| {
                SpecParseError::invalid(&op_location, "operation must be an object")
            })?;

            let operation = parse_operation(
                template,
                &key.to_uppercase(),
                op_obj,
                &path_params,
                resolver,
                schemes,
                global_security,
                &op_location,
            )?;
            operations.push(operation);
        }

        items.push(PathItem {
            template: template.clone(),
            operations,
        });
    }

    Ok(items)
}

#[allow(clippy::too_many_arguments)]
fn parse_operation<'a>(
    template: &str,
    method: &str,
    op_obj: &'a Map<String, Value>,
    path_params: &[ParameterSpec],
    resolver: &mut Resolver<'a>,
    schemes: &BTreeMap<String, SecurityScheme>,
    global_security: &[SecurityRequirement],
    location: &str,
) -> Result<Operation, SpecParseError> {
    // Merge path-level and operation-level parameters; the operation wins
    let mut parameters: Vec<ParameterSpec> = path_params.to_vec();
    for param in parse_parameters(op_obj, resolver, location)? {
        match parameters
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param,
            None => parameters.push(param),
        }
    }

    check_path_parameters(template, &mut parameters, location)?;

    let request_body = match op_obj.get("requestBody") {
        Some(body) => Some(parse_request_body(body, resolver, &format!("{location}.requestBody"))?),
        None => None,
    };

    // An explicit `security: []` disables inherited requirements
    let security = match op_obj.get("security") {
        Some(v) => parse_security(v, schemes, &format!("{location}.security"))?,
        None => global_security.to_vec(),
    };

    let responses = parse_responses(op_obj, resolver, location)?;

    Ok(Operation {
        method: method.to_string(),
        path: template.to_string(),
        operation_id: op_obj
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string),
        summary: op_obj
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters,
        request_body,
        security,
        responses,
        deprecated: op_obj
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Placeholder names appearing in a path template.
pub fn template_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    names
}

/// Every `in: path` parameter must occur in the template; every
/// placeholder without a declaration gets an implicit string parameter.
fn check_path_parameters(
    template: &str,
    parameters: &mut Vec<ParameterSpec>,
    location: &str,
) -> Result<(), SpecParseError> {
    let placeholders = template_placeholders(template);

    for param in parameters.iter() {
        if param.location == ParameterLocation::Path && !placeholders.contains(&param.name.as_str()) {
            return Err(SpecParseError::invalid(
                location,
                format!("path parameter '{}' does not occur in '{}'", param.name, template),
            ));
        }
    }

    for name in placeholders {
        let declared = parameters
            .iter()
            .any(|p| p.location == ParameterLocation::Path && p.name == name);
        if !declared {
            parameters.push(ParameterSpec {
                name: name.to_string(),
                location: ParameterLocation::Path,
                required: true,
                schema: Arc::new(Schema::of_type(SchemaType::String)),
                style: ParameterStyle::Simple,
                explode: false,
                allow_empty_value: false,
                media_type: None,
                deprecated: false,
            });
        }
    }

    Ok(())
}

/// Parse parameters from a path item or operation object.
fn parse_parameters<'a>(
    obj: &'a Map<String, Value>,
    resolver: &mut Resolver<'a>,
    location: &str,
) -> Result<Vec<ParameterSpec>, SpecParseError> {
    let Some(list) = obj.get("parameters") else {
        return Ok(Vec::new());
    };

    let list = list.as_array().ok_or_else(|| {
        SpecParseError::invalid(format!("{location}.parameters"), "parameters must be an array")
    })?;

    let mut params = Vec::with_capacity(list.len());
    for (i, item) in list.iter().enumerate() {
        let param_location = format!("{location}.parameters[{i}]");
        let item = resolver.follow(item, &param_location)?;
        params.push(parse_parameter(item, resolver, &param_location)?);
    }

    Ok(params)
}

fn parse_parameter<'a>(
    item: &'a Value,
    resolver: &mut Resolver<'a>,
    location: &str,
) -> Result<ParameterSpec, SpecParseError> {
    let obj = item
        .as_object()
        .ok_or_else(|| SpecParseError::invalid(location, "parameter must be an object"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SpecParseError::invalid(location, "parameter missing 'name'"))?;

    let param_location = obj
        .get("in")
        .and_then(Value::as_str)
        .ok_or_else(|| SpecParseError::invalid(location, "parameter missing 'in'"))?;
    let param_location = ParameterLocation::parse(param_location).ok_or_else(|| {
        SpecParseError::invalid(
            location,
            format!("invalid parameter location '{}'", param_location),
        )
    })?;

    let style = match obj.get("style").and_then(Value::as_str) {
        Some(s) => {
            let style = ParameterStyle::parse(s).ok_or_else(|| {
                SpecParseError::invalid(location, format!("unknown parameter style '{}'", s))
            })?;
            if !param_location.allows_style(style) {
                return Err(SpecParseError::invalid(
                    location,
                    format!("style '{}' is not allowed for {} parameters", style, param_location),
                ));
            }
            style
        }
        None => param_location.default_style(),
    };

    let explode = obj
        .get("explode")
        .and_then(Value::as_bool)
        .unwrap_or(style == ParameterStyle::Form);

    let (schema, media_type) = match (obj.get("schema"), obj.get("content")) {
        (Some(schema), _) => (resolver.schema(schema, &format!("{location}.schema"))?, None),
        (None, Some(content)) => {
            let content = content.as_object().ok_or_else(|| {
                SpecParseError::invalid(location, "parameter 'content' must be an object")
            })?;
            let Some((media_type, media)) = content.iter().next() else {
                return Err(SpecParseError::invalid(location, "parameter 'content' is empty"));
            };
            let schema = match media.get("schema") {
                Some(s) => resolver.schema(s, &format!("{location}.content.{media_type}.schema"))?,
                None => Arc::new(Schema::any()),
            };
            (schema, Some(media_type.clone()))
        }
        (None, None) => (Arc::new(Schema::any()), None),
    };

    Ok(ParameterSpec {
        name: name.to_string(),
        location: param_location,
        // Path params always required
        required: param_location == ParameterLocation::Path
            || obj.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema,
        style,
        explode,
        allow_empty_value: obj
            .get("allowEmptyValue")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        media_type,
        deprecated: obj
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_request_body<'a>(
    body: &'a Value,
    resolver: &mut Resolver<'a>,
    location: &str,
) -> Result<RequestBodySpec, SpecParseError> {
    let body = resolver.follow(body, location)?;
    let obj = body
        .as_object()
        .ok_or_else(|| SpecParseError::invalid(location, "request body must be an object"))?;

    let required = obj
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = parse_content(obj, resolver, location)?;
    if content.is_empty() {
        return Err(SpecParseError::invalid(
            location,
            "request body declares no media types",
        ));
    }

    Ok(RequestBodySpec { required, content })
}

fn parse_content<'a>(
    obj: &'a Map<String, Value>,
    resolver: &mut Resolver<'a>,
    location: &str,
) -> Result<Vec<MediaTypeSpec>, SpecParseError> {
    let Some(content) = obj.get("content") else {
        return Ok(Vec::new());
    };

    let content = content.as_object().ok_or_else(|| {
        SpecParseError::invalid(format!("{location}.content"), "content must be an object")
    })?;

    let mut media_types = Vec::with_capacity(content.len());
    for (media_type, media_obj) in content {
        let schema = match media_obj.get("schema") {
            Some(s) => Some(resolver.schema(s, &format!("{location}.content.{media_type}.schema"))?),
            None => None,
        };
        media_types.push(MediaTypeSpec {
            media_type: media_type.to_ascii_lowercase(),
            schema,
        });
    }

    Ok(media_types)
}

fn parse_responses<'a>(
    op_obj: &'a Map<String, Value>,
    resolver: &mut Resolver<'a>,
    location: &str,
) -> Result<BTreeMap<String, ResponseSpec>, SpecParseError> {
    let mut responses = BTreeMap::new();

    let Some(declared) = op_obj.get("responses").and_then(Value::as_object) else {
        return Ok(responses);
    };

    for (code, response) in declared {
        let response_location = format!("{location}.responses.{code}");
        let response = resolver.follow(response, &response_location)?;
        let Some(obj) = response.as_object() else {
            return Err(SpecParseError::invalid(
                &response_location,
                "response must be an object",
            ));
        };

        responses.insert(
            code.clone(),
            ResponseSpec {
                description: obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: parse_content(obj, resolver, &response_location)?,
            },
        );
    }

    Ok(responses)
}
