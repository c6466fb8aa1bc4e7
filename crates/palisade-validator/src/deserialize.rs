//! Parameter and body deserialization.
//!
//! Turns the raw strings of a request into typed JSON values following the
//! OpenAPI serialization styles, and decodes the body according to the
//! selected media type. Type coercion is strict: a value that cannot be
//! parsed as the declared primitive type is an error, never truncated.

use palisade_spec::{
    MediaTypeSpec, Operation, ParameterLocation, ParameterSpec, ParameterStyle, RequestBodySpec,
    Schema, SchemaType,
};
use serde_json::{Map, Number, Value};

use crate::error::{DeserializeError, ValidationError};
use crate::request::RawRequest;

/// Media type assumed for a body sent without `Content-Type`.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Header parameters the OpenAPI specification says to ignore.
const RESERVED_HEADERS: &[&str] = &["accept", "content-type", "authorization"];

/// Typed request values, keyed by parameter name per location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeserializedValues {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub cookies: Map<String, Value>,
    pub body: Option<Value>,
    /// The declared media type the body was matched against.
    pub media_type: Option<String>,
}

impl DeserializedValues {
    pub fn parameters(&self, location: ParameterLocation) -> &Map<String, Value> {
        match location {
            ParameterLocation::Path => &self.path,
            ParameterLocation::Query => &self.query,
            ParameterLocation::Header => &self.headers,
            ParameterLocation::Cookie => &self.cookies,
        }
    }

    fn parameters_mut(&mut self, location: ParameterLocation) -> &mut Map<String, Value> {
        match location {
            ParameterLocation::Path => &mut self.path,
            ParameterLocation::Query => &mut self.query,
            ParameterLocation::Header => &mut self.headers,
            ParameterLocation::Cookie => &mut self.cookies,
        }
    }

    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&Value> {
        self.parameters(location).get(name)
    }
}

/// Deserialize every declared parameter and the body of a request.
///
/// A media type mismatch is returned alone as
/// [`ValidationError::MediaTypeNotAllowed`]; otherwise every parameter and
/// body problem is collected as [`ValidationError::DeserializationFailed`].
pub fn deserialize(
    operation: &Operation,
    request: &RawRequest,
    path_params: &[(String, String)],
) -> Result<DeserializedValues, Vec<ValidationError>> {
    let selected = match &operation.request_body {
        Some(body_spec) if !request.body.is_empty() => {
            let content_type = request.content_type().unwrap_or(DEFAULT_MEDIA_TYPE);
            let media = select_media_type(body_spec, content_type).map_err(|e| vec![e])?;
            Some((media, content_type))
        }
        _ => None,
    };

    let sources = Sources {
        path: path_params,
        query: request.query_pairs(),
        cookies: request.cookies(),
        request,
        query_names: operation
            .parameters_in(ParameterLocation::Query)
            .map(|p| p.name.as_str())
            .collect(),
    };

    let mut values = DeserializedValues::default();
    let mut errors = Vec::new();

    for param in &operation.parameters {
        if param.location == ParameterLocation::Header
            && RESERVED_HEADERS.contains(&param.name.to_ascii_lowercase().as_str())
        {
            continue;
        }

        match deserialize_parameter(param, &sources) {
            Ok(Some(value)) => {
                values
                    .parameters_mut(param.location)
                    .insert(param.name.clone(), value);
            }
            Ok(None) if param.required => errors.push(DeserializeError::MissingParameter {
                name: param.name.clone(),
                location: param.location,
            }),
            Ok(None) => {
                if let Some(default) = &param.schema.default {
                    values
                        .parameters_mut(param.location)
                        .insert(param.name.clone(), default.clone());
                }
            }
            Err(e) => errors.push(e),
        }
    }

    if let Some(body_spec) = &operation.request_body {
        match selected {
            Some((media, content_type)) => match decode_body(&request.body, content_type, media) {
                Ok(body) => {
                    values.body = Some(body);
                    values.media_type = Some(media.media_type.clone());
                }
                Err(e) => errors.push(e),
            },
            None if body_spec.required => errors.push(DeserializeError::MissingBody),
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors
            .into_iter()
            .map(ValidationError::DeserializationFailed)
            .collect())
    }
}

/// The media type part of a `Content-Type` value, lowercased.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the declared media type for a request `Content-Type`.
///
/// Exact essence match first, then `type/*`, then `*/*`.
pub fn select_media_type<'b>(
    body: &'b RequestBodySpec,
    content_type: &str,
) -> Result<&'b MediaTypeSpec, ValidationError> {
    let essence = media_type_essence(content_type);
    let range = match essence.split_once('/') {
        Some((major, _)) => format!("{major}/*"),
        None => String::new(),
    };

    let find = |wanted: &str| {
        body.content
            .iter()
            .find(|m| media_type_essence(&m.media_type) == wanted)
    };

    find(&essence)
        .or_else(|| find(&range))
        .or_else(|| find("*/*"))
        .ok_or_else(|| ValidationError::MediaTypeNotAllowed {
            content_type: essence.clone(),
            allowed: body.media_types().into_iter().map(str::to_string).collect(),
        })
}

fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

fn is_msgpack(essence: &str) -> bool {
    matches!(essence, "application/msgpack" | "application/x-msgpack")
}

/// Decode a non-empty body.
fn decode_body(
    body: &[u8],
    content_type: &str,
    media: &MediaTypeSpec,
) -> Result<Value, DeserializeError> {
    let essence = media_type_essence(content_type);
    let malformed = |reason: String| DeserializeError::MalformedBody {
        media_type: essence.clone(),
        reason,
    };

    if is_json(&essence) {
        return serde_json::from_slice(body).map_err(|e| malformed(e.to_string()));
    }

    if is_msgpack(&essence) {
        return rmp_serde::from_slice(body).map_err(|e| malformed(e.to_string()));
    }

    if essence == "application/x-www-form-urlencoded" {
        return Ok(decode_form(body, media.schema.as_deref()));
    }

    String::from_utf8(body.to_vec())
        .map(Value::String)
        .map_err(|_| malformed("body is not valid UTF-8".into()))
}

/// Decode a form body into an object, coercing fields by their property
/// schemas. Fields that do not coerce stay strings for the schema
/// validator to report.
fn decode_form(body: &[u8], schema: Option<&Schema>) -> Value {
    let mut fields: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in form_urlencoded::parse(body) {
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => fields.push((key.into_owned(), vec![value.into_owned()])),
        }
    }

    let mut object = Map::new();
    for (key, raw_values) in fields {
        let property = schema.and_then(|s| s.property(&key).or_else(|| s.additional_schema()));
        let value = match property {
            Some(prop) if shape_of(prop) == Shape::Array => {
                let item = prop.item_schema();
                Value::Array(
                    raw_values
                        .iter()
                        .map(|raw| coerce_lenient(raw, item.map(|s| s.as_ref())))
                        .collect(),
                )
            }
            _ => {
                let first = raw_values.first().map(String::as_str).unwrap_or_default();
                coerce_lenient(first, property.map(|s| s.as_ref()))
            }
        };
        object.insert(key, value);
    }

    Value::Object(object)
}

fn coerce_lenient(raw: &str, schema: Option<&Schema>) -> Value {
    schema
        .and_then(|s| coerce(raw, s).ok())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Where raw parameter strings come from.
struct Sources<'r> {
    path: &'r [(String, String)],
    query: Vec<(String, String)>,
    cookies: Vec<(&'r str, &'r str)>,
    request: &'r RawRequest,
    /// Declared query parameter names, excluded from free-form objects.
    query_names: Vec<&'r str>,
}

/// The structural shape a parameter value takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Primitive,
    Array,
    Object,
}

fn shape_of(schema: &Schema) -> Shape {
    let types = schema.effective_types();
    if types.contains(&SchemaType::Array) {
        Shape::Array
    } else if types.contains(&SchemaType::Object) {
        Shape::Object
    } else {
        Shape::Primitive
    }
}

/// Deserialize one parameter. `Ok(None)` means absent from the request.
fn deserialize_parameter(
    param: &ParameterSpec,
    sources: &Sources<'_>,
) -> Result<Option<Value>, DeserializeError> {
    let invalid = |reason: String| DeserializeError::InvalidParameter {
        name: param.name.clone(),
        location: param.location,
        reason,
    };

    let value = match param.location {
        ParameterLocation::Path => sources
            .path
            .iter()
            .find(|(name, _)| *name == param.name)
            .map(|(_, raw)| path_value(param, raw)),
        ParameterLocation::Query => query_value(param, sources),
        ParameterLocation::Header => sources
            .request
            .header_value(&param.name)
            .map(|raw| simple_value(param, raw.trim())),
        ParameterLocation::Cookie => sources
            .cookies
            .iter()
            .find(|(name, _)| *name == param.name)
            .map(|(_, raw)| cookie_value(param, raw)),
    };

    value.transpose().map_err(invalid)
}

/// Parse a value carried with `content` instead of `schema`.
fn content_value(param: &ParameterSpec, media_type: &str, raw: &str) -> Result<Value, String> {
    if is_json(&media_type_essence(media_type)) {
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
    } else {
        coerce(raw, &param.schema)
    }
}

fn path_value(param: &ParameterSpec, raw: &str) -> Result<Value, String> {
    if let Some(media_type) = &param.media_type {
        return content_value(param, media_type, raw);
    }

    match param.style {
        ParameterStyle::Label => {
            let rest = raw
                .strip_prefix('.')
                .ok_or_else(|| "label style value must start with '.'".to_string())?;
            let sep = if param.explode { '.' } else { ',' };
            match shape_of(&param.schema) {
                Shape::Primitive => coerce(rest, &param.schema),
                Shape::Array => build_array(split(rest, sep), &param.schema),
                Shape::Object if param.explode => build_object(key_value_pairs(rest, sep)?, &param.schema),
                Shape::Object => build_object(flat_pairs(rest, ',')?, &param.schema),
            }
        }
        ParameterStyle::Matrix => matrix_value(param, raw),
        _ => simple_value(param, raw),
    }
}

/// `;name=value`, `;name=a,b`, `;name=a;name=b`, `;k=v;k2=v2`.
fn matrix_value(param: &ParameterSpec, raw: &str) -> Result<Value, String> {
    let rest = raw
        .strip_prefix(';')
        .ok_or_else(|| "matrix style value must start with ';'".to_string())?;
    let shape = shape_of(&param.schema);

    if shape == Shape::Object && param.explode {
        return build_object(key_value_pairs(rest, ';')?, &param.schema);
    }

    let named = |segment: &str| -> Result<String, String> {
        match segment.split_once('=') {
            Some((name, value)) if name == param.name => Ok(value.to_string()),
            None if segment == param.name => Ok(String::new()),
            _ => Err(format!("expected ';{}=' segment", param.name)),
        }
    };

    match shape {
        Shape::Array if param.explode => {
            let items = rest.split(';').map(&named).collect::<Result<Vec<_>, _>>()?;
            build_array(items.iter().map(String::as_str).collect(), &param.schema)
        }
        Shape::Array => build_array(split(&named(rest)?, ','), &param.schema),
        Shape::Object => build_object(flat_pairs(&named(rest)?, ',')?, &param.schema),
        Shape::Primitive => coerce(&named(rest)?, &param.schema),
    }
}

/// `simple` style: comma separated, exploded objects as `k=v` pairs.
fn simple_value(param: &ParameterSpec, raw: &str) -> Result<Value, String> {
    if let Some(media_type) = &param.media_type {
        return content_value(param, media_type, raw);
    }

    match shape_of(&param.schema) {
        Shape::Primitive => coerce(raw, &param.schema),
        Shape::Array => build_array(split(raw, ',').into_iter().map(str::trim).collect(), &param.schema),
        Shape::Object if param.explode => build_object(key_value_pairs(raw, ',')?, &param.schema),
        Shape::Object => build_object(flat_pairs(raw, ',')?, &param.schema),
    }
}

/// Cookies use `form` style without the repeated-key explosion.
fn cookie_value(param: &ParameterSpec, raw: &str) -> Result<Value, String> {
    if let Some(media_type) = &param.media_type {
        return content_value(param, media_type, raw);
    }

    match shape_of(&param.schema) {
        Shape::Primitive => coerce(raw, &param.schema),
        Shape::Array => build_array(split(raw, ','), &param.schema),
        Shape::Object => build_object(flat_pairs(raw, ',')?, &param.schema),
    }
}

fn query_value(param: &ParameterSpec, sources: &Sources<'_>) -> Option<Result<Value, String>> {
    let schema = &param.schema;
    let shape = shape_of(schema);

    if param.style == ParameterStyle::DeepObject {
        let prefix = format!("{}[", param.name);
        let pairs: Vec<(&str, &str)> = sources
            .query
            .iter()
            .filter_map(|(key, value)| {
                let prop = key.strip_prefix(&prefix)?.strip_suffix(']')?;
                Some((prop, value.as_str()))
            })
            .collect();
        if pairs.is_empty() {
            return None;
        }
        return Some(build_object(pairs, schema));
    }

    if shape == Shape::Object && param.explode && param.media_type.is_none() {
        // Exploded form objects spread their members over the query string
        let declared: Vec<&str> = schema.properties.iter().map(|(n, _)| n.as_str()).collect();
        let pairs: Vec<(&str, &str)> = sources
            .query
            .iter()
            .filter(|(key, _)| {
                if declared.is_empty() {
                    !sources.query_names.contains(&key.as_str())
                } else {
                    declared.contains(&key.as_str())
                }
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        return Some(build_object(pairs, schema));
    }

    let raw_values: Vec<&str> = sources
        .query
        .iter()
        .filter(|(key, _)| *key == param.name)
        .map(|(_, value)| value.as_str())
        .collect();
    let first = *raw_values.first()?;

    if first.is_empty() && !param.allow_empty_value {
        return Some(Err("empty value is not allowed".into()));
    }

    if let Some(media_type) = &param.media_type {
        return Some(content_value(param, media_type, first));
    }

    let value = match shape {
        Shape::Primitive => coerce(first, schema),
        Shape::Array if param.explode => build_array(raw_values, schema),
        Shape::Array => {
            let sep = match param.style {
                ParameterStyle::SpaceDelimited => ' ',
                ParameterStyle::PipeDelimited => '|',
                _ => ',',
            };
            build_array(split(first, sep), schema)
        }
        Shape::Object => flat_pairs(first, ',').and_then(|pairs| build_object(pairs, schema)),
    };
    Some(value)
}

/// Split on a separator; the empty string yields no items.
fn split(raw: &str, sep: char) -> Vec<&str> {
    if raw.is_empty() {
        Vec::new()
    } else {
        raw.split(sep).collect()
    }
}

/// `k=v<sep>k=v`.
fn key_value_pairs(raw: &str, sep: char) -> Result<Vec<(&str, &str)>, String> {
    split(raw, sep)
        .into_iter()
        .map(|pair| {
            pair.split_once('=')
                .ok_or_else(|| format!("expected 'key=value', found '{pair}'"))
        })
        .collect()
}

/// `k<sep>v<sep>k<sep>v`.
fn flat_pairs(raw: &str, sep: char) -> Result<Vec<(&str, &str)>, String> {
    let items = split(raw, sep);
    if items.len() % 2 != 0 {
        return Err("object value must have an even number of items".into());
    }
    Ok(items.chunks(2).map(|kv| (kv[0], kv[1])).collect())
}

fn build_array(items: Vec<&str>, schema: &Schema) -> Result<Value, String> {
    let item_schema = schema.item_schema();
    items
        .into_iter()
        .map(|raw| match item_schema {
            Some(item) => coerce(raw, item),
            None => Ok(Value::String(raw.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn build_object(pairs: Vec<(&str, &str)>, schema: &Schema) -> Result<Value, String> {
    let mut object = Map::new();
    for (key, raw) in pairs {
        let value = match schema.property(key).or_else(|| schema.additional_schema()) {
            Some(prop) => coerce(raw, prop).map_err(|e| format!("property '{key}': {e}"))?,
            None => Value::String(raw.to_string()),
        };
        object.insert(key.to_string(), value);
    }
    Ok(Value::Object(object))
}

/// Strictly convert a raw string to the schema's primitive type.
///
/// Multi-type schemas try integer, number, boolean, null, then string.
/// Schemas without a type keep the string.
pub fn coerce(raw: &str, schema: &Schema) -> Result<Value, String> {
    let types = schema.effective_types();
    if types.is_empty() {
        return Ok(Value::String(raw.to_string()));
    }

    const ORDER: [SchemaType; 5] = [
        SchemaType::Integer,
        SchemaType::Number,
        SchemaType::Boolean,
        SchemaType::Null,
        SchemaType::String,
    ];

    ORDER
        .iter()
        .filter(|t| types.contains(*t))
        .find_map(|t| coerce_primitive(raw, *t))
        .ok_or_else(|| {
            let expected: Vec<&str> = types.iter().map(SchemaType::as_str).collect();
            format!("'{raw}' is not a valid {}", expected.join(" or "))
        })
}

fn coerce_primitive(raw: &str, schema_type: SchemaType) -> Option<Value> {
    match schema_type {
        SchemaType::Integer => parse_integer(raw),
        SchemaType::Number => parse_integer(raw).or_else(|| parse_float(raw)),
        SchemaType::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        SchemaType::Null => matches!(raw, "" | "null").then_some(Value::Null),
        SchemaType::String => Some(Value::String(raw.to_string())),
        SchemaType::Array | SchemaType::Object => None,
    }
}

/// An optional `-` followed by ASCII digits. Values past `i64` fall back to
/// `u64`, then to an integral `f64`.
fn parse_integer(raw: &str) -> Option<Value> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(Value::from(u));
    }
    parse_float(raw)
}

fn parse_float(raw: &str) -> Option<Value> {
    if raw.starts_with('+') {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use serde_json::json;

    fn schema(types: &[SchemaType]) -> Arc<Schema> {
        Arc::new(Schema {
            types: types.to_vec(),
            ..Schema::default()
        })
    }

    fn array_of(item: SchemaType) -> Arc<Schema> {
        Arc::new(Schema {
            types: vec![SchemaType::Array],
            items: Some(schema(&[item])),
            ..Schema::default()
        })
    }

    fn object_schema() -> Arc<Schema> {
        Arc::new(Schema {
            types: vec![SchemaType::Object],
            properties: vec![
                ("role".into(), schema(&[SchemaType::String])),
                ("age".into(), schema(&[SchemaType::Integer])),
            ],
            ..Schema::default()
        })
    }

    fn param(name: &str, location: ParameterLocation, schema: Arc<Schema>) -> ParameterSpec {
        ParameterSpec {
            name: name.into(),
            location,
            required: location == ParameterLocation::Path,
            schema,
            style: location.default_style(),
            explode: location.default_style() == ParameterStyle::Form,
            allow_empty_value: false,
            media_type: None,
            deprecated: false,
        }
    }

    fn styled(mut p: ParameterSpec, style: ParameterStyle, explode: bool) -> ParameterSpec {
        p.style = style;
        p.explode = explode;
        p
    }

    fn operation(parameters: Vec<ParameterSpec>, body: Option<RequestBodySpec>) -> Operation {
        Operation {
            method: "POST".into(),
            path: "/things/{id}".into(),
            operation_id: Some("thing".into()),
            summary: None,
            parameters,
            request_body: body,
            security: Vec::new(),
            responses: Default::default(),
            deprecated: false,
        }
    }

    fn json_body(required: bool) -> RequestBodySpec {
        RequestBodySpec {
            required,
            content: vec![MediaTypeSpec {
                media_type: "application/json".into(),
                schema: Some(object_schema()),
            }],
        }
    }

    fn path(id: &str) -> Vec<(String, String)> {
        vec![("id".to_string(), id.to_string())]
    }

    fn deserialization_errors(errors: Vec<ValidationError>) -> Vec<DeserializeError> {
        errors
            .into_iter()
            .map(|e| match e {
                ValidationError::DeserializationFailed(d) => d,
                other => panic!("unexpected error {other:?}"),
            })
            .collect()
    }

    #[test]
    fn strict_primitive_coercion() {
        let int = schema(&[SchemaType::Integer]);
        assert_eq!(coerce("42", &int).unwrap(), json!(42));
        assert_eq!(coerce("-7", &int).unwrap(), json!(-7));
        assert!(coerce("4.2", &int).is_err());
        assert!(coerce("42abc", &int).is_err());
        assert!(coerce("", &int).is_err());
        assert!(coerce("+5", &int).is_err());
        assert!(coerce("-", &int).is_err());
        assert_eq!(coerce("18446744073709551615", &int).unwrap(), json!(u64::MAX));
        assert_eq!(coerce("100000000000000000000", &int).unwrap(), json!(1e20));
        assert!(coerce(&"9".repeat(400), &int).is_err());

        let num = schema(&[SchemaType::Number]);
        assert_eq!(coerce("4.5", &num).unwrap(), json!(4.5));
        assert_eq!(coerce("4", &num).unwrap(), json!(4));
        assert!(coerce("NaN", &num).is_err());
        assert!(coerce("inf", &num).is_err());
        assert!(coerce("four", &num).is_err());
        assert!(coerce("+4.5", &num).is_err());
        assert_eq!(coerce("18446744073709551615", &num).unwrap(), json!(u64::MAX));

        let boolean = schema(&[SchemaType::Boolean]);
        assert_eq!(coerce("true", &boolean).unwrap(), json!(true));
        assert!(coerce("1", &boolean).is_err());
        assert!(coerce("TRUE", &boolean).is_err());

        assert_eq!(coerce("abc", &Schema::any()).unwrap(), json!("abc"));
    }

    #[test]
    fn multi_type_coercion_order() {
        let multi = schema(&[SchemaType::String, SchemaType::Boolean, SchemaType::Integer]);
        assert_eq!(coerce("1", &multi).unwrap(), json!(1));
        assert_eq!(coerce("true", &multi).unwrap(), json!(true));
        assert_eq!(coerce("x", &multi).unwrap(), json!("x"));

        let nullable = schema(&[SchemaType::Integer, SchemaType::Null]);
        assert_eq!(coerce("", &nullable).unwrap(), Value::Null);
        assert_eq!(coerce("null", &nullable).unwrap(), Value::Null);
        let err = coerce("x", &nullable).unwrap_err();
        assert_eq!(err, "'x' is not a valid integer or null");
    }

    #[test]
    fn path_styles() {
        let ints = param("id", ParameterLocation::Path, array_of(SchemaType::Integer));
        assert_eq!(path_value(&ints, "1,2,3").unwrap(), json!([1, 2, 3]));

        let label = styled(ints.clone(), ParameterStyle::Label, false);
        assert_eq!(path_value(&label, ".1,2").unwrap(), json!([1, 2]));
        let label = styled(ints.clone(), ParameterStyle::Label, true);
        assert_eq!(path_value(&label, ".1.2").unwrap(), json!([1, 2]));
        assert!(path_value(&label, "1.2").is_err());

        let matrix = styled(ints.clone(), ParameterStyle::Matrix, false);
        assert_eq!(path_value(&matrix, ";id=1,2").unwrap(), json!([1, 2]));
        let matrix = styled(ints, ParameterStyle::Matrix, true);
        assert_eq!(path_value(&matrix, ";id=1;id=2").unwrap(), json!([1, 2]));
        assert!(path_value(&matrix, ";other=1").is_err());

        let scalar = styled(
            param("id", ParameterLocation::Path, schema(&[SchemaType::Integer])),
            ParameterStyle::Matrix,
            false,
        );
        assert_eq!(path_value(&scalar, ";id=5").unwrap(), json!(5));
    }

    #[test]
    fn object_styles() {
        let simple = param("id", ParameterLocation::Path, object_schema());
        assert_eq!(
            path_value(&simple, "role,admin,age,30").unwrap(),
            json!({"role": "admin", "age": 30})
        );
        let exploded = styled(simple.clone(), ParameterStyle::Simple, true);
        assert_eq!(
            path_value(&exploded, "role=admin,age=30").unwrap(),
            json!({"role": "admin", "age": 30})
        );
        let matrix = styled(simple.clone(), ParameterStyle::Matrix, true);
        assert_eq!(
            path_value(&matrix, ";role=admin;age=30").unwrap(),
            json!({"role": "admin", "age": 30})
        );
        assert!(path_value(&simple, "role,admin,age").is_err());
        assert!(path_value(&simple, "role,admin,age,old").is_err());
    }

    #[test]
    fn query_form_arrays() {
        let exploded = param("tag", ParameterLocation::Query, array_of(SchemaType::String));
        let request = RawRequest::new("GET", "/things/1?tag=a&tag=b");
        let op = operation(vec![exploded.clone()], None);
        let values = deserialize(&op, &request, &path("1")).unwrap();
        assert_eq!(values.query["tag"], json!(["a", "b"]));

        let flat = styled(exploded.clone(), ParameterStyle::Form, false);
        let request = RawRequest::new("GET", "/things/1?tag=a,b");
        let values = deserialize(&operation(vec![flat], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["tag"], json!(["a", "b"]));

        let piped = styled(exploded.clone(), ParameterStyle::PipeDelimited, false);
        let request = RawRequest::new("GET", "/things/1?tag=a|b");
        let values = deserialize(&operation(vec![piped], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["tag"], json!(["a", "b"]));

        let spaced = styled(exploded, ParameterStyle::SpaceDelimited, false);
        let request = RawRequest::new("GET", "/things/1?tag=a%20b");
        let values = deserialize(&operation(vec![spaced], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["tag"], json!(["a", "b"]));
    }

    #[test]
    fn query_objects() {
        let deep = styled(
            param("filter", ParameterLocation::Query, object_schema()),
            ParameterStyle::DeepObject,
            true,
        );
        let request = RawRequest::new("GET", "/things/1?filter%5Brole%5D=admin&filter[age]=30");
        let values = deserialize(&operation(vec![deep], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["filter"], json!({"role": "admin", "age": 30}));

        let form = param("filter", ParameterLocation::Query, object_schema());
        let request = RawRequest::new("GET", "/things/1?role=admin&age=30&other=x");
        let values = deserialize(&operation(vec![form], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["filter"], json!({"role": "admin", "age": 30}));
    }

    #[test]
    fn missing_and_default_parameters() {
        let mut limit = param("limit", ParameterLocation::Query, schema(&[SchemaType::Integer]));
        limit.schema = Arc::new(Schema {
            default: Some(json!(20)),
            ..Schema::of_type(SchemaType::Integer)
        });
        let mut token = param("X-Request-Id", ParameterLocation::Header, schema(&[SchemaType::String]));
        token.required = true;

        let op = operation(vec![limit, token], None);
        let errors = deserialize(&op, &RawRequest::new("GET", "/things/1"), &path("1")).unwrap_err();
        assert_eq!(
            deserialization_errors(errors),
            vec![DeserializeError::MissingParameter {
                name: "X-Request-Id".into(),
                location: ParameterLocation::Header,
            }]
        );

        let request = RawRequest::new("GET", "/things/1").header("x-request-id", "abc");
        let values = deserialize(&op, &request, &path("1")).unwrap();
        assert_eq!(values.query["limit"], json!(20));
        assert_eq!(values.headers["X-Request-Id"], json!("abc"));
    }

    #[test]
    fn empty_query_values() {
        let q = param("q", ParameterLocation::Query, schema(&[SchemaType::String]));
        let request = RawRequest::new("GET", "/things/1?q=");
        let errors = deserialize(&operation(vec![q.clone()], None), &request, &path("1")).unwrap_err();
        assert!(matches!(
            &deserialization_errors(errors)[0],
            DeserializeError::InvalidParameter { reason, .. } if reason == "empty value is not allowed"
        ));

        let mut allowed = q;
        allowed.allow_empty_value = true;
        let values = deserialize(&operation(vec![allowed], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["q"], json!(""));
    }

    #[test]
    fn invalid_parameters_are_all_collected() {
        let id = param("id", ParameterLocation::Path, schema(&[SchemaType::Integer]));
        let page = param("page", ParameterLocation::Query, schema(&[SchemaType::Integer]));
        let request = RawRequest::new("GET", "/things/abc?page=two");
        let errors = deserialize(&operation(vec![id, page], None), &request, &path("abc")).unwrap_err();
        let errors = deserialization_errors(errors);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field(), "id");
        assert_eq!(errors[1].field(), "page");
    }

    #[test]
    fn integer_query_parameters_at_the_edges() {
        let n = param("n", ParameterLocation::Query, schema(&[SchemaType::Integer]));
        let op = operation(vec![n], None);

        let request = RawRequest::new("GET", "/things/1?n=18446744073709551615");
        let values = deserialize(&op, &request, &path("1")).unwrap();
        assert_eq!(values.query["n"], json!(u64::MAX));

        let request = RawRequest::new("GET", "/things/1?n=%2B5");
        let errors = deserialization_errors(deserialize(&op, &request, &path("1")).unwrap_err());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), "n");
    }

    #[test]
    fn cookie_parameters() {
        let session = param("session", ParameterLocation::Cookie, schema(&[SchemaType::String]));
        let ids = param("ids", ParameterLocation::Cookie, array_of(SchemaType::Integer));
        let op = operation(vec![session, ids], None);
        let request = RawRequest::new("GET", "/things/1").header("cookie", "session=xyz; ids=1,2");
        let values = deserialize(&op, &request, &path("1")).unwrap();
        assert_eq!(values.cookies["session"], json!("xyz"));
        assert_eq!(values.cookies["ids"], json!([1, 2]));

        let request = RawRequest::new("GET", "/things/1")
            .header("cookie", "ids=1,2")
            .header("cookie", "session=xyz");
        let values = deserialize(&op, &request, &path("1")).unwrap();
        assert_eq!(values.cookies["ids"], json!([1, 2]));
        assert_eq!(values.cookies["session"], json!("xyz"));
    }

    #[test]
    fn reserved_headers_are_ignored() {
        let mut accept = param("Accept", ParameterLocation::Header, schema(&[SchemaType::String]));
        accept.required = true;
        let values = deserialize(&operation(vec![accept], None), &RawRequest::new("GET", "/"), &[]).unwrap();
        assert!(values.headers.is_empty());
    }

    #[test]
    fn content_parameters_are_parsed_as_json() {
        let mut filter = param("filter", ParameterLocation::Query, object_schema());
        filter.media_type = Some("application/json".into());
        let request = RawRequest::new("GET", "/things/1?filter=%7B%22age%22%3A3%7D");
        let values = deserialize(&operation(vec![filter], None), &request, &path("1")).unwrap();
        assert_eq!(values.query["filter"], json!({"age": 3}));
    }

    #[test]
    fn media_type_selection() {
        let body = RequestBodySpec {
            required: true,
            content: vec![
                MediaTypeSpec {
                    media_type: "application/json".into(),
                    schema: None,
                },
                MediaTypeSpec {
                    media_type: "text/*".into(),
                    schema: None,
                },
            ],
        };

        let pick = |ct: &str| select_media_type(&body, ct).map(|m| m.media_type.as_str());
        assert_eq!(pick("application/json"), Ok("application/json"));
        assert_eq!(pick("Application/JSON; charset=utf-8"), Ok("application/json"));
        assert_eq!(pick("text/plain"), Ok("text/*"));
        assert_eq!(
            pick("application/xml"),
            Err(ValidationError::MediaTypeNotAllowed {
                content_type: "application/xml".into(),
                allowed: vec!["application/json".into(), "text/*".into()],
            })
        );

        let any = RequestBodySpec {
            required: false,
            content: vec![MediaTypeSpec {
                media_type: "*/*".into(),
                schema: None,
            }],
        };
        assert!(select_media_type(&any, "image/png").is_ok());
    }

    #[test]
    fn json_body_is_parsed() {
        let op = operation(vec![], Some(json_body(true)));
        let request = RawRequest::new("POST", "/things/1").json(&json!({"role": "admin"}));
        let values = deserialize(&op, &request, &[]).unwrap();
        assert_eq!(values.body, Some(json!({"role": "admin"})));
        assert_eq!(values.media_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn malformed_json_body() {
        let op = operation(vec![], Some(json_body(true)));
        let request = RawRequest::new("POST", "/things/1")
            .header("content-type", "application/json")
            .body("{\"role\":");
        let errors = deserialization_errors(deserialize(&op, &request, &[]).unwrap_err());
        assert!(matches!(
            &errors[0],
            DeserializeError::MalformedBody { media_type, .. } if media_type == "application/json"
        ));
    }

    #[test]
    fn missing_required_body() {
        let op = operation(vec![], Some(json_body(true)));
        let errors = deserialization_errors(
            deserialize(&op, &RawRequest::new("POST", "/things/1"), &[]).unwrap_err(),
        );
        assert_eq!(errors, vec![DeserializeError::MissingBody]);

        let op = operation(vec![], Some(json_body(false)));
        let values = deserialize(&op, &RawRequest::new("POST", "/things/1"), &[]).unwrap();
        assert_eq!(values.body, None);
    }

    #[test]
    fn media_type_error_comes_alone() {
        let id = param("id", ParameterLocation::Path, schema(&[SchemaType::Integer]));
        let op = operation(vec![id], Some(json_body(true)));
        let request = RawRequest::new("POST", "/things/x")
            .header("content-type", "text/plain")
            .body("hello");
        let errors = deserialize(&op, &request, &path("x")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), "media_type_not_allowed");
    }

    #[test]
    fn body_without_content_type_is_octet_stream() {
        let op = operation(vec![], Some(json_body(true)));
        let request = RawRequest::new("POST", "/things/1").body("{}");
        let errors = deserialize(&op, &request, &[]).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MediaTypeNotAllowed {
                content_type: DEFAULT_MEDIA_TYPE.into(),
                allowed: vec!["application/json".into()],
            }]
        );
    }

    #[test]
    fn form_body_is_coerced_by_property_schemas() {
        let body = RequestBodySpec {
            required: true,
            content: vec![MediaTypeSpec {
                media_type: "application/x-www-form-urlencoded".into(),
                schema: Some(object_schema()),
            }],
        };
        let op = operation(vec![], Some(body));
        let request = RawRequest::new("POST", "/things/1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("role=admin+user&age=30&extra=1");
        let values = deserialize(&op, &request, &[]).unwrap();
        assert_eq!(
            values.body,
            Some(json!({"role": "admin user", "age": 30, "extra": "1"}))
        );
    }

    #[test]
    fn text_body_must_be_utf8() {
        let body = RequestBodySpec {
            required: true,
            content: vec![MediaTypeSpec {
                media_type: "text/plain".into(),
                schema: None,
            }],
        };
        let op = operation(vec![], Some(body));
        let request = RawRequest::new("POST", "/things/1")
            .header("content-type", "text/plain")
            .body(vec![0xff, 0xfe]);
        let errors = deserialization_errors(deserialize(&op, &request, &[]).unwrap_err());
        assert!(matches!(errors[0], DeserializeError::MalformedBody { .. }));
    }
}
