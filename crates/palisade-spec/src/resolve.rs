//! `$ref` resolution pre-pass.
//!
//! Local references are followed once at load time and turned into shared
//! links, so an undefined or cyclic reference fails the load instead of
//! surfacing in the middle of a request.

use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::error::SpecParseError;
use crate::schema::{AdditionalProperties, Bound, Pattern, Schema, SchemaType};

pub(crate) struct Resolver<'a> {
    root: &'a Value,
    /// Schemas already compiled, keyed by the reference that named them.
    compiled: HashMap<String, Arc<Schema>>,
    /// References currently being compiled, innermost last.
    in_progress: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self {
            root,
            compiled: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Look up a local reference (`#/json/pointer`) in the document.
    pub(crate) fn lookup(&self, reference: &str, location: &str) -> Result<&'a Value, SpecParseError> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(SpecParseError::RemoteRef {
                reference: reference.to_string(),
                location: location.to_string(),
            });
        };

        let unresolved = || SpecParseError::UnresolvedRef {
            reference: reference.to_string(),
            location: location.to_string(),
        };

        let pointer = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|_| unresolved())?;

        self.root.pointer(&pointer).ok_or_else(unresolved)
    }

    /// Follow a `$ref` chain on a non-schema object (parameter, request
    /// body, response, security scheme, path item).
    pub(crate) fn follow(&self, value: &'a Value, location: &str) -> Result<&'a Value, SpecParseError> {
        let mut current = value;
        let mut seen: Vec<&str> = Vec::new();

        while let Some(reference) = ref_of(current) {
            if seen.contains(&reference) {
                return Err(SpecParseError::CyclicRef {
                    reference: reference.to_string(),
                    location: location.to_string(),
                });
            }
            seen.push(reference);
            current = self.lookup(reference, location)?;
        }

        Ok(current)
    }

    /// Resolve and compile a schema.
    pub(crate) fn schema(&mut self, value: &'a Value, location: &str) -> Result<Arc<Schema>, SpecParseError> {
        match ref_of(value) {
            Some(reference) => self.schema_ref(reference, location),
            None => self.compile(value, location).map(Arc::new),
        }
    }

    /// Resolve and compile the schema a reference points at.
    pub(crate) fn schema_ref(&mut self, reference: &str, location: &str) -> Result<Arc<Schema>, SpecParseError> {
        if let Some(done) = self.compiled.get(reference) {
            return Ok(Arc::clone(done));
        }

        if self.in_progress.iter().any(|r| r == reference) {
            return Err(SpecParseError::CyclicRef {
                reference: reference.to_string(),
                location: location.to_string(),
            });
        }

        let target = self.lookup(reference, location)?;

        self.in_progress.push(reference.to_string());
        let result = self.schema(target, reference);
        self.in_progress.pop();

        let schema = result?;
        self.compiled
            .insert(reference.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn compile(&mut self, value: &'a Value, location: &str) -> Result<Schema, SpecParseError> {
        let obj = match value {
            Value::Bool(true) => return Ok(Schema::any()),
            Value::Bool(false) => return Ok(Schema::nothing()),
            Value::Object(obj) => obj,
            _ => {
                return Err(SpecParseError::invalid(
                    location,
                    "schema must be an object or a boolean",
                ))
            }
        };

        let mut schema = Schema {
            types: parse_types(obj, location)?,
            format: str_field(obj, "format").map(str::to_string),
            constant: obj.get("const").cloned(),
            default: obj.get("default").cloned(),
            min_properties: usize_field(obj, "minProperties", location)?,
            max_properties: usize_field(obj, "maxProperties", location)?,
            min_items: usize_field(obj, "minItems", location)?,
            max_items: usize_field(obj, "maxItems", location)?,
            unique_items: bool_field(obj, "uniqueItems"),
            min_length: usize_field(obj, "minLength", location)?,
            max_length: usize_field(obj, "maxLength", location)?,
            minimum: parse_bound(obj, "minimum", "exclusiveMinimum", location)?,
            maximum: parse_bound(obj, "maximum", "exclusiveMaximum", location)?,
            multiple_of: f64_field(obj, "multipleOf", location)?,
            read_only: bool_field(obj, "readOnly"),
            write_only: bool_field(obj, "writeOnly"),
            ..Schema::default()
        };

        if let Some(m) = schema.multiple_of {
            if m <= 0.0 {
                return Err(SpecParseError::invalid(
                    location,
                    "multipleOf must be greater than zero",
                ));
            }
        }

        // 3.0 `nullable` widens an explicit type list.
        if bool_field(obj, "nullable")
            && !schema.types.is_empty()
            && !schema.types.contains(&SchemaType::Null)
        {
            schema.types.push(SchemaType::Null);
        }

        if let Some(values) = obj.get("enum") {
            let values = values.as_array().ok_or_else(|| {
                SpecParseError::invalid(format!("{location}.enum"), "enum must be an array")
            })?;
            schema.enumeration = Some(values.clone());
        }

        if let Some(pattern) = str_field(obj, "pattern") {
            let compiled = Pattern::new(pattern).map_err(|e| {
                SpecParseError::invalid(
                    format!("{location}.pattern"),
                    format!("invalid regular expression '{}': {}", pattern, e),
                )
            })?;
            schema.pattern = Some(compiled);
        }

        if let Some(required) = obj.get("required") {
            let names = required.as_array().ok_or_else(|| {
                SpecParseError::invalid(
                    format!("{location}.required"),
                    "required must be an array of property names",
                )
            })?;
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    SpecParseError::invalid(
                        format!("{location}.required"),
                        "required must be an array of property names",
                    )
                })?;
                schema.required.push(name.to_string());
            }
        }

        if let Some(properties) = obj.get("properties") {
            let properties = properties.as_object().ok_or_else(|| {
                SpecParseError::invalid(
                    format!("{location}.properties"),
                    "properties must be an object",
                )
            })?;
            for (name, sub) in properties {
                let sub = self.schema(sub, &format!("{location}.properties.{name}"))?;
                schema.properties.push((name.clone(), sub));
            }
        }

        schema.additional_properties = match obj.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allowed,
            Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
            Some(sub) => AdditionalProperties::Schema(
                self.schema(sub, &format!("{location}.additionalProperties"))?,
            ),
        };

        if let Some(items) = obj.get("items") {
            if items.is_array() {
                return Err(SpecParseError::invalid(
                    format!("{location}.items"),
                    "tuple-form items are not supported",
                ));
            }
            schema.items = Some(self.schema(items, &format!("{location}.items"))?);
        }

        schema.all_of = self.schema_list(obj, "allOf", location)?;
        schema.any_of = self.schema_list(obj, "anyOf", location)?;
        schema.one_of = self.schema_list(obj, "oneOf", location)?;

        if let Some(not) = obj.get("not") {
            schema.not = Some(self.schema(not, &format!("{location}.not"))?);
        }

        Ok(schema)
    }

    fn schema_list(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        location: &str,
    ) -> Result<Vec<Arc<Schema>>, SpecParseError> {
        let Some(list) = obj.get(key) else {
            return Ok(Vec::new());
        };

        let list = list.as_array().ok_or_else(|| {
            SpecParseError::invalid(format!("{location}.{key}"), format!("{key} must be an array"))
        })?;

        list.iter()
            .enumerate()
            .map(|(i, sub)| self.schema(sub, &format!("{location}.{key}[{i}]")))
            .collect()
    }
}

/// The `$ref` string of an object, if it has one.
pub(crate) fn ref_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$ref")?.as_str()
}

fn str_field<'v>(obj: &'v Map<String, Value>, key: &str) -> Option<&'v str> {
    obj.get(key).and_then(Value::as_str)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn usize_field(
    obj: &Map<String, Value>,
    key: &str,
    location: &str,
) -> Result<Option<usize>, SpecParseError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                SpecParseError::invalid(
                    format!("{location}.{key}"),
                    format!("{key} must be a non-negative integer"),
                )
            }),
    }
}

fn f64_field(
    obj: &Map<String, Value>,
    key: &str,
    location: &str,
) -> Result<Option<f64>, SpecParseError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            SpecParseError::invalid(format!("{location}.{key}"), format!("{key} must be a number"))
        }),
    }
}

/// Read a bound in either the 3.0 (boolean exclusive flag) or the 3.1
/// (numeric exclusive bound) form.
fn parse_bound(
    obj: &Map<String, Value>,
    inclusive_key: &str,
    exclusive_key: &str,
    location: &str,
) -> Result<Option<Bound>, SpecParseError> {
    let inclusive = f64_field(obj, inclusive_key, location)?;

    match obj.get(exclusive_key) {
        Some(Value::Bool(true)) => match inclusive {
            Some(v) => Ok(Some(Bound::Exclusive(v))),
            None => Err(SpecParseError::invalid(
                format!("{location}.{exclusive_key}"),
                format!("{exclusive_key} requires {inclusive_key}"),
            )),
        },
        Some(Value::Bool(false)) | None => Ok(inclusive.map(Bound::Inclusive)),
        Some(v) => match v.as_f64() {
            Some(limit) => Ok(Some(Bound::Exclusive(limit))),
            None => Err(SpecParseError::invalid(
                format!("{location}.{exclusive_key}"),
                format!("{exclusive_key} must be a boolean or a number"),
            )),
        },
    }
}

fn parse_types(obj: &Map<String, Value>, location: &str) -> Result<Vec<SchemaType>, SpecParseError> {
    let unknown = |t: &str| {
        SpecParseError::invalid(format!("{location}.type"), format!("unknown type '{}'", t))
    };

    match obj.get("type") {
        None => Ok(Vec::new()),
        Some(Value::String(t)) => SchemaType::parse(t)
            .map(|t| vec![t])
            .ok_or_else(|| unknown(t)),
        Some(Value::Array(list)) => {
            let mut types = Vec::with_capacity(list.len());
            for t in list {
                let name = t.as_str().ok_or_else(|| unknown(&t.to_string()))?;
                types.push(SchemaType::parse(name).ok_or_else(|| unknown(name))?);
            }
            Ok(types)
        }
        Some(other) => Err(unknown(&other.to_string())),
    }
}
