//! Resolved JSON-Schema-like type descriptions.
//!
//! Every `$ref` has already been replaced by a shared link by the time a
//! [`Schema`] exists, so validation never looks anything up by name.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A JSON type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    /// Parse an OpenAPI `type` keyword value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    /// The type tag describing a concrete JSON value.
    ///
    /// Numbers without a fractional part report as `Integer`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                    Self::Integer
                } else {
                    Self::Number
                }
            }
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for object members not listed in `properties`.
#[derive(Debug, Clone, Default)]
pub enum AdditionalProperties {
    #[default]
    Allowed,
    Forbidden,
    Schema(Arc<Schema>),
}

/// A numeric bound (`minimum`/`maximum` and their exclusive forms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Inclusive(f64),
    Exclusive(f64),
}

impl Bound {
    pub fn limit(&self) -> f64 {
        match self {
            Bound::Inclusive(v) | Bound::Exclusive(v) => *v,
        }
    }
}

/// A `pattern` compiled once at load time.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: regex_lite::Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: regex_lite::Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// ECMA-262 semantics: the pattern is not implicitly anchored.
    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

/// A resolved schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Accepted types; empty means any type.
    pub types: Vec<SchemaType>,
    pub format: Option<String>,
    pub enumeration: Option<Vec<Value>>,
    pub constant: Option<Value>,
    pub default: Option<Value>,

    /// Object members in declaration order.
    pub properties: Vec<(String, Arc<Schema>)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,

    pub items: Option<Arc<Schema>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,

    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,

    pub minimum: Option<Bound>,
    pub maximum: Option<Bound>,
    pub multiple_of: Option<f64>,

    pub all_of: Vec<Arc<Schema>>,
    pub any_of: Vec<Arc<Schema>>,
    pub one_of: Vec<Arc<Schema>>,
    pub not: Option<Arc<Schema>>,

    pub read_only: bool,
    pub write_only: bool,
}

impl Schema {
    /// The schema that accepts every value (`{}` or `true`).
    pub fn any() -> Self {
        Self::default()
    }

    /// The schema that accepts no value (`false`).
    pub fn nothing() -> Self {
        Self {
            not: Some(Arc::new(Self::any())),
            ..Self::default()
        }
    }

    /// A plain schema of a single type.
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            types: vec![schema_type],
            ..Self::default()
        }
    }

    /// Whether the `type` keyword admits this type tag.
    ///
    /// `integer` values are admitted by `number` schemas.
    pub fn admits(&self, actual: SchemaType) -> bool {
        self.types.is_empty()
            || self.types.contains(&actual)
            || (actual == SchemaType::Integer && self.types.contains(&SchemaType::Number))
    }

    /// Types declared here or, when absent, by the composed subschemas.
    ///
    /// Used by deserializers that need to know what shape a raw string
    /// should take before any validation happens.
    pub fn effective_types(&self) -> Vec<SchemaType> {
        if !self.types.is_empty() {
            return self.types.clone();
        }
        let mut types = Vec::new();
        for sub in self.all_of.iter().chain(&self.any_of).chain(&self.one_of) {
            for t in sub.effective_types() {
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        types
    }

    /// Look up a declared property, searching `allOf` members as well.
    pub fn property(&self, name: &str) -> Option<&Arc<Schema>> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .or_else(|| self.all_of.iter().find_map(|s| s.property(name)))
    }

    /// The item schema, searching `allOf` members as well.
    pub fn item_schema(&self) -> Option<&Arc<Schema>> {
        self.items
            .as_ref()
            .or_else(|| self.all_of.iter().find_map(|s| s.item_schema()))
    }

    /// Schema for an object member that is not a declared property.
    pub fn additional_schema(&self) -> Option<&Arc<Schema>> {
        match &self.additional_properties {
            AdditionalProperties::Schema(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.types.is_empty() || self.types.contains(&SchemaType::Null)
    }
}
