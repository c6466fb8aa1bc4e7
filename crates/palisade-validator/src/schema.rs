//! Schema validation over resolved [`Schema`] trees.
//!
//! Collect-all: every violation is reported, depth-first, with object
//! properties visited in declaration order. Within one value a type
//! mismatch stops further checks of that value; siblings continue.

use std::collections::HashSet;
use std::fmt::Write;

use palisade_spec::{AdditionalProperties, Bound, Schema, SchemaType};
use serde_json::{Map, Value};

use crate::error::SchemaViolation;
use crate::formats::check_format;

/// Validate a value against a schema.
///
/// `location` names what is being validated (`body`, `query parameter
/// 'limit'`) and is copied into each violation.
pub fn validate(schema: &Schema, value: &Value, location: &str) -> Result<(), Vec<SchemaViolation>> {
    let violations = collect_violations(schema, value, location);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Every violation of `schema` by `value`, in deterministic order.
pub fn collect_violations(schema: &Schema, value: &Value, location: &str) -> Vec<SchemaViolation> {
    let mut walker = Walker {
        location,
        violations: Vec::new(),
    };
    walker.check(schema, value, &mut String::new());
    walker.violations
}

/// Whether the value satisfies the schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    collect_violations(schema, value, "").is_empty()
}

struct Walker<'l> {
    location: &'l str,
    violations: Vec<SchemaViolation>,
}

impl Walker<'_> {
    fn report(&mut self, path: &str, reason: impl Into<String>) {
        self.violations.push(SchemaViolation {
            location: self.location.to_string(),
            path: path.to_string(),
            reason: reason.into(),
        });
    }

    fn check(&mut self, schema: &Schema, value: &Value, path: &mut String) {
        let actual = SchemaType::of(value);
        if !schema.admits(actual) {
            let expected: Vec<&str> = schema.types.iter().map(SchemaType::as_str).collect();
            self.report(
                path,
                format!("expected {}, found {}", expected.join(" or "), describe(value)),
            );
            return;
        }

        if let Some(constant) = &schema.constant {
            if !values_equal(constant, value) {
                self.report(path, format!("must be equal to {constant}"));
            }
        }

        if let Some(options) = &schema.enumeration {
            if !options.iter().any(|o| values_equal(o, value)) {
                let listed: Vec<String> = options.iter().map(Value::to_string).collect();
                self.report(path, format!("must be one of: {}", listed.join(", ")));
            }
        }

        match value {
            Value::String(s) => self.check_string(schema, s, path),
            Value::Number(_) => self.check_number(schema, value, path),
            Value::Object(members) => self.check_object(schema, members, path),
            Value::Array(items) => self.check_array(schema, items, path),
            Value::Bool(_) | Value::Null => {}
        }

        if let Some(format) = &schema.format {
            if let Err(reason) = check_format(format, value) {
                self.report(path, reason);
            }
        }

        self.check_composition(schema, value, path);
    }

    fn check_string(&mut self, schema: &Schema, s: &str, path: &str) {
        let len = s.chars().count();
        if let Some(min) = schema.min_length {
            if len < min {
                self.report(path, format!("must be at least {min} characters long"));
            }
        }
        if let Some(max) = schema.max_length {
            if len > max {
                self.report(path, format!("must be at most {max} characters long"));
            }
        }
        if let Some(pattern) = &schema.pattern {
            if !pattern.is_match(s) {
                self.report(path, format!("does not match pattern '{}'", pattern.as_str()));
            }
        }
    }

    fn check_number(&mut self, schema: &Schema, value: &Value, path: &str) {
        let Some(n) = value.as_f64() else {
            return;
        };

        match schema.minimum {
            Some(Bound::Inclusive(min)) if n < min => {
                self.report(path, format!("must be >= {min}"));
            }
            Some(Bound::Exclusive(min)) if n <= min => {
                self.report(path, format!("must be > {min}"));
            }
            _ => {}
        }

        match schema.maximum {
            Some(Bound::Inclusive(max)) if n > max => {
                self.report(path, format!("must be <= {max}"));
            }
            Some(Bound::Exclusive(max)) if n >= max => {
                self.report(path, format!("must be < {max}"));
            }
            _ => {}
        }

        if let Some(divisor) = schema.multiple_of {
            let quotient = n / divisor;
            if (quotient - quotient.round()).abs() > 1e-9 {
                self.report(path, format!("must be a multiple of {divisor}"));
            }
        }
    }

    fn check_object(&mut self, schema: &Schema, members: &Map<String, Value>, path: &mut String) {
        for name in &schema.required {
            if members.contains_key(name) {
                continue;
            }
            // Request context: read-only properties are filled by the server
            if schema.property(name).is_some_and(|p| p.read_only) {
                continue;
            }
            let len = push_segment(path, name);
            self.report(path, format!("missing required property '{name}'"));
            path.truncate(len);
        }

        for (name, property) in &schema.properties {
            if let Some(member) = members.get(name) {
                let len = push_segment(path, name);
                self.check(property, member, path);
                path.truncate(len);
            }
        }

        for (name, member) in members {
            if schema.properties.iter().any(|(n, _)| n == name) {
                continue;
            }
            match &schema.additional_properties {
                AdditionalProperties::Allowed => {}
                AdditionalProperties::Forbidden => {
                    let len = push_segment(path, name);
                    self.report(path, format!("unknown property '{name}' is not allowed"));
                    path.truncate(len);
                }
                AdditionalProperties::Schema(extra) => {
                    let len = push_segment(path, name);
                    self.check(extra, member, path);
                    path.truncate(len);
                }
            }
        }

        if let Some(min) = schema.min_properties {
            if members.len() < min {
                self.report(path, format!("must have at least {min} properties"));
            }
        }
        if let Some(max) = schema.max_properties {
            if members.len() > max {
                self.report(path, format!("must have at most {max} properties"));
            }
        }
    }

    fn check_array(&mut self, schema: &Schema, items: &[Value], path: &mut String) {
        if let Some(min) = schema.min_items {
            if items.len() < min {
                self.report(path, format!("must have at least {min} items"));
            }
        }
        if let Some(max) = schema.max_items {
            if items.len() > max {
                self.report(path, format!("must have at most {max} items"));
            }
        }

        if schema.unique_items && has_duplicates(items) {
            self.report(path, "items must be unique");
        }

        if let Some(item_schema) = &schema.items {
            for (i, item) in items.iter().enumerate() {
                let len = push_segment(path, &i.to_string());
                self.check(item_schema, item, path);
                path.truncate(len);
            }
        }
    }

    fn check_composition(&mut self, schema: &Schema, value: &Value, path: &mut String) {
        for sub in &schema.all_of {
            self.check(sub, value, path);
        }

        if !schema.any_of.is_empty() && !schema.any_of.iter().any(|s| is_valid(s, value)) {
            self.report(path, "does not match any of the anyOf schemas");
        }

        if !schema.one_of.is_empty() {
            let matching = schema.one_of.iter().filter(|s| is_valid(s, value)).count();
            if matching != 1 {
                self.report(
                    path,
                    format!("matches {matching} of the oneOf schemas, expected exactly one"),
                );
            }
        }

        if let Some(not) = &schema.not {
            if is_valid(not, value) {
                self.report(path, "must not match the 'not' schema");
            }
        }
    }
}

/// Append an escaped JSON pointer segment, returning the previous length.
fn push_segment(path: &mut String, segment: &str) -> usize {
    let len = path.len();
    path.push('/');
    path.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    len
}

fn describe(value: &Value) -> &'static str {
    match SchemaType::of(value) {
        SchemaType::Integer => "integer",
        SchemaType::Number => "number",
        other => other.as_str(),
    }
}

/// JSON equality where `1` and `1.0` are the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Linear duplicate check over canonical keys.
fn has_duplicates(items: &[Value]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(canonical_key(item)))
}

/// Two values get the same key exactly when [`values_equal`] holds for them:
/// object members are sorted by name and integral numbers lose their fraction.
fn canonical_key(value: &Value) -> String {
    let mut key = String::new();
    write_key(value, &mut key);
    key
}

fn write_key(value: &Value, out: &mut String) {
    match value {
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_quoted(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_key(item, out);
            }
            out.push(']');
        }
        Value::Object(members) => {
            let mut sorted: Vec<_> = members.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, member)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_quoted(name, out);
                out.push(':');
                write_key(member, out);
            }
            out.push('}');
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

// Mirrors values_equal: i64 when exact, otherwise compared as f64.
fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
        return;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => {
            let _ = write!(out, "{}", f as i64);
        }
        Some(f) => {
            let _ = write!(out, "{f:?}");
        }
        None => out.push_str(&n.to_string()),
    }
}
