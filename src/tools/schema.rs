//! Tool-argument schema declarations and validation (spec §4.H): "all
//! values are validated against a declared schema before the tool body
//! runs." Argument types are limited to strings, integers, floats,
//! booleans, and JSON-encoded strings (for nested structures).

use serde_json::Value;

use crate::core::{CoreError, InputError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Float,
    Boolean,
    /// A JSON-encoded string carrying a nested structure.
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

fn matches_kind(value: &Value, kind: ArgKind) -> bool {
    match kind {
        ArgKind::String => value.is_string(),
        ArgKind::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        ArgKind::Float => value.is_number(),
        ArgKind::Boolean => value.is_boolean(),
        ArgKind::Json => value.is_string(),
    }
}

/// Validates `args` (a JSON object) against `schema`, failing with
/// `SchemaViolation` on a missing required field or a type mismatch.
pub fn validate_args(schema: &[ArgSpec], args: &Value) -> Result<()> {
    let obj = args.as_object().ok_or_else(|| {
        CoreError::Input(InputError::SchemaViolation("arguments must be a JSON object".into()))
    })?;

    for spec in schema {
        match obj.get(spec.name) {
            Some(value) if !value.is_null() => {
                if !matches_kind(value, spec.kind) {
                    return Err(CoreError::Input(InputError::SchemaViolation(format!(
                        "argument '{}' has the wrong type (expected {:?})",
                        spec.name, spec.kind
                    ))));
                }
            }
            _ if spec.required => {
                return Err(CoreError::Input(InputError::SchemaViolation(format!(
                    "missing required argument '{}'",
                    spec.name
                ))));
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub fn get_str_required(args: &Value, key: &str) -> Result<String> {
    get_str(args, key)
        .map(str::to_string)
        .ok_or_else(|| CoreError::Input(InputError::SchemaViolation(format!("missing '{key}'"))))
}

pub fn get_f64(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub fn get_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub fn get_json<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    get_str(args, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &[ArgSpec] = &[
        ArgSpec { name: "text", kind: ArgKind::String, required: true },
        ArgSpec { name: "depth", kind: ArgKind::Integer, required: false },
    ];

    #[test]
    fn accepts_valid_args() {
        assert!(validate_args(SCHEMA, &json!({"text": "hi", "depth": 2})).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        assert!(validate_args(SCHEMA, &json!({"depth": 2})).is_err());
    }

    #[test]
    fn rejects_wrong_type() {
        assert!(validate_args(SCHEMA, &json!({"text": 5})).is_err());
    }

    #[test]
    fn allows_omitted_optional() {
        assert!(validate_args(SCHEMA, &json!({"text": "hi"})).is_ok());
    }
}
