//! Wire-string to number coercion.
//!
//! Parameters and `text/*` bodies arrive as strings. When the governing
//! schema's top-level `type` is `number` or `integer` the string is coerced
//! before evaluation so that `"42"` satisfies `type: integer`. Integers are
//! parsed through `i64`/`u64` so the full `int64` range round-trips exactly;
//! only then is `f64` attempted, preserving the `1` vs `1.0` distinction.
//! A string that does not parse is passed through untouched and the schema's
//! `type` keyword reports the failure.

use serde_json::{Number, Value};

/// True when the schema's top-level `type` names a numeric type. Accepts
/// both the scalar and the array form of `type`.
pub fn schema_wants_number(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "number" || t == "integer",
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|t| t == "number" || t == "integer")),
        _ => false,
    }
}

/// Parse `raw` as a JSON number if possible.
pub fn coerce_numeric(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(Value::Number(Number::from(u)));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Number::from_f64(f).map(Value::Number);
    }
    None
}

/// Coerce a wire string under `schema`; non-numeric schemas and unparsable
/// strings keep the string form.
pub fn coerce_value(raw: &str, schema: &Value) -> Value {
    if schema_wants_number(schema) {
        if let Some(number) = coerce_numeric(raw) {
            return number;
        }
    }
    Value::String(raw.to_string())
}

/// Apply the same coercion to an already-decoded scalar instance, used when
/// a `text/*` body decodes to a string but the body schema is numeric.
pub fn coerce_instance(instance: Value, schema: &Value) -> Value {
    match instance {
        Value::String(s) if schema_wants_number(schema) => {
            coerce_numeric(&s).unwrap_or(Value::String(s))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_coercion_is_exact_at_int64_bounds() {
        assert_eq!(coerce_numeric("9223372036854775807"), Some(json!(i64::MAX)));
        assert_eq!(coerce_numeric("-9223372036854775808"), Some(json!(i64::MIN)));
        // beyond i64, still exact through u64
        assert_eq!(
            coerce_numeric("18446744073709551615"),
            Some(json!(u64::MAX))
        );
    }

    #[test]
    fn test_float_keeps_fraction() {
        let coerced = coerce_numeric("1.5").unwrap();
        assert_eq!(coerced, json!(1.5));
        // "1" stays an integer, not 1.0
        assert!(coerce_numeric("1").unwrap().as_i64().is_some());
    }

    #[test]
    fn test_non_numeric_passes_through() {
        assert_eq!(coerce_numeric("abc"), None);
        let schema = json!({ "type": "integer" });
        assert_eq!(coerce_value("abc", &schema), json!("abc"));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("inf"), None);
    }

    #[test]
    fn test_schema_gate() {
        assert!(schema_wants_number(&json!({ "type": "number" })));
        assert!(schema_wants_number(&json!({ "type": ["integer", "null"] })));
        assert!(!schema_wants_number(&json!({ "type": "string" })));
        let schema = json!({ "type": "string" });
        assert_eq!(coerce_value("42", &schema), json!("42"));
    }
}
