//! JSON helpers shared by the provider parsers.

use serde_json::Value;

/// Parse a JSON value (string or number) as `f64`.
///
/// Providers encode numbers either as strings (`"1.234"`) or natively.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a named field on a JSON object as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key)).filter(|x| x.is_finite())
}

/// Named string field.
#[inline]
pub fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_strings_and_numbers() {
        let v = json!({"a": "1.5", "b": -2.25, "c": "abc", "d": null});
        assert_eq!(parse_f64_field(&v, "a"), Some(1.5));
        assert_eq!(parse_f64_field(&v, "b"), Some(-2.25));
        assert_eq!(parse_f64_field(&v, "c"), None);
        assert_eq!(parse_f64_field(&v, "d"), None);
        assert_eq!(parse_f64_field(&v, "missing"), None);
    }

    #[test]
    fn rejects_non_finite() {
        let v = json!({"x": "inf", "y": "NaN"});
        assert_eq!(parse_f64_field(&v, "x"), None);
        assert_eq!(parse_f64_field(&v, "y"), None);
    }
}
