//! Field values and their canonical string form.
//!
//! Every raw field read from a record stream is a [`FieldValue`]. Before a
//! value reaches MinHash or HyperLogLog it is reduced to one canonical
//! string by [`normalize`]: strings are used as-is, anything else is
//! serialized as JSON with sorted keys, then the result is trimmed and
//! lower-cased.
//!
//! The canonical form decides the hash inputs, so it is stable byte for byte:
//!
//! | Variant | Canonical text |
//! |---------|----------------|
//! | `String("  Foo ")` | `foo` |
//! | `Number(3)` | `3` |
//! | `Number(0.5)` | `0.5` |
//! | `Float(NaN)` | `nan` |
//! | `Bool(true)` | `true` |
//! | `Null` | `null` |
//! | `Array([1, "a"])` | `[1, "a"]` |
//! | `Object({"b": 1, "a": 2})` | `{"a": 2, "b": 1}` |

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One table row: column name → raw value, in column order.
///
/// The order of the first record fixes the column order of a
/// [`TableSketch`](crate::table::TableSketch), so this is an ordered map.
pub type Record = IndexMap<String, FieldValue>;

/// A raw field value as decoded from an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    /// A float JSON numbers cannot hold: NaN or an infinity.
    Float(f64),
    String(String),
    Array(Vec<FieldValue>),
    Object(IndexMap<String, FieldValue>),
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => FieldValue::Number(n),
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        serde_json::Number::from_f64(f)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Float(f))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Reduce a value to the canonical string hashed by the sketches.
///
/// An empty result means "empty value" to the caller.
pub fn normalize(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => s.trim().to_lowercase(),
        other => canonical_json(other).trim().to_lowercase(),
    }
}

/// Serialize a value as JSON with sorted object keys and `", "` / `": "`
/// separators.
pub fn canonical_json(value: &FieldValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Null => out.push_str("null"),
        FieldValue::Bool(true) => out.push_str("true"),
        FieldValue::Bool(false) => out.push_str("false"),
        FieldValue::Number(n) => write_number(out, n),
        FieldValue::Float(f) => out.push_str(&format_float(*f)),
        FieldValue::String(s) => write_string(out, s),
        FieldValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        FieldValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &serde_json::Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
    } else if let Some(f) = n.as_f64() {
        out.push_str(&format_float(f));
    }
}

/// Shortest round-trip float text, switching to exponent notation when the
/// decimal exponent is below -4 or at least 16.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. `1.5e-7`.
    let sci = format!("{:e}", f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if !(-4..16).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exp.abs());
    }

    let plain = format!("{}", f);
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fv(v: serde_json::Value) -> FieldValue {
        FieldValue::from(v)
    }

    #[test]
    fn strings_are_trimmed_and_lowercased() {
        assert_eq!(normalize(&"  New York ".into()), "new york");
        assert_eq!(normalize(&"".into()), "");
        assert_eq!(normalize(&"   ".into()), "");
    }

    #[test]
    fn strings_are_not_quoted() {
        assert_eq!(normalize(&"\"quoted\"".into()), "\"quoted\"");
        assert_eq!(normalize(&"abc".into()), "abc");
    }

    #[test]
    fn scalars() {
        assert_eq!(normalize(&FieldValue::Null), "null");
        assert_eq!(normalize(&true.into()), "true");
        assert_eq!(normalize(&false.into()), "false");
        assert_eq!(normalize(&42i64.into()), "42");
        assert_eq!(normalize(&(-7i64).into()), "-7");
        assert_eq!(normalize(&0.5f64.into()), "0.5");
        assert_eq!(normalize(&3.0f64.into()), "3.0");
    }

    #[test]
    fn non_finite_floats() {
        assert_eq!(normalize(&f64::NAN.into()), "nan");
        assert_eq!(normalize(&f64::INFINITY.into()), "infinity");
        assert_eq!(normalize(&f64::NEG_INFINITY.into()), "-infinity");
        let v = FieldValue::Array(vec![f64::INFINITY.into(), 1.5f64.into()]);
        assert_eq!(canonical_json(&v), "[Infinity, 1.5]");
    }

    #[test]
    fn float_exponent_form() {
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(123456.789), "123456.789");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn object_keys_sorted_with_spaced_separators() {
        let v = fv(json!({"b": 1, "a": [true, null, "X"]}));
        assert_eq!(canonical_json(&v), r#"{"a": [true, null, "X"], "b": 1}"#);
        assert_eq!(normalize(&v), r#"{"a": [true, null, "x"], "b": 1}"#);
    }

    #[test]
    fn nested_objects_sorted_at_every_level() {
        let a = fv(json!({"z": {"y": 1, "x": 2}, "a": 0}));
        let b = fv(json!({"a": 0, "z": {"x": 2, "y": 1}}));
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a": 0, "z": {"x": 2, "y": 1}}"#);
    }

    #[test]
    fn non_ascii_escaped() {
        let v = fv(json!(["café", "😀"]));
        assert_eq!(canonical_json(&v), r#"["caf\u00e9", "\ud83d\ude00"]"#);
        assert_eq!(normalize(&"CAFÉ".into()), "café");
    }

    #[test]
    fn control_characters_escaped() {
        let v = fv(json!(["a\"b", "c\\d", "e\nf", "\u{1}"]));
        assert_eq!(
            canonical_json(&v),
            r#"["a\"b", "c\\d", "e\nf", "\u0001"]"#
        );
    }

    #[test]
    fn record_preserves_insertion_order() {
        let mut record = Record::new();
        record.insert("zeta".into(), "1".into());
        record.insert("alpha".into(), "2".into());
        let keys: Vec<&str> = record.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn json_object_order_survives_conversion() {
        let v: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        match FieldValue::from(v) {
            FieldValue::Object(map) => {
                let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
