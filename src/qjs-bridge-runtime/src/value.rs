use rquickjs::{Ctx, Exception, Function, Value};

const BIGINT_REPLACER: &str = "(key, value) => typeof value === 'bigint' ? value.toString() : value";

use crate::engine::EngineValue;
use crate::error::JsError;

/// A JavaScript value copied out of the engine.
///
/// Values are snapshots: they own their data and stay valid after the
/// runtime that produced them is gone. Objects and arrays are captured through
/// `JSON.stringify`, so functions and symbols inside them are dropped and
/// BigInts become decimal strings.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number that fits a 32-bit integer.
    Int(i32),
    /// Any other number.
    Float(f64),
    /// A `BigInt` that fits 64 bits.
    BigInt(i64),
    /// A string.
    String(String),
    /// The contents of a `Uint8Array` or `ArrayBuffer`, or compiled bytecode.
    Bytes(Vec<u8>),
    /// A plain object or array.
    Json(serde_json::Value),
    /// An `Error` instance returned (not thrown) by the script.
    Error(JsError),
    /// A function.
    Function,
    /// Anything else, tagged with its type name.
    Other(String),
}

impl JsValue {
    /// Copy `value` out of the engine.
    pub(crate) fn snapshot<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Self> {
        if value.is_undefined() {
            return Ok(Self::Undefined);
        }
        if value.is_null() {
            return Ok(Self::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(Self::Bool(b));
        }
        if let Some(i) = value.as_int() {
            return Ok(Self::Int(i));
        }
        if let Some(f) = value.as_float() {
            return Ok(Self::Float(f));
        }
        if let Some(s) = value.as_string() {
            return Ok(Self::String(s.to_string()?));
        }
        if let Some(big) = value.as_big_int() {
            return match big.clone().to_i64() {
                Ok(i) => Ok(Self::BigInt(i)),
                Err(_) => {
                    let _ = ctx.catch();
                    Ok(Self::Other("bigint".to_string()))
                }
            };
        }
        if let Some(exception) = value.as_exception() {
            return Ok(Self::Error(JsError::from_exception(exception)));
        }
        if value.is_function() {
            return Ok(Self::Function);
        }
        if let Some(obj) = value.as_object() {
            if let Some(array) = obj.as_typed_array::<u8>()
                && let Some(bytes) = array.as_bytes()
            {
                return Ok(Self::Bytes(bytes.to_vec()));
            }
            if let Some(buffer) = obj.as_array_buffer()
                && let Some(bytes) = buffer.as_bytes()
            {
                return Ok(Self::Bytes(bytes.to_vec()));
            }
            return Self::snapshot_object(ctx, value);
        }
        Ok(Self::Other(format!("{:?}", value.type_of())))
    }

    /// Objects go through `JSON.stringify` with BigInts written as strings.
    ///
    /// A stringify failure (a cycle, a throwing `toJSON`) does not fail the
    /// call: the exception is cleared and the object is kept as `Other("object")`.
    fn snapshot_object<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Self> {
        let replacer: Function = ctx.eval(BIGINT_REPLACER)?;
        let json = match ctx.json_stringify_replacer(value, replacer) {
            Ok(Some(json)) => json.to_string()?,
            Ok(None) => return Ok(Self::Undefined),
            Err(rquickjs::Error::Exception) => {
                let reason = ctx.catch();
                tracing::debug!(?reason, "object has no JSON form");
                return Ok(Self::Other("object".to_string()));
            }
            Err(e) => return Err(e),
        };
        serde_json::from_str(&json)
            .map(Self::Json)
            .map_err(|e| Exception::throw_internal(ctx, &e.to_string()))
    }

    /// The value as JSON, if it has a JSON representation.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        match self {
            Self::Null => Some(Json::Null),
            Self::Bool(b) => Some(Json::Bool(*b)),
            Self::Int(i) => Some(Json::from(*i)),
            Self::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number),
            Self::BigInt(i) => Some(Json::from(*i)),
            Self::String(s) => Some(Json::String(s.clone())),
            Self::Bytes(bytes) => Some(Json::from(bytes.clone())),
            Self::Json(json) => Some(json.clone()),
            Self::Error(error) => serde_json::to_value(error).ok(),
            Self::Undefined | Self::Function | Self::Other(_) => None,
        }
    }
}

impl EngineValue for JsValue {
    fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    fn exception(&self) -> JsError {
        match self {
            Self::Error(error) => error.clone(),
            other => JsError::new("Error", other.as_string()),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::String(s) => s.as_bytes(),
            _ => &[],
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            Self::Bool(b) => i64::from(*b),
            Self::Int(i) => i64::from(*i),
            Self::Float(f) => float_to_i64(*f),
            Self::BigInt(i) => *i,
            Self::String(s) => s.trim().parse::<f64>().map(float_to_i64).unwrap_or(0),
            Self::Json(serde_json::Value::Number(n)) => {
                n.as_i64().unwrap_or_else(|| n.as_f64().map(float_to_i64).unwrap_or(0))
            }
            _ => 0,
        }
    }

    fn as_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_number(*f),
            Self::BigInt(i) => i.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(bytes) => bytes
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Json(json) => json_to_string(json, true),
            Self::Error(error) => error.to_string(),
            Self::Function => "function".to_string(),
            Self::Other(kind) => format!("[{kind}]"),
        }
    }
}

fn float_to_i64(f: f64) -> i64 {
    if f.is_nan() {
        0
    } else {
        // `as` saturates at the i64 bounds
        f.trunc() as i64
    }
}

/// Format a number the way JavaScript's `Number.prototype.toString` does.
fn format_number(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    let abs = f.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{f:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    if f.fract() == 0.0 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

fn json_to_string(json: &serde_json::Value, top_level: bool) -> String {
    use serde_json::Value as Json;
    match json {
        Json::Null if top_level => "null".to_string(),
        Json::Null => String::new(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.as_f64().map(format_number).unwrap_or_default(),
        Json::String(s) => s.clone(),
        Json::Array(items) => items
            .iter()
            .map(|item| json_to_string(item, false))
            .collect::<Vec<_>>()
            .join(","),
        Json::Object(_) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(JsValue::Float(1640995200000.0).as_string(), "1640995200000");
        assert_eq!(JsValue::Float(0.5).as_string(), "0.5");
        assert_eq!(JsValue::Float(f64::NAN).as_string(), "NaN");
        assert_eq!(JsValue::Float(f64::NEG_INFINITY).as_string(), "-Infinity");
        assert_eq!(JsValue::Float(1e21).as_string(), "1e+21");
        assert_eq!(JsValue::Float(-0.0).as_string(), "0");
    }

    #[test]
    fn int64_conversion_truncates_and_saturates() {
        assert_eq!(JsValue::Float(1640995200000.9).as_i64(), 1640995200000);
        assert_eq!(JsValue::Float(-2.7).as_i64(), -2);
        assert_eq!(JsValue::Float(f64::NAN).as_i64(), 0);
        assert_eq!(JsValue::Float(f64::INFINITY).as_i64(), i64::MAX);
        assert_eq!(JsValue::String(" 42 ".into()).as_i64(), 42);
        assert_eq!(JsValue::Bool(true).as_i64(), 1);
        assert_eq!(JsValue::Undefined.as_i64(), 0);
    }

    #[test]
    fn objects_and_arrays_stringify_like_javascript() {
        assert_eq!(JsValue::Json(json!({"a": 1})).as_string(), "[object Object]");
        assert_eq!(JsValue::Json(json!([1, null, "x", [2, 3]])).as_string(), "1,,x,2,3");
        assert_eq!(JsValue::Bytes(vec![1, 2, 3]).as_string(), "1,2,3");
    }

    #[test]
    fn bytes_are_exposed_for_buffers_and_strings() {
        assert_eq!(JsValue::Bytes(vec![9, 8]).as_bytes(), &[9, 8]);
        assert_eq!(JsValue::String("hi".into()).as_bytes(), b"hi");
        assert!(JsValue::Int(3).as_bytes().is_empty());
    }

    #[test]
    fn only_error_values_are_errors() {
        let error = JsValue::Error(JsError::new("RangeError", "too big"));
        assert!(error.is_error());
        assert_eq!(error.exception().name, "RangeError");
        assert!(!JsValue::Json(json!({"name": "Error"})).is_error());
    }

    #[test]
    fn json_view_skips_non_data_values() {
        assert_eq!(JsValue::Int(7).to_json(), Some(json!(7)));
        assert_eq!(JsValue::Function.to_json(), None);
        assert_eq!(JsValue::Undefined.to_json(), None);
    }
}
