//! Runtime values of the expression language and the casting rules between
//! them.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static INTEGER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d+$").ok());
static DECIMAL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[\d.]+$").ok());

fn matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|regex| regex.is_match(text))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Parameter and return types functions declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Boolean,
    String,
    Number,
    Any,
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprType::Boolean => "boolean",
            ExprType::String => "string",
            ExprType::Number => "number",
            ExprType::Any => "any",
        })
    }
}

impl ExprValue {
    /// Primitive JSON values map onto expression values; arrays and objects
    /// do not.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ExprValue::Null),
            Value::Bool(flag) => Some(ExprValue::Bool(*flag)),
            Value::Number(number) => number.as_f64().map(ExprValue::Number),
            Value::String(text) => Some(ExprValue::String(text.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExprValue::Null => Value::Null,
            ExprValue::Bool(flag) => Value::Bool(*flag),
            ExprValue::Number(number) if is_integral(*number) => Value::from(*number as i64),
            ExprValue::Number(number) => {
                serde_json::Number::from_f64(*number).map_or(Value::Null, Value::Number)
            }
            ExprValue::String(text) => Value::String(text.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ExprValue::Null)
    }

    /// `null`, or the literal string `"null"` that form data often carries
    /// in its place.
    fn is_null_like(&self) -> bool {
        match self {
            ExprValue::Null => true,
            ExprValue::String(text) => text == "null",
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExprValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExprValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExprValue::String(text) => Some(text),
            _ => None,
        }
    }

    /// Coerces the value to `to`, returning a message describing the
    /// mismatch when it cannot be coerced.
    pub fn cast(self, to: ExprType) -> Result<ExprValue, String> {
        match to {
            ExprType::Any => Ok(self),
            ExprType::Boolean => self.to_boolean(),
            ExprType::String => Ok(self.to_string_value()),
            ExprType::Number => self.to_number(),
        }
    }

    fn to_boolean(self) -> Result<ExprValue, String> {
        if self.is_null_like() {
            return Ok(ExprValue::Null);
        }
        match &self {
            ExprValue::Bool(_) => Ok(self),
            ExprValue::String(text) if text == "true" || text == "1" => Ok(ExprValue::Bool(true)),
            ExprValue::String(text) if text == "false" || text == "0" => {
                Ok(ExprValue::Bool(false))
            }
            ExprValue::Number(number) if *number == 1.0 => Ok(ExprValue::Bool(true)),
            ExprValue::Number(number) if *number == 0.0 => Ok(ExprValue::Bool(false)),
            _ => Err(self.mismatch(ExprType::Boolean)),
        }
    }

    fn to_string_value(self) -> ExprValue {
        match self {
            ExprValue::Bool(flag) => ExprValue::String(flag.to_string()),
            ExprValue::Number(number) => ExprValue::String(format_number(number)),
            other => other,
        }
    }

    fn to_number(self) -> Result<ExprValue, String> {
        if self.is_null_like() {
            return Ok(ExprValue::Null);
        }
        match &self {
            ExprValue::Number(_) => Ok(self),
            ExprValue::String(text) if matches(&INTEGER, text) => text
                .parse::<f64>()
                .map(ExprValue::Number)
                .map_err(|_| self.mismatch(ExprType::Number)),
            ExprValue::String(text) if matches(&DECIMAL, text) => parse_float_prefix(text)
                .map(ExprValue::Number)
                .ok_or_else(|| self.mismatch(ExprType::Number)),
            _ => Err(self.mismatch(ExprType::Number)),
        }
    }

    fn mismatch(&self, expected: ExprType) -> String {
        format!("Expected {}, got value {}", expected, self.to_json())
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::String(text) => f.write_str(text),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

fn is_integral(number: f64) -> bool {
    number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15
}

/// Integral numbers print without a fractional part (`5`, not `5.0`).
pub fn format_number(number: f64) -> String {
    if is_integral(number) {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}

/// Parses the longest leading `digits[.digits]` run, so `"1.2.3"` reads as
/// `1.2`. A string with no digits in that run is not a number.
fn parse_float_prefix(text: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (offset, ch) in text.char_indices() {
        match ch {
            '0'..='9' => {
                seen_digit = true;
                end = offset + 1;
            }
            '.' if !seen_dot => {
                seen_dot = true;
                end = offset + 1;
            }
            _ => break,
        }
    }
    if !seen_digit {
        return None;
    }
    text[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(text: &str) -> ExprValue {
        ExprValue::String(text.to_string())
    }

    #[test]
    fn boolean_casts() {
        assert_eq!(string("true").cast(ExprType::Boolean), Ok(ExprValue::Bool(true)));
        assert_eq!(string("0").cast(ExprType::Boolean), Ok(ExprValue::Bool(false)));
        assert_eq!(ExprValue::Number(1.0).cast(ExprType::Boolean), Ok(ExprValue::Bool(true)));
        assert_eq!(string("null").cast(ExprType::Boolean), Ok(ExprValue::Null));
        assert_eq!(
            string("yes").cast(ExprType::Boolean),
            Err("Expected boolean, got value \"yes\"".to_string())
        );
        assert!(ExprValue::Number(2.0).cast(ExprType::Boolean).is_err());
    }

    #[test]
    fn string_casts() {
        assert_eq!(ExprValue::Number(5.0).cast(ExprType::String), Ok(string("5")));
        assert_eq!(ExprValue::Number(2.5).cast(ExprType::String), Ok(string("2.5")));
        assert_eq!(ExprValue::Bool(false).cast(ExprType::String), Ok(string("false")));
        assert_eq!(ExprValue::Null.cast(ExprType::String), Ok(ExprValue::Null));
    }

    #[test]
    fn number_casts() {
        assert_eq!(string("5").cast(ExprType::Number), Ok(ExprValue::Number(5.0)));
        assert_eq!(string("1.25").cast(ExprType::Number), Ok(ExprValue::Number(1.25)));
        assert_eq!(string("1.2.3").cast(ExprType::Number), Ok(ExprValue::Number(1.2)));
        assert_eq!(string("null").cast(ExprType::Number), Ok(ExprValue::Null));
        assert!(string(".").cast(ExprType::Number).is_err());
        assert!(string("-1").cast(ExprType::Number).is_err());
        assert!(string("five").cast(ExprType::Number).is_err());
        assert!(ExprValue::Bool(true).cast(ExprType::Number).is_err());
    }

    #[test]
    fn json_conversion_keeps_integers_integral() {
        assert_eq!(ExprValue::Number(3.0).to_json(), serde_json::json!(3));
        assert_eq!(ExprValue::from_json(&serde_json::json!([1])), None);
    }
}
