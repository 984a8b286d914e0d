//! Prefix-notation expression language used for `hidden`, `required` and
//! other dynamic props.
//!
//! An expression is a JSON primitive or a call, written `[name, ...args]`
//! or `{ "function": name, "args": [...] }`. Anything else is not an
//! expression and callers pass it through untouched.

pub mod error;
pub mod eval;
pub mod functions;
pub mod pretty;
pub mod value;

use serde_json::{Map, Value};

pub use error::{ExprError, ExprErrorKind, PathKey, render_path};
pub use eval::{EvalOptions, ExprContext, evaluate, evaluate_flag, evaluate_json};
pub use functions::{FunctionDef, LookupKind};
pub use pretty::pretty_errors;
pub use value::{ExprType, ExprValue};

/// How a call was written, kept so error paths point into the source JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallForm {
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(ExprValue),
    Call {
        function: String,
        args: Vec<Expression>,
        form: CallForm,
    },
}

impl Expression {
    /// Whether `value` has the shape of a call.
    pub fn is_expression(value: &Value) -> bool {
        match value {
            Value::Array(items) => items.first().is_some_and(Value::is_string),
            Value::Object(map) => map.get("function").is_some_and(Value::is_string),
            _ => false,
        }
    }

    pub fn parse(value: &Value) -> Result<Expression, ExprError> {
        parse_at(value, &[], value)
    }

    pub fn call(function: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            function: function.into(),
            args,
            form: CallForm::Array,
        }
    }

    pub fn literal(value: ExprValue) -> Self {
        Expression::Literal(value)
    }

    /// JSON form of the expression, in the shape it was parsed from.
    pub fn to_json(&self) -> Value {
        match self {
            Expression::Literal(value) => value.to_json(),
            Expression::Call {
                function,
                args,
                form: CallForm::Array,
            } => {
                let mut items = vec![Value::String(function.clone())];
                items.extend(args.iter().map(Expression::to_json));
                Value::Array(items)
            }
            Expression::Call {
                function,
                args,
                form: CallForm::Object,
            } => {
                let mut map = Map::new();
                map.insert("function".into(), Value::String(function.clone()));
                map.insert(
                    "args".into(),
                    Value::Array(args.iter().map(Expression::to_json).collect()),
                );
                Value::Object(map)
            }
        }
    }
}

/// Path of argument `index` of a call at `path`.
pub(crate) fn arg_path(path: &[PathKey], form: CallForm, index: usize) -> Vec<PathKey> {
    let mut out = path.to_vec();
    match form {
        CallForm::Array => out.push(PathKey::Index(index + 1)),
        CallForm::Object => {
            out.push(PathKey::Key("args".into()));
            out.push(PathKey::Index(index));
        }
    }
    out
}

/// Path of the function name of a call at `path`.
pub(crate) fn name_path(path: &[PathKey], form: CallForm) -> Vec<PathKey> {
    let mut out = path.to_vec();
    out.push(match form {
        CallForm::Array => PathKey::Index(0),
        CallForm::Object => PathKey::Key("function".into()),
    });
    out
}

fn parse_at(value: &Value, path: &[PathKey], source: &Value) -> Result<Expression, ExprError> {
    if let Some(literal) = ExprValue::from_json(value) {
        return Ok(Expression::Literal(literal));
    }
    let invalid = |path: &[PathKey], message: String| {
        ExprError::at(
            ExprErrorKind::InvalidExpression,
            render_path(path),
            message,
            source,
        )
    };

    match value {
        Value::Array(items) => {
            let Some(function) = items.first().and_then(Value::as_str) else {
                return Err(invalid(
                    path,
                    "Expected a function name as the first element".into(),
                ));
            };
            let args = items[1..]
                .iter()
                .enumerate()
                .map(|(index, arg)| parse_at(arg, &arg_path(path, CallForm::Array, index), source))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expression::Call {
                function: function.to_string(),
                args,
                form: CallForm::Array,
            })
        }
        Value::Object(map) => {
            let Some(function) = map.get("function").and_then(Value::as_str) else {
                return Err(invalid(path, "Expected an object with a \"function\" name".into()));
            };
            let args = match map.get("args") {
                None => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .map(|(index, arg)| {
                        parse_at(arg, &arg_path(path, CallForm::Object, index), source)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => {
                    let mut args_path = path.to_vec();
                    args_path.push(PathKey::Key("args".into()));
                    return Err(invalid(&args_path, "Expected \"args\" to be an array".into()));
                }
            };
            Ok(Expression::Call {
                function: function.to_string(),
                args,
                form: CallForm::Object,
            })
        }
        _ => Err(invalid(path, "Expected an expression".into())),
    }
}
