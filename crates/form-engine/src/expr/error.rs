use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::expr::pretty::pretty_errors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExprErrorKind {
    /// A value could not be cast to the type a function expects or returns.
    UnexpectedType,
    /// The function name is not in the built-in table.
    FuncNotImplemented,
    /// Too few or too many arguments for the function.
    ArgumentCount,
    /// A nested value is neither a literal nor a call.
    InvalidExpression,
}

impl fmt::Display for ExprErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprErrorKind::UnexpectedType => "UnexpectedType",
            ExprErrorKind::FuncNotImplemented => "FuncNotImplemented",
            ExprErrorKind::ArgumentCount => "ArgumentCount",
            ExprErrorKind::InvalidExpression => "InvalidExpression",
        })
    }
}

/// A failed evaluation. `path` points at the offending sub-expression
/// (`[1][0]`), `pretty` is the whole expression with that part underlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {}\n\n{pretty}", messages.join("; "))]
pub struct ExprError {
    pub kind: ExprErrorKind,
    pub path: String,
    pub messages: Vec<String>,
    pub pretty: String,
}

impl ExprError {
    pub(crate) fn at(kind: ExprErrorKind, path: String, message: String, source: &Value) -> Self {
        let mut errors = IndexMap::new();
        errors.insert(path.clone(), vec![message.clone()]);
        ExprError {
            kind,
            pretty: pretty_errors(source, &errors),
            path,
            messages: vec![message],
        }
    }
}

/// One step into a JSON expression: an array index or an object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(index) => write!(f, "[{}]", index),
            PathKey::Key(key) => write!(f, "[{}]", Value::String(key.clone())),
        }
    }
}

pub fn render_path(path: &[PathKey]) -> String {
    path.iter().map(ToString::to_string).collect()
}
