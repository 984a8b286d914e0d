use serde_json::Value;
use tracing::warn;

use crate::data::{DataSources, transpose};
use crate::expr::error::{ExprError, ExprErrorKind, PathKey, render_path};
use crate::expr::functions::{self, Implementation, LookupKind};
use crate::expr::value::{ExprType, ExprValue};
use crate::expr::{CallForm, Expression, arg_path, name_path};
use crate::hierarchy::{LayoutNode, LayoutPages};
use crate::visibility::HiddenState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOptions {
    /// Returned instead of an error, which is then only logged.
    pub default_value: Option<ExprValue>,
}

impl EvalOptions {
    pub fn with_default(value: ExprValue) -> Self {
        Self {
            default_value: Some(value),
        }
    }
}

/// What an expression is evaluated against. Only `sources` is required;
/// `node` and `pages` enable row-relative data lookups and `component`
/// resolution, `hidden` makes `component` read hidden nodes as null.
#[derive(Clone, Copy)]
pub struct ExprContext<'a> {
    pub node: Option<&'a LayoutNode>,
    pub pages: Option<&'a LayoutPages>,
    pub hidden: Option<&'a HiddenState>,
    pub sources: &'a dyn DataSources,
}

impl<'a> ExprContext<'a> {
    pub fn new(sources: &'a dyn DataSources) -> Self {
        Self {
            node: None,
            pages: None,
            hidden: None,
            sources,
        }
    }

    pub fn for_node(
        node: &'a LayoutNode,
        pages: &'a LayoutPages,
        sources: &'a dyn DataSources,
    ) -> Self {
        Self {
            node: Some(node),
            pages: Some(pages),
            hidden: None,
            sources,
        }
    }

    pub fn with_hidden(mut self, hidden: &'a HiddenState) -> Self {
        self.hidden = Some(hidden);
        self
    }

    fn node_id(&self) -> &str {
        self.node.map_or("", |node| node.id.as_str())
    }
}

struct Failure {
    kind: ExprErrorKind,
    path: Vec<PathKey>,
    message: String,
}

impl Failure {
    fn new(kind: ExprErrorKind, path: Vec<PathKey>, message: String) -> Self {
        Self {
            kind,
            path,
            message,
        }
    }

    fn into_error(self, source: &Value) -> ExprError {
        ExprError::at(self.kind, render_path(&self.path), self.message, source)
    }
}

/// Evaluates `expr` bottom-up: arguments first, each cast to the parameter
/// type its function declares, then the function, then the cast to its
/// return type.
pub fn evaluate(
    expr: &Expression,
    ctx: &ExprContext<'_>,
    options: &EvalOptions,
) -> Result<ExprValue, ExprError> {
    match eval(expr, &[], ctx) {
        Ok(value) => Ok(value),
        Err(failure) => recover(failure.into_error(&expr.to_json()), ctx, options),
    }
}

fn recover(
    error: ExprError,
    ctx: &ExprContext<'_>,
    options: &EvalOptions,
) -> Result<ExprValue, ExprError> {
    match &options.default_value {
        Some(default) => {
            warn!(
                node = ctx.node_id(),
                kind = %error.kind,
                path = %error.path,
                "expression failed, using default value\n{}",
                error.pretty
            );
            Ok(default.clone())
        }
        None => Err(error),
    }
}

/// Evaluates a JSON value that may or may not be an expression. Values that
/// are not calls come back unchanged.
pub fn evaluate_json(
    value: &Value,
    ctx: &ExprContext<'_>,
    options: &EvalOptions,
) -> Result<Value, ExprError> {
    if !Expression::is_expression(value) && ExprValue::from_json(value).is_none() {
        return Ok(value.clone());
    }
    let expr = match Expression::parse(value) {
        Ok(expr) => expr,
        Err(error) => return recover(error, ctx, options).map(|value| value.to_json()),
    };
    evaluate(&expr, ctx, options).map(|value| value.to_json())
}

/// Evaluates a boolean prop such as `hidden` or `required`. Plain booleans
/// work as well as expressions; null reads as `false`.
pub fn evaluate_flag(value: &Value, ctx: &ExprContext<'_>) -> Result<bool, ExprError> {
    let result = match ExprValue::from_json(value) {
        Some(literal) => literal,
        None => evaluate(&Expression::parse(value)?, ctx, &EvalOptions::default())?,
    };
    match result.cast(ExprType::Boolean) {
        Ok(cast) => Ok(cast.as_bool().unwrap_or(false)),
        Err(message) => Err(ExprError::at(
            ExprErrorKind::UnexpectedType,
            String::new(),
            message,
            value,
        )),
    }
}

fn eval(expr: &Expression, path: &[PathKey], ctx: &ExprContext<'_>) -> Result<ExprValue, Failure> {
    let (function, args, form) = match expr {
        Expression::Literal(value) => return Ok(value.clone()),
        Expression::Call {
            function,
            args,
            form,
        } => (function, args, *form),
    };

    let Some(def) = functions::lookup(function) else {
        return Err(Failure::new(
            ExprErrorKind::FuncNotImplemented,
            name_path(path, form),
            format!("Function \"{}\" not implemented", function),
        ));
    };
    if !def.accepts(args.len()) {
        return Err(Failure::new(
            ExprErrorKind::ArgumentCount,
            path.to_vec(),
            format!(
                "Expected {} argument(s) for \"{}\", got {}",
                def.arity(),
                def.name,
                args.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let arg_path = arg_path(path, form, index);
        let value = eval(arg, &arg_path, ctx)?;
        let cast = value
            .cast(def.param_type(index))
            .map_err(|message| Failure::new(ExprErrorKind::UnexpectedType, arg_path, message))?;
        values.push(cast);
    }

    let result = match def.implementation {
        Implementation::Pure(implementation) => implementation(&values),
        Implementation::Lookup(kind) => lookup(kind, &values[0], ctx),
        Implementation::Conditional => conditional(values, path, form)?,
    };
    result
        .cast(def.returns)
        .map_err(|message| Failure::new(ExprErrorKind::UnexpectedType, path.to_vec(), message))
}

/// `[if, cond, then]`, `[if, cond, then, else]` or
/// `[if, cond, then, "else", other]`.
fn conditional(
    mut values: Vec<ExprValue>,
    path: &[PathKey],
    form: CallForm,
) -> Result<ExprValue, Failure> {
    let other = match values.len() {
        2 => ExprValue::Null,
        3 => values.remove(2),
        _ if values[2].as_str() == Some("else") => values.remove(3),
        _ => {
            return Err(Failure::new(
                ExprErrorKind::UnexpectedType,
                arg_path(path, form, 2),
                format!("Expected \"else\", got value {}", values[2].to_json()),
            ));
        }
    };
    if values[0].as_bool() == Some(true) {
        Ok(values.swap_remove(1))
    } else {
        Ok(other)
    }
}

fn lookup(kind: LookupKind, key: &ExprValue, ctx: &ExprContext<'_>) -> ExprValue {
    let Some(key) = key.as_str() else {
        return ExprValue::Null;
    };
    let found = match kind {
        LookupKind::DataModel => {
            let path = match ctx.node.and_then(|node| node.row_path.as_deref()) {
                Some(row) => transpose(key, row),
                None => key.to_string(),
            };
            ctx.sources.data_model(&path)
        }
        LookupKind::Component => component(key, ctx),
        LookupKind::ApplicationSettings => ctx.sources.application_settings(key),
        LookupKind::InstanceContext => ctx.sources.instance_context(key),
    };
    found.map_or(ExprValue::Null, ExprValue::String)
}

fn component(id: &str, ctx: &ExprContext<'_>) -> Option<String> {
    let Some(pages) = ctx.pages else {
        return ctx.sources.component(id);
    };
    let target = match ctx.node {
        Some(node) => pages.closest(node, id),
        None => pages
            .find(id)
            .or_else(|| pages.nodes().find(|node| node.base_component_id == id)),
    };
    let Some(target) = target else {
        return ctx.sources.component(id);
    };
    if ctx.hidden.is_some_and(|hidden| hidden.is_hidden(&target.id)) {
        return None;
    }
    match target.simple_binding() {
        Some(binding) => ctx.sources.data_model(binding),
        None => ctx.sources.component(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JsonDataSources;
    use serde_json::json;

    fn eval_json(value: Value, sources: &JsonDataSources) -> Result<ExprValue, ExprError> {
        let expr = Expression::parse(&value)?;
        evaluate(&expr, &ExprContext::new(sources), &EvalOptions::default())
    }

    #[test]
    fn equals_casts_both_sides_to_string() {
        let sources = JsonDataSources::with_data_model(json!({ "x": 5 }));
        assert_eq!(
            eval_json(json!(["equals", ["dataModel", "x"], 5]), &sources),
            Ok(ExprValue::Bool(true))
        );
        let sources = JsonDataSources::with_data_model(json!({ "x": "5" }));
        assert_eq!(
            eval_json(json!(["equals", ["dataModel", "x"], 5]), &sources),
            Ok(ExprValue::Bool(true))
        );
        let sources = JsonDataSources::with_data_model(json!({ "x": 6 }));
        assert_eq!(
            eval_json(json!(["equals", ["dataModel", "x"], 5]), &sources),
            Ok(ExprValue::Bool(false))
        );
    }

    #[test]
    fn numeric_comparison_parses_strings() {
        let sources = JsonDataSources::with_data_model(json!({ "age": "18" }));
        assert_eq!(
            eval_json(json!(["greaterThanEq", ["dataModel", "age"], "18"]), &sources),
            Ok(ExprValue::Bool(true))
        );
    }

    #[test]
    fn unknown_function_reports_name_path() {
        let sources = JsonDataSources::default();
        let error = eval_json(json!(["not", ["unknownFn"]]), &sources).expect_err("unknown");
        assert_eq!(error.kind, ExprErrorKind::FuncNotImplemented);
        assert_eq!(error.path, "[1][0]");
        assert_eq!(error.messages, vec!["Function \"unknownFn\" not implemented"]);
        assert!(error.pretty.contains("^^^^^^^^^^^"));
    }

    #[test]
    fn default_value_swallows_errors() {
        let sources = JsonDataSources::default();
        let expr = Expression::parse(&json!(["unknownFn"])).expect("parse");
        let value = evaluate(
            &expr,
            &ExprContext::new(&sources),
            &EvalOptions::with_default(ExprValue::Bool(false)),
        );
        assert_eq!(value, Ok(ExprValue::Bool(false)));
    }

    #[test]
    fn cast_error_points_at_argument() {
        let sources = JsonDataSources::default();
        let error = eval_json(json!(["and", true, "maybe"]), &sources).expect_err("cast");
        assert_eq!(error.kind, ExprErrorKind::UnexpectedType);
        assert_eq!(error.path, "[2]");
        assert_eq!(error.messages, vec!["Expected boolean, got value \"maybe\""]);
    }

    #[test]
    fn argument_count_is_checked() {
        let sources = JsonDataSources::default();
        let error = eval_json(json!(["equals", 1]), &sources).expect_err("arity");
        assert_eq!(error.kind, ExprErrorKind::ArgumentCount);
        assert_eq!(error.path, "");
    }

    #[test]
    fn if_forms() {
        let sources = JsonDataSources::default();
        assert_eq!(eval_json(json!(["if", true, "a", "b"]), &sources), Ok(ExprValue::String("a".into())));
        assert_eq!(eval_json(json!(["if", false, "a", "else", "b"]), &sources), Ok(ExprValue::String("b".into())));
        assert_eq!(eval_json(json!(["if", false, "a"]), &sources), Ok(ExprValue::Null));
        assert!(eval_json(json!(["if", false, "a", "otherwise", "b"]), &sources).is_err());
    }

    #[test]
    fn lookups_go_through_sources() {
        let sources: JsonDataSources = serde_json::from_value(json!({
            "dataModel": { "name": "ada" },
            "applicationSettings": { "env": "prod" },
            "instanceContext": { "instanceOwnerPartyId": 1234 },
            "components": { "other": "value" }
        }))
        .expect("sources");
        assert_eq!(
            eval_json(json!(["upperCase", ["dataModel", "name"]]), &sources),
            Ok(ExprValue::String("ADA".into()))
        );
        assert_eq!(
            eval_json(json!(["applicationSettings", "env"]), &sources),
            Ok(ExprValue::String("prod".into()))
        );
        assert_eq!(
            eval_json(json!(["instanceContext", "instanceOwnerPartyId"]), &sources),
            Ok(ExprValue::String("1234".into()))
        );
        assert_eq!(
            eval_json(json!(["component", "other"]), &sources),
            Ok(ExprValue::String("value".into()))
        );
        assert_eq!(eval_json(json!(["dataModel", "missing"]), &sources), Ok(ExprValue::Null));
    }

    #[test]
    fn non_expressions_pass_through() {
        let sources = JsonDataSources::default();
        let ctx = ExprContext::new(&sources);
        let value = json!({ "label": "x" });
        assert_eq!(evaluate_json(&value, &ctx, &EvalOptions::default()), Ok(value));
        assert_eq!(
            evaluate_json(&json!(["stringLength", "abc"]), &ctx, &EvalOptions::default()),
            Ok(json!(3))
        );
    }

    #[test]
    fn flags_accept_literals_and_expressions() {
        let sources = JsonDataSources::default();
        let ctx = ExprContext::new(&sources);
        assert_eq!(evaluate_flag(&json!(true), &ctx), Ok(true));
        assert_eq!(evaluate_flag(&json!(null), &ctx), Ok(false));
        assert_eq!(evaluate_flag(&json!(["not", false]), &ctx), Ok(true));
        assert!(evaluate_flag(&json!("sometimes"), &ctx).is_err());
    }
}
