//! Built-in function table.

use crate::expr::value::{ExprType, ExprValue, format_number};

/// Which data source a lookup function reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    DataModel,
    Component,
    ApplicationSettings,
    InstanceContext,
}

#[derive(Debug, Clone, Copy)]
pub enum Implementation {
    /// Works on its already-cast arguments alone.
    Pure(fn(&[ExprValue]) -> ExprValue),
    /// Resolved through the data sources of the evaluation context.
    Lookup(LookupKind),
    /// `if`, whose arity decides how its arguments are read.
    Conditional,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    /// Types of the leading, required parameters.
    pub params: &'static [ExprType],
    /// Optional trailing parameters, after `params`.
    pub optional: &'static [ExprType],
    /// Type of any further arguments, for variadic functions.
    pub rest: Option<ExprType>,
    pub returns: ExprType,
    pub implementation: Implementation,
}

impl FunctionDef {
    const fn pure(
        name: &'static str,
        params: &'static [ExprType],
        returns: ExprType,
        implementation: fn(&[ExprValue]) -> ExprValue,
    ) -> Self {
        FunctionDef {
            name,
            params,
            optional: &[],
            rest: None,
            returns,
            implementation: Implementation::Pure(implementation),
        }
    }

    const fn lookup(name: &'static str, kind: LookupKind) -> Self {
        FunctionDef {
            name,
            params: &[ExprType::String],
            optional: &[],
            rest: None,
            returns: ExprType::String,
            implementation: Implementation::Lookup(kind),
        }
    }

    const fn variadic(
        name: &'static str,
        min: &'static [ExprType],
        rest: ExprType,
        returns: ExprType,
        implementation: fn(&[ExprValue]) -> ExprValue,
    ) -> Self {
        FunctionDef {
            name,
            params: min,
            optional: &[],
            rest: Some(rest),
            returns,
            implementation: Implementation::Pure(implementation),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.params.len()
            && (self.rest.is_some() || count <= self.params.len() + self.optional.len())
    }

    /// Declared type of the argument at `index`.
    pub fn param_type(&self, index: usize) -> ExprType {
        self.params
            .iter()
            .chain(self.optional)
            .nth(index)
            .copied()
            .or(self.rest)
            .unwrap_or(ExprType::Any)
    }

    pub fn arity(&self) -> String {
        let min = self.params.len();
        match (self.rest, self.optional.len()) {
            (Some(_), _) => format!("at least {}", min),
            (None, 0) => format!("exactly {}", min),
            (None, extra) => format!("{} to {}", min, min + extra),
        }
    }
}

use ExprType::{Any, Boolean, Number, String as Str};

const IF: FunctionDef = FunctionDef {
    name: "if",
    params: &[Boolean, Any],
    optional: &[Any, Any],
    rest: None,
    returns: Any,
    implementation: Implementation::Conditional,
};

const ROUND: FunctionDef = FunctionDef {
    name: "round",
    params: &[Number],
    optional: &[Number],
    rest: None,
    returns: Str,
    implementation: Implementation::Pure(round),
};

pub fn lookup(name: &str) -> Option<FunctionDef> {
    let def = match name {
        "equals" => FunctionDef::pure("equals", &[Str, Str], Boolean, |a| {
            ExprValue::Bool(a[0] == a[1])
        }),
        "notEquals" => FunctionDef::pure("notEquals", &[Str, Str], Boolean, |a| {
            ExprValue::Bool(a[0] != a[1])
        }),
        "greaterThan" => FunctionDef::pure("greaterThan", &[Number, Number], Boolean, |a| {
            compare(a, |left, right| left > right)
        }),
        "greaterThanEq" => FunctionDef::pure("greaterThanEq", &[Number, Number], Boolean, |a| {
            compare(a, |left, right| left >= right)
        }),
        "lessThan" => FunctionDef::pure("lessThan", &[Number, Number], Boolean, |a| {
            compare(a, |left, right| left < right)
        }),
        "lessThanEq" => FunctionDef::pure("lessThanEq", &[Number, Number], Boolean, |a| {
            compare(a, |left, right| left <= right)
        }),
        "and" => FunctionDef::variadic("and", &[Boolean], Boolean, Boolean, |a| {
            ExprValue::Bool(a.iter().all(|value| value.as_bool() == Some(true)))
        }),
        "or" => FunctionDef::variadic("or", &[Boolean], Boolean, Boolean, |a| {
            ExprValue::Bool(a.iter().any(|value| value.as_bool() == Some(true)))
        }),
        "not" => FunctionDef::pure("not", &[Boolean], Boolean, |a| {
            ExprValue::Bool(a[0].as_bool() != Some(true))
        }),
        "concat" => FunctionDef::variadic("concat", &[], Str, Str, |a| {
            ExprValue::String(a.iter().filter_map(ExprValue::as_str).collect())
        }),
        "upperCase" => FunctionDef::pure("upperCase", &[Str], Str, |a| {
            map_text(&a[0], str::to_uppercase)
        }),
        "lowerCase" => FunctionDef::pure("lowerCase", &[Str], Str, |a| {
            map_text(&a[0], str::to_lowercase)
        }),
        "contains" => FunctionDef::pure("contains", &[Str, Str], Boolean, |a| {
            text_test(a, false, |text, needle| text.contains(needle))
        }),
        "notContains" => FunctionDef::pure("notContains", &[Str, Str], Boolean, |a| {
            text_test(a, true, |text, needle| !text.contains(needle))
        }),
        "startsWith" => FunctionDef::pure("startsWith", &[Str, Str], Boolean, |a| {
            text_test(a, false, |text, prefix| text.starts_with(prefix))
        }),
        "endsWith" => FunctionDef::pure("endsWith", &[Str, Str], Boolean, |a| {
            text_test(a, false, |text, suffix| text.ends_with(suffix))
        }),
        "commaContains" => FunctionDef::pure("commaContains", &[Str, Str], Boolean, |a| {
            text_test(a, false, |list, item| {
                list.split(',').any(|entry| entry.trim() == item)
            })
        }),
        "stringLength" => FunctionDef::pure("stringLength", &[Str], Number, |a| {
            ExprValue::Number(a[0].as_str().map_or(0, |text| text.chars().count()) as f64)
        }),
        "round" => ROUND,
        "if" => IF,
        "dataModel" => FunctionDef::lookup("dataModel", LookupKind::DataModel),
        "component" => FunctionDef::lookup("component", LookupKind::Component),
        "applicationSettings" => {
            FunctionDef::lookup("applicationSettings", LookupKind::ApplicationSettings)
        }
        "instanceContext" => FunctionDef::lookup("instanceContext", LookupKind::InstanceContext),
        _ => return None,
    };
    Some(def)
}

/// Numeric comparisons are false whenever either side is null.
fn compare(args: &[ExprValue], test: fn(f64, f64) -> bool) -> ExprValue {
    match (args[0].as_number(), args[1].as_number()) {
        (Some(left), Some(right)) => ExprValue::Bool(test(left, right)),
        _ => ExprValue::Bool(false),
    }
}

fn map_text(value: &ExprValue, map: fn(&str) -> String) -> ExprValue {
    match value.as_str() {
        Some(text) => ExprValue::String(map(text)),
        None => ExprValue::Null,
    }
}

fn text_test(args: &[ExprValue], on_null: bool, test: fn(&str, &str) -> bool) -> ExprValue {
    match (args[0].as_str(), args[1].as_str()) {
        (Some(text), Some(other)) => ExprValue::Bool(test(text, other)),
        _ => ExprValue::Bool(on_null),
    }
}

/// Precision past this adds nothing an `f64` can hold and would overflow the
/// scaling factor.
const MAX_ROUND_DECIMALS: usize = 100;

fn round(args: &[ExprValue]) -> ExprValue {
    let number = args[0].as_number().unwrap_or(0.0);
    let decimals = args
        .get(1)
        .and_then(ExprValue::as_number)
        .map_or(0, |decimals| decimals.clamp(0.0, MAX_ROUND_DECIMALS as f64) as usize);
    let factor = 10f64.powi(decimals as i32);
    let rounded = (number * factor).round() / factor;
    if decimals == 0 {
        ExprValue::String(format_number(rounded))
    } else {
        ExprValue::String(format!("{:.*}", decimals, rounded))
    }
}
