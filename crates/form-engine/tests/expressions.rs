use serde_json::{Value, json};

use form_engine::{
    EvalOptions, ExprContext, ExprErrorKind, ExprValue, Expression, JsonDataSources, LayoutPages,
    PrototypeRegistry, PrototypeSet, RepeatingGroups, evaluate, evaluate_json, generate,
    parse_layout_set,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "repeating_group" => include_str!("../tests/fixtures/repeating_group.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn rows(data: &Value) -> LayoutPages {
    let set = parse_layout_set(fixture("repeating_group")).expect("layout set");
    let prototypes = PrototypeSet::from_layouts(&set);
    let registry = PrototypeRegistry::with_defaults();
    let groups = RepeatingGroups::from_data(&prototypes, &registry, data);
    generate(&prototypes, &registry, data, &groups)
}

#[test]
fn evaluation_is_deterministic() {
    let sources = JsonDataSources::with_data_model(json!({ "n": "5" }));
    let ctx = ExprContext::new(&sources);
    let expr = Expression::parse(&json!(["greaterThan", ["dataModel", "n"], "4.5"])).expect("parse");
    let first = evaluate(&expr, &ctx, &EvalOptions::default());
    for _ in 0..3 {
        assert_eq!(evaluate(&expr, &ctx, &EvalOptions::default()), first);
    }
    assert_eq!(first, Ok(ExprValue::Bool(true)));
}

#[test]
fn unknown_function_recovers_with_default() {
    let sources = JsonDataSources::default();
    let ctx = ExprContext::new(&sources);
    let value = evaluate_json(
        &json!(["unknownFn"]),
        &ctx,
        &EvalOptions::with_default(ExprValue::String("fallback".into())),
    );
    assert_eq!(value, Ok(json!("fallback")));
}

#[test]
fn unknown_function_without_default_is_pretty_printed() {
    let sources = JsonDataSources::default();
    let ctx = ExprContext::new(&sources);
    let error = evaluate_json(&json!(["unknownFn"]), &ctx, &EvalOptions::default())
        .expect_err("no default");
    assert_eq!(error.kind, ExprErrorKind::FuncNotImplemented);
    assert_eq!(error.path, "[0]");
    let expected = [
        "FuncNotImplemented: Function \"unknownFn\" not implemented",
        "",
        "[",
        "  \"unknownFn\"",
        "  ^^^^^^^^^^^",
        "    → Function \"unknownFn\" not implemented",
        "]",
    ]
    .join("\n");
    assert_eq!(error.to_string(), expected);
}

#[test]
fn row_nodes_read_their_own_row() {
    let data = json!({ "Arr": [{ "val": "first" }, { "val": "second" }] });
    let pages = rows(&data);
    let sources = JsonDataSources::with_data_model(data);
    let node = pages.find("c-1").expect("row node");
    let ctx = ExprContext::for_node(node, &pages, &sources);

    let relative = evaluate_json(&json!(["dataModel", "Arr.val"]), &ctx, &EvalOptions::default());
    assert_eq!(relative, Ok(json!("second")));
    let component = evaluate_json(&json!(["component", "c"]), &ctx, &EvalOptions::default());
    assert_eq!(component, Ok(json!("second")));
}

#[test]
fn string_casts_follow_number_and_boolean_rules() {
    let sources = JsonDataSources::with_data_model(json!({ "flag": "true", "count": "5" }));
    let ctx = ExprContext::new(&sources);
    let opts = EvalOptions::default();
    assert_eq!(
        evaluate_json(&json!(["and", ["dataModel", "flag"], true]), &ctx, &opts),
        Ok(json!(true))
    );
    assert_eq!(
        evaluate_json(&json!(["lessThanEq", ["dataModel", "count"], 5]), &ctx, &opts),
        Ok(json!(true))
    );
    assert_eq!(
        evaluate_json(&json!(["round", "2.456", 2]), &ctx, &opts),
        Ok(json!("2.46"))
    );
}

#[test]
fn whole_float_data_equals_integer_literal() {
    let sources = JsonDataSources::with_data_model(json!({ "x": 5.0 }));
    let ctx = ExprContext::new(&sources);
    let equal = evaluate_json(&json!(["equals", ["dataModel", "x"], 5]), &ctx, &EvalOptions::default());
    assert_eq!(equal, Ok(json!(true)));
    let raw = evaluate_json(&json!(["dataModel", "x"]), &ctx, &EvalOptions::default());
    assert_eq!(raw, Ok(json!("5")));
}
