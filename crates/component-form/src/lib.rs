use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use form_engine::{
    EngineConfig, EngineError, EvalOptions, ExprContext, ExprError, ExprValue, FormEngine,
    FormInput, JsonDataSources, LayoutError, NestedComponent, PrototypeRegistry, PrototypeSet,
    RepeatingGroups, ResolvedForm, evaluate_json, generate, parse_layout_file, parse_layout_set,
    render_json as engine_render_json, render_text as engine_render_text, validate,
};

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse input: {0}")]
    InputParse(#[source] serde_json::Error),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Expression(#[from] ExprError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

/// Options for a one-off expression evaluation: the data sources plus an
/// optional value to fall back on when evaluation fails.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EvalRequest {
    #[serde(flatten)]
    sources: JsonDataSources,
    default_value: Option<Value>,
}

fn parse_input<T: DeserializeOwned + Default>(input_json: &str) -> Result<T, ComponentError> {
    if input_json.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(input_json).map_err(ComponentError::InputParse)
}

fn parse_data(data_json: &str) -> Result<Value, ComponentError> {
    if data_json.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(data_json).map_err(ComponentError::InputParse)
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => {
            debug!(error = %err, "request failed");
            json!({ "error": err.to_string() }).to_string()
        }
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

/// Nests a single layout file's flat component list.
pub fn nest_layout(layout_json: &str) -> String {
    respond(
        parse_layout_file(layout_json)
            .and_then(|file| form_engine::nest_layout(&file.data.layout))
            .map_err(ComponentError::from)
            .and_then(|nested| serde_json::to_value(nested).map_err(ComponentError::JsonEncode)),
    )
}

/// Flattens a nested component list back into layout order.
pub fn flatten_layout(nested_json: &str) -> String {
    respond(
        serde_json::from_str::<Vec<NestedComponent>>(nested_json)
            .map_err(ComponentError::InputParse)
            .and_then(|nested| {
                serde_json::to_value(form_engine::flatten_layout(&nested))
                    .map_err(ComponentError::JsonEncode)
            }),
    )
}

fn hierarchy(layouts_json: &str, data_json: &str) -> Result<Value, ComponentError> {
    let layouts = parse_layout_set(layouts_json)?;
    let data = parse_data(data_json)?;
    let prototypes = PrototypeSet::from_layouts(&layouts);
    let registry = PrototypeRegistry::with_defaults();
    let groups = RepeatingGroups::from_data(&prototypes, &registry, &data);
    let pages = generate(&prototypes, &registry, &data, &groups);
    serde_json::to_value(pages).map_err(ComponentError::JsonEncode)
}

/// Generates the node tree of a layout set for one data snapshot.
pub fn generate_hierarchy(layouts_json: &str, data_json: &str) -> String {
    respond(hierarchy(layouts_json, data_json))
}

fn evaluate(expr_json: &str, request_json: &str) -> Result<Value, ComponentError> {
    let expr: Value = serde_json::from_str(expr_json).map_err(ComponentError::InputParse)?;
    let request: EvalRequest = parse_input(request_json)?;
    let options = match request.default_value.as_ref().and_then(ExprValue::from_json) {
        Some(default) => EvalOptions::with_default(default),
        None => EvalOptions::default(),
    };
    let ctx = ExprContext::new(&request.sources);
    let value = evaluate_json(&expr, &ctx, &options)?;
    Ok(json!({ "value": value }))
}

/// Evaluates one expression against the given data sources. No node is in
/// scope, so `component` lookups read `components` from the request.
pub fn evaluate_expression(expr_json: &str, request_json: &str) -> String {
    respond(evaluate(expr_json, request_json))
}

fn resolve(layouts_json: &str, config_json: &str, input_json: &str) -> Result<ResolvedForm, ComponentError> {
    let layouts = parse_layout_set(layouts_json)?;
    let config = EngineConfig::from_json(config_json)?;
    let input: FormInput = parse_input(input_json)?;
    let mut engine = FormEngine::new(&layouts, config);
    Ok(engine.resolve(&input)?)
}

/// Runs a full render cycle and returns the resolved form together with its
/// validation result.
pub fn resolve_form(layouts_json: &str, config_json: &str, input_json: &str) -> String {
    respond(resolve(layouts_json, config_json, input_json).and_then(|form| {
        let mut value = serde_json::to_value(&form).map_err(ComponentError::JsonEncode)?;
        let validation = serde_json::to_value(validate(&form)).map_err(ComponentError::JsonEncode)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("validation".into(), validation);
        }
        Ok(value)
    }))
}

pub fn render_json(layouts_json: &str, config_json: &str, input_json: &str) -> String {
    respond(resolve(layouts_json, config_json, input_json).map(|form| engine_render_json(&form)))
}

pub fn render_text(layouts_json: &str, config_json: &str, input_json: &str) -> String {
    respond_string(resolve(layouts_json, config_json, input_json).map(|form| engine_render_text(&form)))
}

pub fn layout_schema() -> String {
    respond(Ok(form_engine::layout_schema()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LAYOUTS: &str = r#"{"main": {"data": {"layout": [
        {"id": "g", "type": "RepeatingGroup", "children": ["c"], "dataModelBindings": {"group": "Arr"}},
        {"id": "c", "type": "Input", "required": true, "dataModelBindings": {"simpleBinding": "Arr.val"}}
    ]}}}"#;

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).expect("json")
    }

    #[test]
    fn nest_layout_moves_children_under_parents() {
        let nested = parse(&nest_layout(
            r#"{"data": {"layout": [{"id": "a", "type": "Group", "children": ["b"]}, {"id": "b", "type": "Input"}]}}"#,
        ));
        assert_eq!(nested[0]["id"], "a");
        assert_eq!(nested[0]["children"][0]["id"], "b");
    }

    #[test]
    fn nest_layout_reports_cycles_as_error() {
        let response = parse(&nest_layout(
            r#"{"data": {"layout": [{"id": "a", "type": "Group", "children": ["b"]}, {"id": "b", "type": "Group", "children": ["a"]}]}}"#,
        ));
        assert!(response["error"].as_str().is_some_and(|message| message.contains("circular")));
    }

    #[test]
    fn flatten_layout_restores_id_lists() {
        let flat = parse(&flatten_layout(
            r#"[{"id": "a", "type": "Group", "title": "A", "children": [{"id": "b", "type": "Input"}]}]"#,
        ));
        assert_eq!(flat, json!([
            { "id": "a", "type": "Group", "title": "A", "children": ["b"] },
            { "id": "b", "type": "Input" }
        ]));
    }

    #[test]
    fn generate_hierarchy_expands_rows() {
        let pages = parse(&generate_hierarchy(LAYOUTS, r#"{"Arr": [{"val": 1}, {"val": 2}]}"#));
        let nodes = &pages["pages"]["main"]["nodes"];
        assert_eq!(nodes["c-1"]["dataModelBindings"]["simpleBinding"], "Arr[1].val");
    }

    #[test]
    fn evaluate_expression_uses_default_on_failure() {
        let ok = parse(&evaluate_expression(
            r#"["concat", ["dataModel", "a"], "!"]"#,
            r#"{"dataModel": {"a": "hi"}}"#,
        ));
        assert_eq!(ok["value"], "hi!");

        let recovered = parse(&evaluate_expression(r#"["unknownFn"]"#, r#"{"defaultValue": 7}"#));
        assert_eq!(recovered["value"], 7);

        let failed = parse(&evaluate_expression(r#"["unknownFn"]"#, ""));
        assert!(failed["error"].as_str().is_some_and(|message| message.starts_with("FuncNotImplemented")));
    }

    #[test]
    fn resolve_form_includes_validation() {
        let form = parse(&resolve_form(LAYOUTS, "", r#"{"dataModel": {"Arr": [{"val": "x"}, {}]}}"#));
        assert_eq!(form["stage"], "Finished");
        assert_eq!(form["nodes"]["c-0"]["required"], true);
        assert_eq!(form["validation"]["missingRequired"], json!(["c-1"]));
    }

    #[test]
    fn bad_config_is_reported() {
        let response = parse(&resolve_form(LAYOUTS, "{not json", ""));
        assert!(response["error"].as_str().is_some_and(|message| message.starts_with("failed to parse config")));
    }

    #[test]
    fn render_text_outputs_tree() {
        let text = render_text(LAYOUTS, "", r#"{"dataModel": {"Arr": [{"val": "x"}]}}"#);
        assert!(text.contains("Page main"));
        assert!(text.contains("- c-0 (Input) [required] = x #0"));
    }

    #[test]
    fn render_json_nests_visible_nodes_with_validation() {
        let report = parse(&render_json(LAYOUTS, "", r#"{"dataModel": {"Arr": [{"val": "x"}, {}]}}"#));
        assert_eq!(report["stage"], "Finished");
        let nodes = &report["pages"][0]["nodes"];
        assert_eq!(nodes[0]["id"], "g");
        assert_eq!(report["validation"]["valid"], false);
        assert_eq!(report["validation"]["missingRequired"], json!(["c-1"]));

        let failed = parse(&render_json(LAYOUTS, "", "{not json"));
        assert!(failed["error"].as_str().is_some_and(|message| message.starts_with("failed to parse input")));
    }

    #[test]
    fn schema_describes_layout_files() {
        let schema = parse(&layout_schema());
        assert!(schema["properties"]["data"].is_object());
    }
}
