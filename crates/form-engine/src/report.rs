use serde_json::{Map, Value, json};

use crate::engine::{ResolvedForm, ResolvedNode};
use crate::validate::validate;

/// Render the resolved form as a JSON value: pages with their visible node
/// trees, plus the validation outcome.
pub fn render_json(form: &ResolvedForm) -> Value {
    let pages = form
        .pages
        .iter()
        .map(|(name, page)| {
            let nodes = page
                .top_level
                .iter()
                .filter_map(|id| form.node(id))
                .filter(|node| !node.hidden)
                .map(|node| node_json(form, node))
                .collect::<Vec<_>>();
            json!({
                "name": name,
                "hidden": page.hidden,
                "nodes": nodes,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "stage": form.stage.as_str(),
        "settled": form.settled,
        "pages": pages,
        "validation": validate(form),
    })
}

fn node_json(form: &ResolvedForm, node: &ResolvedNode) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(node.id.clone()));
    map.insert("type".into(), Value::String(node.kind.clone()));
    if node.required {
        map.insert("required".into(), Value::Bool(true));
    }
    if node.read_only {
        map.insert("readOnly".into(), Value::Bool(true));
    }
    if let Some(value) = &node.value {
        map.insert("value".into(), Value::String(value.clone()));
    }
    if let Some(options) = &node.options {
        map.insert(
            "options".into(),
            Value::Array(
                options
                    .iter()
                    .map(|option| json!({ "label": option.label, "value": option.value }))
                    .collect(),
            ),
        );
    }
    let children = node
        .children
        .iter()
        .filter_map(|id| form.node(id))
        .filter(|child| !child.hidden)
        .map(|child| node_json(form, child))
        .collect::<Vec<_>>();
    if !children.is_empty() {
        map.insert("children".into(), Value::Array(children));
    }
    Value::Object(map)
}

/// Render the resolved form as indented text, one visible node per line.
pub fn render_text(form: &ResolvedForm) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Stage: {}{}",
        form.stage,
        if form.settled { " (settled)" } else { "" }
    ));

    for (name, page) in &form.pages {
        if page.hidden {
            lines.push(format!("Page {} [hidden]", name));
            continue;
        }
        lines.push(format!("Page {}", name));
        for id in &page.top_level {
            if let Some(node) = form.node(id) {
                push_node(form, node, 1, &mut lines);
            }
        }
    }

    if !form.pending_options.is_empty() {
        lines.push(format!(
            "Waiting for options: {}",
            form.pending_options.join(", ")
        ));
    }

    let validation = validate(form);
    if validation.valid {
        lines.push("All visible required fields are filled.".to_string());
    } else {
        for id in &validation.missing_required {
            lines.push(format!("Missing required: {}", id));
        }
        for error in &validation.errors {
            lines.push(format!(
                "Error: {}{}",
                error
                    .node_id
                    .as_ref()
                    .map(|id| format!("{}: ", id))
                    .unwrap_or_default(),
                error.message
            ));
        }
    }

    lines.join("\n")
}

fn push_node(form: &ResolvedForm, node: &ResolvedNode, depth: usize, lines: &mut Vec<String>) {
    if node.hidden {
        return;
    }
    let mut entry = format!("{}- {} ({})", "  ".repeat(depth), node.id, node.kind);
    if node.required {
        entry.push_str(" [required]");
    }
    if node.read_only {
        entry.push_str(" [read-only]");
    }
    if let Some(value) = &node.value {
        entry.push_str(&format!(" = {}", value));
    }
    if let Some(row) = node.row_index {
        entry.push_str(&format!(" #{}", row));
    }
    lines.push(entry);
    for child in node.children.iter().filter_map(|id| form.node(id)) {
        push_node(form, child, depth + 1, lines);
    }
}
