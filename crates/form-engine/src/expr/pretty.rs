//! Renders an expression as indented pseudo-JSON with erroring parts
//! underlined.

use indexmap::IndexMap;
use serde_json::Value;

const INDENT: &str = "  ";

/// Pretty prints `value`, underlining each path in `errors` (`[1][0]`,
/// `["args"][2]`, or `""` for the whole value) and listing its messages.
///
/// Values without errors inside them stay on one line; a composite with an
/// erroring child is broken up so the child's underline sits inside its
/// brackets.
pub fn pretty_errors(value: &Value, errors: &IndexMap<String, Vec<String>>) -> String {
    Printer { errors }.render(value, "", 0, "").lines.join("\n")
}

struct Printer<'a> {
    errors: &'a IndexMap<String, Vec<String>>,
}

struct Rendered {
    lines: Vec<String>,
    /// Line that closes the value itself, before any underline.
    content_end: usize,
}

impl Printer<'_> {
    fn has_errors_below(&self, path: &str) -> bool {
        self.errors
            .keys()
            .any(|key| key.len() > path.len() && key.starts_with(path))
    }

    fn render(&self, value: &Value, path: &str, depth: usize, prefix: &str) -> Rendered {
        let indent = INDENT.repeat(depth);
        let own = self.errors.get(path).filter(|messages| !messages.is_empty());
        let children: Vec<(String, String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (format!("{path}[{index}]"), String::new(), item))
                .collect(),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| {
                    let key = Value::String(key.clone());
                    (format!("{path}[{key}]"), format!("{key}: "), item)
                })
                .collect(),
            _ => Vec::new(),
        };

        if children.is_empty() || !self.has_errors_below(path) {
            let text = compact(value);
            let mut lines = vec![format!("{indent}{prefix}{text}")];
            if let Some(messages) = own {
                lines.push(format!(
                    "{indent}{}{}",
                    " ".repeat(prefix.chars().count()),
                    "^".repeat(text.chars().count())
                ));
                push_messages(&mut lines, messages, depth);
            }
            return Rendered {
                lines,
                content_end: 0,
            };
        }

        let (open, close) = if value.is_array() { ("[", "]") } else { ("{", "}") };
        let mut lines = vec![format!("{indent}{prefix}{open}")];
        let count = children.len();
        for (position, (child_path, child_prefix, child)) in children.into_iter().enumerate() {
            let mut rendered = self.render(child, &child_path, depth + 1, &child_prefix);
            if position + 1 < count {
                rendered.lines[rendered.content_end].push(',');
            }
            lines.extend(rendered.lines);
        }
        let content_end = lines.len();
        lines.push(format!("{indent}{close}"));
        if let Some(messages) = own {
            lines.push(format!("{indent}^"));
            push_messages(&mut lines, messages, depth);
        }
        Rendered { lines, content_end }
    }
}

fn push_messages(lines: &mut Vec<String>, messages: &[String], depth: usize) {
    let indent = INDENT.repeat(depth + 1);
    lines.extend(messages.iter().map(|message| format!("{indent}→ {message}")));
}

fn compact(value: &Value) -> String {
    match value {
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(compact).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(key, item)| format!("{}: {}", Value::String(key.clone()), compact(item)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}
