//! Data-model paths and the lookup sources expressions read from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::expr::value::format_number;

/// One dotted segment of a binding path, optionally indexed: `Group[2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

pub fn split_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('[') {
            Some((name, rest)) => PathSegment {
                name: name.to_string(),
                index: rest.trim_end_matches(']').parse().ok(),
            },
            None => PathSegment {
                name: part.to_string(),
                index: None,
            },
        })
        .collect()
}

pub fn join_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|segment| match segment.index {
            Some(index) => format!("{}[{}]", segment.name, index),
            None => segment.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Reads `path` from a data model.
pub fn get_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in split_path(path) {
        current = current.get(&segment.name)?;
        if let Some(index) = segment.index {
            current = current.get(index)?;
        }
    }
    Some(current)
}

/// Length of the array bound at `path`, zero when missing or not an array.
pub fn array_len(data: &Value, path: &str) -> usize {
    get_path(data, path)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Whether `path` points at or below `prefix` on a segment boundary.
pub fn is_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

/// Indexes a binding that lives under a repeating group's array:
/// `Group.field` under `Group` at row 1 becomes `Group[1].field`.
pub fn index_binding(binding: &str, group: &str, row: usize) -> Option<String> {
    let rest = binding.strip_prefix(group)?;
    if rest.is_empty() || rest.starts_with('.') {
        Some(format!("{}[{}]{}", group, row, rest))
    } else {
        None
    }
}

/// Copies the row indices of `reference` onto the matching leading segments
/// of `subject`, so a path written without indices resolves inside the
/// current row. Segments the subject already indexes differently stop the
/// transposition.
pub fn transpose(subject: &str, reference: &str) -> String {
    let mut segments = split_path(subject);
    let reference = split_path(reference);
    for (segment, reference) in segments.iter_mut().zip(reference.iter()) {
        if segment.name != reference.name {
            break;
        }
        match (segment.index, reference.index) {
            (None, Some(index)) => segment.index = Some(index),
            (Some(own), Some(other)) if own == other => {}
            (Some(_), _) => break,
            (None, None) => {}
        }
    }
    join_path(&segments)
}

/// String form of a data value as seen by lookup functions.
pub fn lookup_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => number.as_f64().map(format_number),
    }
}

/// Lookups available to expressions. Each takes one key and yields a string
/// or nothing.
pub trait DataSources {
    fn data_model(&self, path: &str) -> Option<String>;
    fn application_settings(&self, key: &str) -> Option<String>;
    fn instance_context(&self, key: &str) -> Option<String>;

    /// Value of another component when no node tree is available to resolve
    /// it through.
    fn component(&self, _id: &str) -> Option<String> {
        None
    }
}

/// Data sources backed by plain JSON documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonDataSources {
    pub data_model: Value,
    pub application_settings: Map<String, Value>,
    pub instance_context: Map<String, Value>,
    pub components: Map<String, Value>,
}

impl JsonDataSources {
    pub fn with_data_model(data_model: Value) -> Self {
        Self {
            data_model,
            ..Self::default()
        }
    }
}

impl DataSources for JsonDataSources {
    fn data_model(&self, path: &str) -> Option<String> {
        get_path(&self.data_model, path).and_then(lookup_string)
    }

    fn application_settings(&self, key: &str) -> Option<String> {
        self.application_settings.get(key).and_then(lookup_string)
    }

    fn instance_context(&self, key: &str) -> Option<String> {
        self.instance_context.get(key).and_then(lookup_string)
    }

    fn component(&self, id: &str) -> Option<String> {
        self.components.get(id).and_then(lookup_string)
    }
}
