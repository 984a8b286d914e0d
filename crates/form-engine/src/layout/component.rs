use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::layout::{ChildRef, ComponentDef};

/// Where options for a selection component come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsSource {
    /// Repeating data-model path to read options from.
    pub group: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    pub label: String,
    pub value: String,
}

/// Options configuration of a component. Keys of `mapping` may contain the
/// `{depth}` placeholder, rewritten per repeating-group row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<OptionsSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionItem>,
}

impl OptionsConfig {
    const KEYS: [&'static str; 4] = ["optionsId", "mapping", "source", "options"];

    fn from_props(id: &str, props: &Map<String, Value>) -> Option<Self> {
        let mut subset = Map::new();
        for key in Self::KEYS {
            if let Some(value) = props.get(key) {
                subset.insert(key.to_string(), value.clone());
            }
        }
        if subset.is_empty() {
            return None;
        }
        match serde_json::from_value(Value::Object(subset)) {
            Ok(config) => Some(config),
            Err(err) => {
                warn!(component = %id, error = %err, "ignoring malformed options config");
                None
            }
        }
    }
}

/// `edit.openByDefault` accepts either a flag or a row position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenByDefault {
    Flag(bool),
    Position(String),
}

impl Default for OpenByDefault {
    fn default() -> Self {
        OpenByDefault::Flag(false)
    }
}

impl OpenByDefault {
    pub fn is_enabled(&self) -> bool {
        match self {
            OpenByDefault::Flag(flag) => *flag,
            OpenByDefault::Position(position) => matches!(position.as_str(), "first" | "last"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub key: String,
    pub value: String,
}

/// Edit settings of a repeating group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditConfig {
    #[serde(default)]
    pub multi_page: bool,
    #[serde(default)]
    pub open_by_default: OpenByDefault,
    /// `start`/`stop` entries restricting the rendered row range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<FilterEntry>,
}

impl EditConfig {
    fn filter_index(&self, key: &str) -> Option<i64> {
        self.filter
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.trim().parse().ok())
    }

    pub fn start_index(&self) -> Option<i64> {
        self.filter_index("start")
    }

    pub fn stop_index(&self) -> Option<i64> {
        self.filter_index("stop")
    }
}

/// A declared component, loaded once per layout. Rows of a repeating group
/// share the prototype of their template component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPrototype {
    pub id: String,
    pub kind: String,
    pub children: Vec<ChildRef>,
    pub data_model_bindings: IndexMap<String, String>,
    pub options: Option<OptionsConfig>,
    pub edit: Option<EditConfig>,
    /// Remaining type-specific props (`hidden`, `required`, `maxCount`, ...).
    pub props: Map<String, Value>,
}

impl ComponentPrototype {
    pub fn from_def(def: &ComponentDef) -> Self {
        let mut props = def.props.clone();

        let data_model_bindings = match props.remove("dataModelBindings") {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::String(path) => Some((key, path)),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                warn!(component = %def.id, value = %other, "ignoring non-object dataModelBindings");
                IndexMap::new()
            }
            None => IndexMap::new(),
        };

        let options = OptionsConfig::from_props(&def.id, &props);
        for key in OptionsConfig::KEYS {
            props.remove(key);
        }

        let edit = props
            .remove("edit")
            .and_then(|value| match serde_json::from_value(value) {
                Ok(edit) => Some(edit),
                Err(err) => {
                    warn!(component = %def.id, error = %err, "ignoring malformed edit config");
                    None
                }
            });

        ComponentPrototype {
            id: def.id.clone(),
            kind: def.kind.clone(),
            children: def
                .children
                .iter()
                .flatten()
                .map(|raw| ChildRef::parse(raw))
                .collect(),
            data_model_bindings,
            options,
            edit,
            props,
        }
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn max_count(&self) -> Option<u64> {
        self.props.get("maxCount").and_then(Value::as_u64)
    }

    /// Binding of the array a repeating group iterates over.
    pub fn group_binding(&self) -> Option<&str> {
        self.data_model_bindings.get("group").map(String::as_str)
    }

    pub fn is_multi_page(&self) -> bool {
        self.edit.as_ref().is_some_and(|edit| edit.multi_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(value: Value) -> ComponentDef {
        serde_json::from_value(value).expect("component def")
    }

    #[test]
    fn prototype_splits_known_props() {
        let proto = ComponentPrototype::from_def(&def(json!({
            "id": "group",
            "type": "Group",
            "children": ["0:name", "1:age"],
            "maxCount": 5,
            "dataModelBindings": { "group": "People" },
            "edit": { "multiPage": true, "filter": [{ "key": "start", "value": "1" }] },
            "hidden": ["equals", 1, 1]
        })));
        assert_eq!(proto.group_binding(), Some("People"));
        assert_eq!(proto.max_count(), Some(5));
        assert!(proto.is_multi_page());
        assert_eq!(proto.children[1].page, Some(1));
        assert_eq!(proto.edit.as_ref().and_then(EditConfig::start_index), Some(1));
        assert!(proto.prop("hidden").is_some());
        assert!(proto.prop("edit").is_none());
    }

    #[test]
    fn options_config_is_extracted() {
        let proto = ComponentPrototype::from_def(&def(json!({
            "id": "country",
            "type": "Dropdown",
            "optionsId": "countries",
            "mapping": { "People[{0}].region": "region" }
        })));
        let options = proto.options.expect("options");
        assert_eq!(options.options_id.as_deref(), Some("countries"));
        assert!(proto.props.get("optionsId").is_none());
    }

    #[test]
    fn open_by_default_accepts_positions() {
        let edit: EditConfig =
            serde_json::from_value(json!({ "openByDefault": "last" })).expect("edit");
        assert!(edit.open_by_default.is_enabled());
        let edit: EditConfig =
            serde_json::from_value(json!({ "openByDefault": false })).expect("edit");
        assert!(!edit.open_by_default.is_enabled());
    }
}
