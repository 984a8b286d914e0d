//! Layout source format: pages of flat component definitions.

pub mod component;
pub mod flatten;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LayoutError;

pub use component::{
    ComponentPrototype, EditConfig, FilterEntry, OpenByDefault, OptionItem, OptionsConfig,
    OptionsSource,
};
pub use flatten::{NestedChild, NestedComponent, flatten_layout, nest_layout};

/// A single component as it appears in a layout file. `children` holds
/// sibling ids at this stage, never nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComponentDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutData {
    pub layout: Vec<ComponentDef>,
    /// Page-level `hidden` flag or expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_width: Option<bool>,
}

/// One page file: `{ $schema?, data: { layout, hidden?, expandedWidth? } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutFile {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub data: LayoutData,
}

/// Page name to page file, in page order.
pub type LayoutSet = IndexMap<String, LayoutFile>;

/// A reference from a container to one of its children. Multi-page groups
/// encode the page as `"page:childId"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildRef {
    pub page: Option<usize>,
    pub id: String,
}

impl ChildRef {
    pub fn parse(raw: &str) -> Self {
        if let Some((prefix, id)) = raw.split_once(':')
            && !prefix.is_empty()
            && prefix.chars().all(|c| c.is_ascii_digit())
            && let Ok(page) = prefix.parse()
        {
            return ChildRef {
                page: Some(page),
                id: id.to_string(),
            };
        }
        ChildRef {
            page: None,
            id: raw.to_string(),
        }
    }

    pub fn encode(&self) -> String {
        match self.page {
            Some(page) => format!("{}:{}", page, self.id),
            None => self.id.clone(),
        }
    }
}

/// Prototypes of one page, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePrototypes {
    pub components: IndexMap<String, ComponentPrototype>,
    pub hidden: Option<Value>,
}

/// Every prototype of a layout set. Component ids are unique across pages;
/// later duplicates are dropped and listed in `duplicates` as
/// `(page, id)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrototypeSet {
    pub pages: IndexMap<String, PagePrototypes>,
    pub duplicates: Vec<(String, String)>,
}

impl PrototypeSet {
    pub fn from_layouts(layouts: &LayoutSet) -> Self {
        let mut set = PrototypeSet::default();
        let mut seen = std::collections::HashSet::new();
        for (name, file) in layouts {
            let mut page = PagePrototypes {
                components: IndexMap::new(),
                hidden: file.data.hidden.clone(),
            };
            for def in &file.data.layout {
                if !seen.insert(def.id.clone()) {
                    set.duplicates.push((name.clone(), def.id.clone()));
                    continue;
                }
                page.components
                    .insert(def.id.clone(), ComponentPrototype::from_def(def));
            }
            set.pages.insert(name.clone(), page);
        }
        set
    }

    pub fn get(&self, id: &str) -> Option<&ComponentPrototype> {
        self.pages.values().find_map(|page| page.components.get(id))
    }

    pub fn page_of(&self, id: &str) -> Option<&str> {
        self.pages
            .iter()
            .find(|(_, page)| page.components.contains_key(id))
            .map(|(name, _)| name.as_str())
    }
}

pub fn parse_layout_set(json: &str) -> Result<LayoutSet, LayoutError> {
    serde_json::from_str(json).map_err(|err| LayoutError::Parse(err.to_string()))
}

pub fn parse_layout_file(json: &str) -> Result<LayoutFile, LayoutError> {
    serde_json::from_str(json).map_err(|err| LayoutError::Parse(err.to_string()))
}

/// JSON schema describing a single layout file.
pub fn layout_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(LayoutFile)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_ref_parses_page_prefix() {
        assert_eq!(
            ChildRef::parse("1:name"),
            ChildRef {
                page: Some(1),
                id: "name".into()
            }
        );
        assert_eq!(ChildRef::parse("name").page, None);
        assert_eq!(ChildRef::parse("a:b").id, "a:b");
        assert_eq!(ChildRef::parse("2:x").encode(), "2:x");
    }

    #[test]
    fn layout_file_keeps_type_specific_props() {
        let file: LayoutFile = serde_json::from_value(json!({
            "$schema": "layout.schema.v1.json",
            "data": {
                "layout": [
                    { "id": "name", "type": "Input", "required": true }
                ],
                "hidden": ["equals", 1, 2]
            }
        }))
        .expect("deserialize");
        assert_eq!(file.schema.as_deref(), Some("layout.schema.v1.json"));
        let component = &file.data.layout[0];
        assert_eq!(component.kind, "Input");
        assert_eq!(component.props["required"], json!(true));
        assert!(component.children.is_none());
    }

    #[test]
    fn layout_set_preserves_page_order() {
        let set = parse_layout_set(
            r#"{"second": {"data": {"layout": []}}, "first": {"data": {"layout": []}}}"#,
        )
        .expect("parse");
        let names: Vec<_> = set.keys().cloned().collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn prototype_set_drops_duplicate_ids() {
        let set = parse_layout_set(
            r#"{
                "one": {"data": {"layout": [{"id": "a", "type": "Input"}]}},
                "two": {"data": {"layout": [{"id": "a", "type": "Input"}, {"id": "b", "type": "Input"}]}}
            }"#,
        )
        .expect("parse");
        let prototypes = PrototypeSet::from_layouts(&set);
        assert_eq!(prototypes.page_of("a"), Some("one"));
        assert_eq!(prototypes.page_of("b"), Some("two"));
        assert_eq!(prototypes.duplicates, vec![("two".to_string(), "a".to_string())]);
    }

    #[test]
    fn schema_describes_layout_data() {
        let schema = layout_schema();
        assert!(schema.to_string().contains("layout"));
    }
}
