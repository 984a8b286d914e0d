//! Concrete node tree generated from layout prototypes and a data snapshot.

pub mod claims;
pub mod generator;
pub mod mutators;
pub mod rows;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ClaimError;
use crate::layout::{ComponentPrototype, OptionsConfig};

pub use claims::{ClaimGraph, PageClaims, claim_children};
pub use generator::{GeneratorContext, generate};
pub use mutators::{Mutator, MutatorScope, ScopedMutator};
pub use rows::{GroupRowState, RepeatingGroups, row_range};

/// The single parent of a node: either a page or another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum NodeParent {
    Page(String),
    Node(String),
}

/// One instantiation of a repeating group's children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub index: usize,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: String,
    pub base_component_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub page: String,
    pub parent: NodeParent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_page_index: Option<usize>,
    /// Innermost `group[row]` path this node lives under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_path: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub data_model_bindings: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip)]
    pub props: Map<String, Value>,
}

impl LayoutNode {
    pub fn from_prototype(proto: &ComponentPrototype, page: &str, parent: NodeParent) -> Self {
        LayoutNode {
            id: proto.id.clone(),
            base_component_id: proto.id.clone(),
            kind: proto.kind.clone(),
            page: page.to_string(),
            parent,
            row_index: None,
            multi_page_index: None,
            row_path: None,
            data_model_bindings: proto.data_model_bindings.clone(),
            options: proto.options.clone(),
            children: Vec::new(),
            rows: None,
            props: proto.props.clone(),
        }
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn simple_binding(&self) -> Option<&str> {
        self.data_model_bindings
            .get("simpleBinding")
            .map(String::as_str)
    }

    pub fn is_repeating(&self) -> bool {
        self.rows.is_some()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.as_ref()?.iter().find(|row| row.index == index)
    }
}

/// One page of the generated tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPage {
    pub name: String,
    pub top_level: Vec<String>,
    /// Every node on the page, row instances included, in tree pre-order.
    pub nodes: IndexMap<String, LayoutNode>,
    #[serde(skip)]
    pub hidden: Option<Value>,
}

impl LayoutPage {
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.get(id)
    }

    pub fn parent_of(&self, node: &LayoutNode) -> Option<&LayoutNode> {
        match &node.parent {
            NodeParent::Node(parent) => self.nodes.get(parent),
            NodeParent::Page(_) => None,
        }
    }

    /// Ids of the nodes sharing `node`'s parent (and row, inside a
    /// repeating group), `node` included.
    pub fn siblings_of(&self, node: &LayoutNode) -> Vec<&str> {
        let ids: &[String] = match self.parent_of(node) {
            None => &self.top_level,
            Some(parent) => match node.row_index.and_then(|index| parent.row(index)) {
                Some(row) if parent.is_repeating() => &row.items,
                _ => &parent.children,
            },
        };
        ids.iter().map(String::as_str).collect()
    }
}

/// All generated pages plus the claim errors found along the way.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPages {
    pub pages: IndexMap<String, LayoutPage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claim_errors: Vec<ClaimError>,
}

impl LayoutPages {
    pub fn page(&self, name: &str) -> Option<&LayoutPage> {
        self.pages.get(name)
    }

    pub fn find(&self, id: &str) -> Option<&LayoutNode> {
        self.pages.values().find_map(|page| page.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.pages.values().flat_map(|page| page.nodes.values())
    }

    pub fn parent_of(&self, node: &LayoutNode) -> Option<&LayoutNode> {
        self.pages.get(&node.page)?.parent_of(node)
    }

    /// Ancestors of `node`, nearest first.
    pub fn ancestors<'a>(&'a self, node: &'a LayoutNode) -> Vec<&'a LayoutNode> {
        let mut out = Vec::new();
        let mut current = self.parent_of(node);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_of(parent);
        }
        out
    }

    /// Finds the node for component `target` as seen from `from`: siblings
    /// in the same row first, then the siblings of each ancestor, then any
    /// node with that id or base id, preferring one in the same row.
    pub fn closest(&self, from: &LayoutNode, target: &str) -> Option<&LayoutNode> {
        if let Some(page) = self.pages.get(&from.page) {
            let mut current = Some(from);
            while let Some(node) = current {
                let hit = page
                    .siblings_of(node)
                    .into_iter()
                    .filter_map(|id| page.nodes.get(id))
                    .find(|candidate| {
                        candidate.id == target || candidate.base_component_id == target
                    });
                if hit.is_some() {
                    return hit;
                }
                current = page.parent_of(node);
            }
        }

        if let Some(exact) = self.find(target) {
            return Some(exact);
        }
        let candidates: Vec<&LayoutNode> = self
            .nodes()
            .filter(|node| node.base_component_id == target)
            .collect();
        candidates
            .iter()
            .find(|node| node.row_path.is_some() && node.row_path == from.row_path)
            .or_else(|| candidates.iter().find(|node| node.row_path.is_none()))
            .or_else(|| candidates.first())
            .copied()
    }
}
