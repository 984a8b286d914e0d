//! Hidden state of pages, nodes and repeating-group rows.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::data::DataSources;
use crate::expr::{ExprContext, evaluate_flag};
use crate::hierarchy::{LayoutNode, LayoutPages};

/// One step into the visibility tree: a keyed child of an object node or a
/// row of a list node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeKey {
    Key(String),
    Row(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityNode {
    Object {
        hidden: Option<bool>,
        children: IndexMap<String, VisibilityNode>,
    },
    List {
        hidden: Option<bool>,
        rows: BTreeMap<usize, VisibilityNode>,
    },
}

impl Default for VisibilityNode {
    fn default() -> Self {
        VisibilityNode::Object {
            hidden: None,
            children: IndexMap::new(),
        }
    }
}

impl VisibilityNode {
    fn list() -> Self {
        VisibilityNode::List {
            hidden: None,
            rows: BTreeMap::new(),
        }
    }

    pub fn hidden(&self) -> Option<bool> {
        match self {
            VisibilityNode::Object { hidden, .. } | VisibilityNode::List { hidden, .. } => *hidden,
        }
    }

    fn set_flag(&mut self, flag: Option<bool>) {
        match self {
            VisibilityNode::Object { hidden, .. } | VisibilityNode::List { hidden, .. } => {
                *hidden = flag
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            VisibilityNode::Object { hidden, children } => hidden.is_none() && children.is_empty(),
            VisibilityNode::List { hidden, rows } => hidden.is_none() && rows.is_empty(),
        }
    }

    fn child(&self, key: &TreeKey) -> Option<&VisibilityNode> {
        match (self, key) {
            (VisibilityNode::Object { children, .. }, TreeKey::Key(key)) => children.get(key),
            (VisibilityNode::List { rows, .. }, TreeKey::Row(row)) => rows.get(row),
            _ => None,
        }
    }

    /// Child at `key`, created as a placeholder of the kind `next` needs.
    /// An empty placeholder of the wrong kind is converted.
    fn child_or_insert(&mut self, key: &TreeKey, next: Option<&TreeKey>) -> &mut VisibilityNode {
        if matches!(key, TreeKey::Row(_))
            && matches!(self, VisibilityNode::Object { children, .. } if children.is_empty())
        {
            *self = VisibilityNode::List {
                hidden: self.hidden(),
                rows: BTreeMap::new(),
            };
        }
        let fresh = match next {
            Some(TreeKey::Row(_)) => VisibilityNode::list(),
            _ => VisibilityNode::default(),
        };
        match (self, key) {
            (VisibilityNode::List { rows, .. }, TreeKey::Row(row)) => {
                rows.entry(*row).or_insert(fresh)
            }
            (VisibilityNode::List { rows, .. }, TreeKey::Key(key)) => {
                // keyed access into a list means the group lost its rows;
                // park the key under row 0
                warn!(key = %key, "keyed visibility entry under a list node");
                match rows.entry(0).or_default() {
                    VisibilityNode::Object { children, .. } => {
                        children.entry(key.clone()).or_insert(fresh)
                    }
                    list => list,
                }
            }
            (VisibilityNode::Object { children, .. }, TreeKey::Key(key)) => {
                children.entry(key.clone()).or_insert(fresh)
            }
            (VisibilityNode::Object { children, .. }, TreeKey::Row(row)) => {
                // non-empty object: keep its keyed children and store the row by name
                children.entry(format!("[{}]", row)).or_insert(fresh)
            }
        }
    }

    fn remove_child(&mut self, key: &TreeKey) -> Option<VisibilityNode> {
        match (self, key) {
            (VisibilityNode::Object { children, .. }, TreeKey::Key(key)) => {
                children.shift_remove(key)
            }
            (VisibilityNode::List { rows, .. }, TreeKey::Row(row)) => rows.remove(row),
            _ => None,
        }
    }
}

/// Tree of hidden flags mirroring the node hierarchy: pages, then component
/// base ids, with list nodes holding repeating-group rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityTree {
    root: VisibilityNode,
}

impl VisibilityTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, path: &[TreeKey]) -> Option<&VisibilityNode> {
        path.iter()
            .try_fold(&self.root, |node, key| node.child(key))
    }

    fn node_mut(&mut self, path: &[TreeKey]) -> &mut VisibilityNode {
        let mut current = &mut self.root;
        for (position, key) in path.iter().enumerate() {
            current = current.child_or_insert(key, path.get(position + 1));
        }
        current
    }

    pub fn contains(&self, path: &[TreeKey]) -> bool {
        self.node(path).is_some()
    }

    /// Makes sure `path` exists without touching any flag.
    pub fn insert(&mut self, path: &[TreeKey]) {
        self.node_mut(path);
    }

    pub fn set_hidden(&mut self, path: &[TreeKey], hidden: bool) {
        self.node_mut(path).set_flag(Some(hidden));
    }

    /// Clears the flag at `path` and removes it along with any placeholders
    /// left empty above it.
    pub fn remove(&mut self, path: &[TreeKey]) {
        let Some((last, parent)) = path.split_last() else {
            self.root = VisibilityNode::default();
            return;
        };
        if !self.contains(path) {
            return;
        }
        let parent_node = self.node_mut(parent);
        parent_node.remove_child(last);
        self.prune(parent);
    }

    /// Removes the subtree of row `row` under the list at `path`. Other rows
    /// keep their indices.
    pub fn remove_row(&mut self, path: &[TreeKey], row: usize) {
        if !self.contains(path) {
            return;
        }
        self.node_mut(path).remove_child(&TreeKey::Row(row));
        self.prune(path);
    }

    fn prune(&mut self, path: &[TreeKey]) {
        for depth in (1..=path.len()).rev() {
            let Some((last, parent)) = path[..depth].split_last() else {
                break;
            };
            if !self.node(&path[..depth]).is_some_and(VisibilityNode::is_empty) {
                break;
            }
            self.node_mut(parent).remove_child(last);
        }
    }

    /// The flag stored at `path` itself, `None` when unset or absent.
    pub fn is_hidden_raw(&self, path: &[TreeKey]) -> Option<bool> {
        self.node(path).and_then(VisibilityNode::hidden)
    }

    /// Whether the node at `path` or any of its ancestors is hidden. Paths
    /// missing from the tree are reported and treated as hidden.
    pub fn is_hidden(&self, path: &[TreeKey]) -> bool {
        let mut current = &self.root;
        let mut hidden = current.hidden() == Some(true);
        for key in path {
            match current.child(key) {
                Some(child) => {
                    current = child;
                    hidden |= current.hidden() == Some(true);
                }
                None => {
                    warn!(path = ?path, "visibility requested for unknown path");
                    return true;
                }
            }
        }
        hidden
    }
}

/// Resolved hidden flag of every node, by node id, plus page flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenState {
    pub pages: IndexMap<String, bool>,
    pub nodes: IndexMap<String, bool>,
    /// Errors from `hidden` expressions, by node id (or page name).
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub messages: IndexMap<String, Vec<String>>,
}

impl HiddenState {
    pub fn is_hidden(&self, node_id: &str) -> bool {
        match self.nodes.get(node_id) {
            Some(hidden) => *hidden,
            None => {
                warn!(node = node_id, "hidden state requested for unknown node");
                true
            }
        }
    }

    pub fn is_page_hidden(&self, page: &str) -> bool {
        self.pages.get(page).copied().unwrap_or(false)
    }
}

/// Path of `node` in the visibility tree: page, then the base id of each
/// ancestor, with the row index after every repeating group.
pub fn node_path(pages: &LayoutPages, node: &LayoutNode) -> Vec<TreeKey> {
    let mut chain = pages.ancestors(node);
    chain.reverse();
    chain.push(node);

    let mut path = vec![TreeKey::Key(node.page.clone())];
    for (position, current) in chain.iter().enumerate() {
        path.push(TreeKey::Key(current.base_component_id.clone()));
        if current.is_repeating()
            && let Some(next) = chain.get(position + 1)
        {
            path.push(TreeKey::Row(next.row_index.unwrap_or(0)));
        }
    }
    path
}

/// Evaluates `hidden` and `hiddenRow` expressions page by page and resolves
/// the result per node.
pub struct HiddenResolver<'a> {
    pages: &'a LayoutPages,
    sources: &'a dyn DataSources,
    config: &'a EngineConfig,
    tree: VisibilityTree,
    messages: IndexMap<String, Vec<String>>,
}

impl<'a> HiddenResolver<'a> {
    pub fn new(
        pages: &'a LayoutPages,
        sources: &'a dyn DataSources,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            pages,
            sources,
            config,
            tree: VisibilityTree::new(),
            messages: IndexMap::new(),
        }
    }

    pub fn tree(&self) -> &VisibilityTree {
        &self.tree
    }

    fn flag(&mut self, owner: &str, value: &Value, ctx: &ExprContext<'_>) -> bool {
        match evaluate_flag(value, ctx) {
            Ok(flag) => flag,
            Err(error) => {
                warn!(owner, kind = %error.kind, path = %error.path, "hidden expression failed\n{}", error.pretty);
                self.messages
                    .entry(owner.to_string())
                    .or_default()
                    .extend(error.messages);
                self.config.hidden_default
            }
        }
    }

    /// Marks one page: its own `hidden` flag, each node's `hidden` and each
    /// repeating group's per-row `hiddenRow`.
    pub fn mark_page(&mut self, page_name: &str) {
        let pages = self.pages;
        let Some(page) = pages.page(page_name) else {
            warn!(page = page_name, "cannot mark unknown page");
            return;
        };
        let page_path = vec![TreeKey::Key(page_name.to_string())];
        self.tree.insert(&page_path);
        if let Some(expr) = &page.hidden {
            let ctx = ExprContext {
                node: None,
                pages: Some(pages),
                hidden: None,
                sources: self.sources,
            };
            let hidden = self.flag(page_name, expr, &ctx);
            self.tree.set_hidden(&page_path, hidden);
        }

        for node in page.nodes.values() {
            let path = node_path(pages, node);
            let ctx = ExprContext::for_node(node, pages, self.sources);
            match node.prop("hidden") {
                Some(expr) => {
                    let hidden = self.flag(&node.id, expr, &ctx);
                    self.tree.set_hidden(&path, hidden);
                }
                None => self.tree.insert(&path),
            }

            if let (Some(expr), Some(rows)) = (node.prop("hiddenRow"), &node.rows) {
                for row in rows {
                    let mut row_node = node.clone();
                    row_node.row_index = Some(row.index);
                    row_node.row_path = node
                        .data_model_bindings
                        .get("group")
                        .map(|group| format!("{}[{}]", group, row.index));
                    let ctx = ExprContext::for_node(&row_node, pages, self.sources);
                    let hidden = self.flag(&node.id, expr, &ctx);
                    let mut row_path = path.clone();
                    row_path.push(TreeKey::Row(row.index));
                    self.tree.set_hidden(&row_path, hidden);
                }
            }
        }
        debug!(page = page_name, nodes = page.nodes.len(), "marked hidden");
    }

    pub fn finish(self) -> HiddenState {
        let mut state = HiddenState {
            messages: self.messages,
            ..HiddenState::default()
        };
        for name in self.pages.pages.keys() {
            let path = [TreeKey::Key(name.clone())];
            if self.tree.contains(&path) {
                state.pages.insert(name.clone(), self.tree.is_hidden(&path));
            }
        }
        for node in self.pages.nodes() {
            let path = node_path(self.pages, node);
            if self.tree.contains(&path) {
                state
                    .nodes
                    .insert(node.id.clone(), self.tree.is_hidden(&path));
            }
        }
        state
    }
}

/// Marks every page and resolves the hidden state of the whole hierarchy.
pub fn resolve_hidden(
    pages: &LayoutPages,
    sources: &dyn DataSources,
    config: &EngineConfig,
) -> HiddenState {
    let mut resolver = HiddenResolver::new(pages, sources, config);
    for name in pages.pages.keys() {
        resolver.mark_page(name);
    }
    resolver.finish()
}
