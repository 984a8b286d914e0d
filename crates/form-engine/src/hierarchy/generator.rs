//! Expansion phase: walks the claim graph and instantiates nodes, one set
//! per row for repeating groups.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::data::array_len;
use crate::error::{ClaimError, ClaimErrorKind};
use crate::hierarchy::claims::{PageClaims, claim_children};
use crate::hierarchy::mutators::{Mutator, MutatorScope, ScopedMutator, apply_all};
use crate::hierarchy::rows::{RepeatingGroups, row_range};
use crate::hierarchy::{LayoutNode, LayoutPage, LayoutPages, NodeParent, Row};
use crate::layout::{ChildRef, ComponentPrototype, PrototypeSet};
use crate::registry::{ComponentSchema, PrototypeRegistry};

/// Where the next node is being generated: its page, its parent, how many
/// repeating groups enclose it and the recursive mutators it inherits.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorContext {
    pub page: String,
    pub parent: NodeParent,
    pub depth: usize,
    pub inherited: Vec<ScopedMutator>,
}

impl GeneratorContext {
    pub fn root(page: &str) -> Self {
        Self {
            page: page.to_string(),
            parent: NodeParent::Page(page.to_string()),
            depth: 0,
            inherited: Vec::new(),
        }
    }

    /// Context for the children of `node_id`, carrying over the recursive
    /// mutators in `own`.
    fn child(&self, node_id: &str, own: &[ScopedMutator], depth: usize) -> Self {
        let mut inherited = self.inherited.clone();
        inherited.extend(
            own.iter()
                .filter(|scoped| scoped.scope == MutatorScope::Recursive)
                .cloned(),
        );
        Self {
            page: self.page.clone(),
            parent: NodeParent::Node(node_id.to_string()),
            depth,
            inherited,
        }
    }
}

struct Generator<'a> {
    prototypes: &'a PrototypeSet,
    registry: &'a PrototypeRegistry,
    data: &'a Value,
    groups: &'a RepeatingGroups,
    seen: HashSet<String>,
    errors: Vec<ClaimError>,
}

/// Builds the node tree for every page.
///
/// Claim errors are collected in [`LayoutPages::claim_errors`]; the
/// affected components are simply absent from the tree. Given the same
/// inputs the output is identical, ids and order included.
#[instrument(skip_all, fields(pages = prototypes.pages.len(), groups = groups.len()))]
pub fn generate(
    prototypes: &PrototypeSet,
    registry: &PrototypeRegistry,
    data: &Value,
    groups: &RepeatingGroups,
) -> LayoutPages {
    let graph = claim_children(prototypes, registry);
    let mut generator = Generator {
        prototypes,
        registry,
        data,
        groups,
        seen: HashSet::new(),
        errors: Vec::new(),
    };

    let mut pages = IndexMap::new();
    let no_claims = PageClaims::default();
    for (name, page_prototypes) in &prototypes.pages {
        let claims = graph.pages.get(name).unwrap_or(&no_claims);
        let mut page = LayoutPage {
            name: name.clone(),
            top_level: Vec::new(),
            nodes: IndexMap::new(),
            hidden: page_prototypes.hidden.clone(),
        };
        let ctx = GeneratorContext::root(name);
        for id in &claims.top_level {
            if let Some(node_id) = generator.instantiate(&mut page, claims, id, &ctx, &[]) {
                page.top_level.push(node_id);
            }
        }
        debug!(page = %name, nodes = page.nodes.len(), "generated page");
        pages.insert(name.clone(), page);
    }

    let mut claim_errors = graph.errors;
    claim_errors.extend(generator.errors);
    LayoutPages {
        pages,
        claim_errors,
    }
}

impl Generator<'_> {
    fn schema(&self, proto: &ComponentPrototype) -> ComponentSchema {
        self.registry
            .get(&proto.kind)
            .cloned()
            .unwrap_or_else(|| ComponentSchema::leaf(proto.kind.clone()))
    }

    fn instantiate(
        &mut self,
        page: &mut LayoutPage,
        claims: &PageClaims,
        proto_id: &str,
        ctx: &GeneratorContext,
        own: &[ScopedMutator],
    ) -> Option<String> {
        let proto = self.prototypes.get(proto_id)?;
        let mut node = LayoutNode::from_prototype(proto, &ctx.page, ctx.parent.clone());
        apply_all(&mut node, &ctx.inherited, own);

        if !self.seen.insert(node.id.clone()) {
            let message = format!(
                "generated node id '{}' collides with an existing node, skipping it",
                node.id
            );
            warn!(page = %ctx.page, node = %node.id, "{}", message);
            self.errors.push(ClaimError {
                kind: ClaimErrorKind::DuplicateNodeId,
                page: ctx.page.clone(),
                parent: match &ctx.parent {
                    NodeParent::Node(parent) => Some(parent.clone()),
                    NodeParent::Page(_) => None,
                },
                child: node.id,
                message,
            });
            return None;
        }

        let node_id = node.id.clone();
        let group_binding = node.data_model_bindings.get("group").cloned();
        page.nodes.insert(node_id.clone(), node);

        let schema = self.schema(proto);
        if !schema.claims_children() {
            return Some(node_id);
        }

        let children = claims.children_of(proto_id);
        let (items, rows) = if schema.is_repeating(proto) {
            let row_count = group_binding
                .as_deref()
                .map_or(0, |binding| array_len(self.data, binding));
            let range = row_range(proto, self.groups.get(&node_id), row_count);
            let mut items = Vec::new();
            let mut rows = Vec::new();
            for row in range.into_iter().flatten() {
                let row_mutator = ScopedMutator::recursive(Mutator::RowIndex {
                    group_binding: group_binding.clone(),
                    row,
                    depth: ctx.depth,
                });
                let child_ctx = ctx.child(&node_id, own, ctx.depth + 1);
                let mut row_items = Vec::new();
                for child in children {
                    let mut child_own = vec![row_mutator.clone()];
                    child_own.extend(page_mutator(proto, child));
                    if let Some(id) = self.instantiate(page, claims, &child.id, &child_ctx, &child_own)
                    {
                        row_items.push(id);
                    }
                }
                items.extend(row_items.iter().cloned());
                rows.push(Row {
                    index: row,
                    items: row_items,
                });
            }
            (items, Some(rows))
        } else {
            let child_ctx = ctx.child(&node_id, own, ctx.depth);
            let mut items = Vec::new();
            for child in children {
                let child_own: Vec<ScopedMutator> = page_mutator(proto, child).into_iter().collect();
                if let Some(id) = self.instantiate(page, claims, &child.id, &child_ctx, &child_own) {
                    items.push(id);
                }
            }
            (items, None)
        };

        if let Some(node) = page.nodes.get_mut(&node_id) {
            node.children = items;
            node.rows = rows;
        }
        Some(node_id)
    }
}

fn page_mutator(parent: &ComponentPrototype, child: &ChildRef) -> Option<ScopedMutator> {
    if !parent.is_multi_page() {
        return None;
    }
    child
        .page
        .map(|page| ScopedMutator::direct(Mutator::MultiPageIndex(page)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_layout_set;
    use serde_json::json;

    fn pages(layouts: &str, data: Value) -> LayoutPages {
        let set = parse_layout_set(layouts).expect("layouts");
        let prototypes = PrototypeSet::from_layouts(&set);
        generate(
            &prototypes,
            &PrototypeRegistry::with_defaults(),
            &data,
            &RepeatingGroups::new(),
        )
    }

    #[test]
    fn plain_container_keeps_bindings() {
        let layout = pages(
            r#"{"page": {"data": {"layout": [
                {"id": "panel", "type": "Panel", "children": ["name"]},
                {"id": "name", "type": "Input", "dataModelBindings": {"simpleBinding": "Person.name"}}
            ]}}}"#,
            json!({}),
        );
        let page = layout.page("page").expect("page");
        assert_eq!(page.top_level, vec!["panel"]);
        let name = page.node("name").expect("name");
        assert_eq!(name.parent, NodeParent::Node("panel".into()));
        assert_eq!(name.data_model_bindings["simpleBinding"], "Person.name");
        assert_eq!(name.row_index, None);
    }

    #[test]
    fn multi_page_children_get_page_index() {
        let layout = pages(
            r#"{"page": {"data": {"layout": [
                {"id": "g", "type": "Group", "maxCount": 4, "children": ["0:a", "1:b"],
                 "dataModelBindings": {"group": "Arr"}, "edit": {"multiPage": true}},
                {"id": "a", "type": "Input", "dataModelBindings": {"simpleBinding": "Arr.a"}},
                {"id": "b", "type": "Input", "dataModelBindings": {"simpleBinding": "Arr.b"}}
            ]}}}"#,
            json!({ "Arr": [{}] }),
        );
        let page = layout.page("page").expect("page");
        assert_eq!(page.node("a-0").and_then(|n| n.multi_page_index), Some(0));
        assert_eq!(page.node("b-0").and_then(|n| n.multi_page_index), Some(1));
        assert_eq!(page.node("g").and_then(|n| n.multi_page_index), None);
    }

    #[test]
    fn page_index_does_not_reach_grandchildren() {
        let layout = pages(
            r#"{"page": {"data": {"layout": [
                {"id": "g", "type": "Group", "maxCount": 4, "children": ["1:panel"],
                 "dataModelBindings": {"group": "Arr"}, "edit": {"multiPage": true}},
                {"id": "panel", "type": "Panel", "children": ["leaf"]},
                {"id": "leaf", "type": "Input", "dataModelBindings": {"simpleBinding": "Arr.v"}}
            ]}}}"#,
            json!({ "Arr": [{}] }),
        );
        let page = layout.page("page").expect("page");
        assert_eq!(page.node("panel-0").and_then(|n| n.multi_page_index), Some(1));
        let leaf = page.node("leaf-0").expect("leaf");
        assert_eq!(leaf.multi_page_index, None);
        assert_eq!(leaf.data_model_bindings["simpleBinding"], "Arr[0].v");
    }

    #[test]
    fn empty_repeating_group_has_no_rows() {
        let layout = pages(
            r#"{"page": {"data": {"layout": [
                {"id": "g", "type": "RepeatingGroup", "children": ["c"], "dataModelBindings": {"group": "Arr"}},
                {"id": "c", "type": "Input"}
            ]}}}"#,
            json!({}),
        );
        let group = layout.find("g").expect("group");
        assert_eq!(group.rows, Some(vec![]));
        assert!(group.children.is_empty());
        assert_eq!(layout.page("page").expect("page").nodes.len(), 1);
    }
}
