//! Claim phase: containers declare which components belong to them.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::{ClaimError, ClaimErrorKind};
use crate::layout::{ChildRef, PrototypeSet};
use crate::registry::PrototypeRegistry;

/// Valid claims of a single page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageClaims {
    /// Components nobody claims, in declaration order.
    pub top_level: Vec<String>,
    /// Parent id to the children it successfully claimed, in claim order.
    pub children: IndexMap<String, Vec<ChildRef>>,
}

impl PageClaims {
    pub fn children_of(&self, parent: &str) -> &[ChildRef] {
        self.children.get(parent).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimGraph {
    pub pages: IndexMap<String, PageClaims>,
    pub errors: Vec<ClaimError>,
}

fn report(
    errors: &mut Vec<ClaimError>,
    kind: ClaimErrorKind,
    page: &str,
    parent: Option<&str>,
    child: &str,
    message: String,
) {
    warn!(page = %page, child = %child, kind = kind.as_str(), "{}", message);
    errors.push(ClaimError {
        kind,
        page: page.to_string(),
        parent: parent.map(str::to_string),
        child: child.to_string(),
        message,
    });
}

/// Runs every container's claiming rule and validates the result. Broken
/// claims are reported and the child is left out; nothing here fails.
pub fn claim_children(prototypes: &PrototypeSet, registry: &PrototypeRegistry) -> ClaimGraph {
    let mut errors = Vec::new();

    for (page, id) in &prototypes.duplicates {
        report(
            &mut errors,
            ClaimErrorKind::DuplicateNodeId,
            page,
            None,
            id,
            format!("component id '{}' is already declared, ignoring the duplicate", id),
        );
    }

    // child id -> (parent id, child ref) for claims that point somewhere valid
    let mut claimants: IndexMap<String, Vec<(String, ChildRef)>> = IndexMap::new();
    // every id some container mentioned, valid or not; none of these are top-level
    let mut claimed: HashSet<String> = HashSet::new();

    for (page_name, page) in &prototypes.pages {
        for proto in page.components.values() {
            if !registry.schema_for(&proto.kind).claims_children() {
                continue;
            }
            for child in &proto.children {
                match prototypes.page_of(&child.id) {
                    None => report(
                        &mut errors,
                        ClaimErrorKind::MissingChild,
                        page_name,
                        Some(&proto.id),
                        &child.id,
                        format!(
                            "component '{}' claims '{}', which does not exist",
                            proto.id, child.id
                        ),
                    ),
                    Some(child_page) if child_page != page_name => {
                        claimed.insert(child.id.clone());
                        report(
                            &mut errors,
                            ClaimErrorKind::CrossPage,
                            page_name,
                            Some(&proto.id),
                            &child.id,
                            format!(
                                "component '{}' claims '{}' from page '{}'",
                                proto.id, child.id, child_page
                            ),
                        );
                    }
                    Some(_) => {
                        claimed.insert(child.id.clone());
                        let entry = claimants.entry(child.id.clone()).or_default();
                        if !entry.iter().any(|(parent, _)| *parent == proto.id) {
                            entry.push((proto.id.clone(), child.clone()));
                        }
                    }
                }
            }
        }
    }

    let mut graph = ClaimGraph::default();
    for (page_name, page) in &prototypes.pages {
        let mut claims = PageClaims {
            top_level: page
                .components
                .keys()
                .filter(|id| !claimed.contains(*id))
                .cloned()
                .collect(),
            children: IndexMap::new(),
        };
        for (parent_id, proto) in &page.components {
            let accepted: Vec<ChildRef> = proto
                .children
                .iter()
                .filter(|child| {
                    claimants.get(&child.id).is_some_and(|parents| {
                        parents.len() == 1 && parents[0].0 == *parent_id
                    })
                })
                .cloned()
                .collect();
            if !accepted.is_empty() {
                claims.children.insert(parent_id.clone(), accepted);
            }
        }
        graph.pages.insert(page_name.clone(), claims);
    }

    for (child, parents) in &claimants {
        if parents.len() > 1 {
            let page = prototypes.page_of(child).unwrap_or_default();
            let names: Vec<&str> = parents.iter().map(|(parent, _)| parent.as_str()).collect();
            report(
                &mut errors,
                ClaimErrorKind::DuplicateClaim,
                page,
                None,
                child,
                format!(
                    "component '{}' is claimed by multiple parents: {}",
                    child,
                    names.join(", ")
                ),
            );
        }
    }

    // Claimed components unreachable from the top level sit on a cycle.
    for (page_name, claims) in &graph.pages {
        let mut reachable = HashSet::new();
        let mut stack: Vec<&str> = claims.top_level.iter().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            stack.extend(claims.children_of(id).iter().map(|child| child.id.as_str()));
        }
        for parent_id in claims.children.keys() {
            if !reachable.contains(parent_id.as_str()) && !claims.top_level.contains(parent_id) {
                report(
                    &mut errors,
                    ClaimErrorKind::Circular,
                    page_name,
                    None,
                    parent_id,
                    format!(
                        "component '{}' is part of a circular parent/child chain",
                        parent_id
                    ),
                );
            }
        }
    }

    graph.errors = errors;
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_layout_set;

    fn graph(json: &str) -> ClaimGraph {
        let set = parse_layout_set(json).expect("layout set");
        claim_children(
            &PrototypeSet::from_layouts(&set),
            &PrototypeRegistry::with_defaults(),
        )
    }

    #[test]
    fn unclaimed_components_are_top_level() {
        let graph = graph(
            r#"{"page": {"data": {"layout": [
                {"id": "a", "type": "Group", "children": ["b"]},
                {"id": "b", "type": "Input"},
                {"id": "c", "type": "Input"}
            ]}}}"#,
        );
        let page = &graph.pages["page"];
        assert_eq!(page.top_level, vec!["a", "c"]);
        assert_eq!(page.children_of("a")[0].id, "b");
        assert!(graph.errors.is_empty());
    }

    #[test]
    fn missing_and_cross_page_claims_are_reported() {
        let graph = graph(
            r#"{
                "one": {"data": {"layout": [{"id": "g", "type": "Group", "children": ["ghost", "far"]}]}},
                "two": {"data": {"layout": [{"id": "far", "type": "Input"}]}}
            }"#,
        );
        let kinds: Vec<_> = graph.errors.iter().map(|error| error.kind).collect();
        assert_eq!(
            kinds,
            vec![ClaimErrorKind::MissingChild, ClaimErrorKind::CrossPage]
        );
        assert!(graph.pages["two"].top_level.is_empty());
        assert!(graph.pages["one"].children_of("g").is_empty());
    }

    #[test]
    fn doubly_claimed_child_is_attached_nowhere() {
        let graph = graph(
            r#"{"page": {"data": {"layout": [
                {"id": "g1", "type": "Group", "children": ["c"]},
                {"id": "g2", "type": "Panel", "children": ["c"]},
                {"id": "c", "type": "Input"}
            ]}}}"#,
        );
        let page = &graph.pages["page"];
        assert_eq!(page.top_level, vec!["g1", "g2"]);
        assert!(page.children_of("g1").is_empty());
        assert!(page.children_of("g2").is_empty());
        assert_eq!(graph.errors[0].kind, ClaimErrorKind::DuplicateClaim);
    }

    #[test]
    fn leaf_children_lists_are_ignored() {
        let graph = graph(
            r#"{"page": {"data": {"layout": [
                {"id": "i", "type": "Input", "children": ["j"]},
                {"id": "j", "type": "Input"}
            ]}}}"#,
        );
        assert_eq!(graph.pages["page"].top_level, vec!["i", "j"]);
    }

    #[test]
    fn claim_cycles_are_reported() {
        let graph = graph(
            r#"{"page": {"data": {"layout": [
                {"id": "a", "type": "Group", "children": ["b"]},
                {"id": "b", "type": "Group", "children": ["a"]}
            ]}}}"#,
        );
        assert!(graph.pages["page"].top_level.is_empty());
        assert_eq!(graph.errors.len(), 2);
        assert!(
            graph
                .errors
                .iter()
                .all(|error| error.kind == ClaimErrorKind::Circular)
        );
    }
}
