//! Conversion between flat layouts (children as id lists) and nested
//! layouts (children as objects).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LayoutError;
use crate::layout::{ChildRef, ComponentDef};

/// A component with its children resolved into objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NestedChild>>,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedChild {
    #[serde(rename = "multiPageIndex", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(flatten)]
    pub component: NestedComponent,
}

/// Moves every claimed component under its parent. Components nobody claims
/// stay at the top level in their original order.
///
/// Unlike hierarchy generation, this is strict: dangling ids, duplicate ids,
/// double claims and cycles are rejected.
pub fn nest_layout(components: &[ComponentDef]) -> Result<Vec<NestedComponent>, LayoutError> {
    let mut by_id: HashMap<&str, &ComponentDef> = HashMap::new();
    for component in components {
        if by_id.insert(component.id.as_str(), component).is_some() {
            return Err(LayoutError::DuplicateId(component.id.clone()));
        }
    }

    let mut parent_of: HashMap<String, String> = HashMap::new();
    for component in components {
        for raw in component.children.iter().flatten() {
            let child = ChildRef::parse(raw);
            if !by_id.contains_key(child.id.as_str()) {
                return Err(LayoutError::MissingChild {
                    parent: component.id.clone(),
                    child: child.id,
                });
            }
            if let Some(first) = parent_of.get(&child.id) {
                return Err(LayoutError::DuplicateClaim {
                    child: child.id.clone(),
                    first: first.clone(),
                    second: component.id.clone(),
                });
            }
            parent_of.insert(child.id, component.id.clone());
        }
    }

    let mut visited = HashSet::new();
    let nested: Vec<NestedComponent> = components
        .iter()
        .filter(|component| !parent_of.contains_key(&component.id))
        .map(|component| build_nested(component, &by_id, &mut visited))
        .collect();

    // Anything not reachable from the top level sits on a claim cycle.
    if let Some(orphan) = components
        .iter()
        .find(|component| !visited.contains(component.id.as_str()))
    {
        return Err(LayoutError::CircularReference {
            cycle: trace_cycle(&orphan.id, &parent_of),
        });
    }

    Ok(nested)
}

fn build_nested<'a>(
    component: &'a ComponentDef,
    by_id: &HashMap<&str, &'a ComponentDef>,
    visited: &mut HashSet<&'a str>,
) -> NestedComponent {
    visited.insert(component.id.as_str());
    let children = component.children.as_ref().map(|refs| {
        refs.iter()
            .filter_map(|raw| {
                let child = ChildRef::parse(raw);
                let def = *by_id.get(child.id.as_str())?;
                Some(NestedChild {
                    page: child.page,
                    component: build_nested(def, by_id, visited),
                })
            })
            .collect()
    });
    NestedComponent {
        id: component.id.clone(),
        kind: component.kind.clone(),
        children,
        props: component.props.clone(),
    }
}

fn trace_cycle(start: &str, parent_of: &HashMap<String, String>) -> Vec<String> {
    let mut seen = Vec::new();
    let mut current = start.to_string();
    while !seen.contains(&current) {
        seen.push(current.clone());
        match parent_of.get(&current) {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }
    let begin = seen.iter().position(|id| *id == current).unwrap_or(0);
    let mut cycle: Vec<String> = seen[begin..].iter().rev().cloned().collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}

/// Inverse of [`nest_layout`]: emits components in pre-order with children
/// turned back into id references.
pub fn flatten_layout(nested: &[NestedComponent]) -> Vec<ComponentDef> {
    let mut out = Vec::new();
    for component in nested {
        flatten_into(component, &mut out);
    }
    out
}

fn flatten_into(component: &NestedComponent, out: &mut Vec<ComponentDef>) {
    let children = component.children.as_ref().map(|children| {
        children
            .iter()
            .map(|child| {
                ChildRef {
                    page: child.page,
                    id: child.component.id.clone(),
                }
                .encode()
            })
            .collect()
    });
    out.push(ComponentDef {
        id: component.id.clone(),
        kind: component.kind.clone(),
        children,
        props: component.props.clone(),
    });
    for child in component.children.iter().flatten() {
        flatten_into(&child.component, out);
    }
}
