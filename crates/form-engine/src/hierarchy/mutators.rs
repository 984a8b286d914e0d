//! Transforms applied to a node while it is being instantiated.

use indexmap::IndexMap;

use crate::data::index_binding;
use crate::hierarchy::LayoutNode;

/// Whether a mutator reaches only the node it was handed to, or every
/// descendant generated beneath it as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorScope {
    Direct,
    Recursive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutator {
    /// Places a node inside row `row` of a repeating group bound to
    /// `group_binding`, nested `depth` repeating groups deep.
    RowIndex {
        group_binding: Option<String>,
        row: usize,
        depth: usize,
    },
    /// Page of a multi-page repeating group the node is shown on.
    MultiPageIndex(usize),
}

impl Mutator {
    pub fn apply(&self, node: &mut LayoutNode) {
        match self {
            Mutator::RowIndex {
                group_binding,
                row,
                depth,
            } => {
                node.id = format!("{}-{}", node.id, row);
                node.row_index = Some(*row);
                if let Some(group) = group_binding {
                    for binding in node.data_model_bindings.values_mut() {
                        if let Some(indexed) = index_binding(binding, group, *row) {
                            *binding = indexed;
                        }
                    }
                    node.row_path = Some(format!("{}[{}]", group, row));
                }
                if let Some(mapping) = node
                    .options
                    .as_mut()
                    .and_then(|options| options.mapping.as_mut())
                {
                    *mapping = rewrite_mapping(mapping, group_binding.as_deref(), *row, *depth);
                }
            }
            Mutator::MultiPageIndex(page) => node.multi_page_index = Some(*page),
        }
    }
}

fn rewrite_mapping(
    mapping: &IndexMap<String, String>,
    group: Option<&str>,
    row: usize,
    depth: usize,
) -> IndexMap<String, String> {
    let placeholder = format!("{{{}}}", depth);
    mapping
        .iter()
        .map(|(key, value)| {
            let mut key = key.replace(&placeholder, &row.to_string());
            if let Some(indexed) = group.and_then(|group| index_binding(&key, group, row)) {
                key = indexed;
            }
            (key, value.clone())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedMutator {
    pub scope: MutatorScope,
    pub mutator: Mutator,
}

impl ScopedMutator {
    pub fn direct(mutator: Mutator) -> Self {
        Self {
            scope: MutatorScope::Direct,
            mutator,
        }
    }

    pub fn recursive(mutator: Mutator) -> Self {
        Self {
            scope: MutatorScope::Recursive,
            mutator,
        }
    }
}

/// Applies mutators in order: inherited recursive ones (outermost first),
/// then the ones handed to this node.
pub fn apply_all(node: &mut LayoutNode, inherited: &[ScopedMutator], own: &[ScopedMutator]) {
    for scoped in inherited.iter().chain(own) {
        scoped.mutator.apply(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::NodeParent;
    use crate::layout::{ComponentDef, ComponentPrototype};
    use serde_json::json;

    fn node(value: serde_json::Value) -> LayoutNode {
        let def: ComponentDef = serde_json::from_value(value).expect("def");
        LayoutNode::from_prototype(
            &ComponentPrototype::from_def(&def),
            "page",
            NodeParent::Page("page".into()),
        )
    }

    #[test]
    fn row_index_rewrites_id_bindings_and_mapping() {
        let mut node = node(json!({
            "id": "city",
            "type": "Dropdown",
            "dataModelBindings": { "simpleBinding": "People.city", "other": "Top.value" },
            "optionsId": "cities",
            "mapping": { "People[{0}].country": "country", "Fixed.path": "fixed" }
        }));
        Mutator::RowIndex {
            group_binding: Some("People".into()),
            row: 2,
            depth: 0,
        }
        .apply(&mut node);

        assert_eq!(node.id, "city-2");
        assert_eq!(node.row_index, Some(2));
        assert_eq!(node.row_path.as_deref(), Some("People[2]"));
        assert_eq!(node.data_model_bindings["simpleBinding"], "People[2].city");
        assert_eq!(node.data_model_bindings["other"], "Top.value");
        let mapping = node.options.as_ref().and_then(|o| o.mapping.as_ref()).expect("mapping");
        assert!(mapping.contains_key("People[2].country"));
        assert!(mapping.contains_key("Fixed.path"));
    }

    #[test]
    fn nested_rows_apply_outermost_first() {
        let mut node = node(json!({
            "id": "leaf",
            "type": "Input",
            "dataModelBindings": { "simpleBinding": "Outer.Inner.val" }
        }));
        let inherited = vec![ScopedMutator::recursive(Mutator::RowIndex {
            group_binding: Some("Outer".into()),
            row: 1,
            depth: 0,
        })];
        let own = vec![
            ScopedMutator::recursive(Mutator::RowIndex {
                group_binding: Some("Outer[1].Inner".into()),
                row: 0,
                depth: 1,
            }),
            ScopedMutator::direct(Mutator::MultiPageIndex(3)),
        ];
        apply_all(&mut node, &inherited, &own);
        assert_eq!(node.id, "leaf-1-0");
        assert_eq!(node.data_model_bindings["simpleBinding"], "Outer[1].Inner[0].val");
        assert_eq!(node.row_index, Some(0));
        assert_eq!(node.multi_page_index, Some(3));
    }
}
