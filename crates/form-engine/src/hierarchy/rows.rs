//! Row bookkeeping for repeating groups.

use std::ops::RangeInclusive;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::data::{array_len, is_within};
use crate::hierarchy::generate;
use crate::layout::{ComponentPrototype, PrototypeSet};
use crate::registry::PrototypeRegistry;

/// Remembered state of one repeating group node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRowState {
    /// Index of the last row, `-1` when the group has no rows.
    pub index: i64,
    /// Row currently open for editing, `-1` for none.
    #[serde(default = "GroupRowState::no_row")]
    pub edit_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_page_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model_binding: Option<String>,
}

impl GroupRowState {
    fn no_row() -> i64 {
        -1
    }

    fn fresh(row_count: usize, binding: Option<&str>, max_page: Option<usize>) -> Self {
        GroupRowState {
            index: row_count as i64 - 1,
            edit_index: -1,
            multi_page_index: max_page.map(|_| 0),
            data_model_binding: binding.map(str::to_string),
        }
    }

    /// Carries the previous state over to a new row count.
    ///
    /// A shrinking count with no change inside the group keeps the previous
    /// last index, so rows added in quick succession survive a stale data
    /// snapshot. A change inside the group that shrank it drops the edit
    /// index since it may point at deleted data.
    pub fn carry_over(
        &self,
        row_count: usize,
        changed_inside: bool,
        max_page: Option<usize>,
    ) -> Self {
        let data_index = row_count as i64 - 1;
        let shrunk = data_index < self.index;
        let index = if shrunk && !changed_inside {
            self.index
        } else {
            data_index
        };
        let reset = shrunk && changed_inside;
        let edit_index = if reset {
            -1
        } else {
            self.edit_index.min(index)
        };
        let multi_page_index = max_page.map(|max| {
            if reset {
                0
            } else {
                self.multi_page_index.unwrap_or(0).min(max)
            }
        });
        GroupRowState {
            index,
            edit_index,
            multi_page_index,
            data_model_binding: self.data_model_binding.clone(),
        }
    }
}

/// State of every repeating group node, keyed by node id (`inner-0` for a
/// group nested in row 0 of another group).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepeatingGroups {
    groups: IndexMap<String, GroupRowState>,
}

impl RepeatingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&GroupRowState> {
        self.groups.get(node_id)
    }

    pub fn insert(&mut self, node_id: impl Into<String>, state: GroupRowState) {
        self.groups.insert(node_id.into(), state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GroupRowState)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Fresh state derived from the data model alone.
    pub fn from_data(
        prototypes: &PrototypeSet,
        registry: &PrototypeRegistry,
        data: &Value,
    ) -> Self {
        Self::recompute(prototypes, registry, data, None, &[])
    }

    /// Recomputes group state for a new data snapshot. `changed` lists the
    /// data-model paths edited since `previous` was computed.
    pub fn recompute(
        prototypes: &PrototypeSet,
        registry: &PrototypeRegistry,
        data: &Value,
        previous: Option<&RepeatingGroups>,
        changed: &[String],
    ) -> Self {
        let empty = RepeatingGroups::new();
        let layout = generate(prototypes, registry, data, previous.unwrap_or(&empty));

        let mut next = RepeatingGroups::new();
        for node in layout.nodes().filter(|node| node.is_repeating()) {
            let binding = node.data_model_bindings.get("group").map(String::as_str);
            let row_count = binding.map_or(0, |binding| array_len(data, binding));
            let max_page = prototypes
                .get(&node.base_component_id)
                .and_then(max_page_index);
            let state = match previous.and_then(|previous| previous.get(&node.id)) {
                Some(prev) => {
                    let changed_inside = binding.is_some_and(|binding| {
                        changed.iter().any(|path| is_within(path, binding))
                    });
                    prev.carry_over(row_count, changed_inside, max_page)
                }
                None => GroupRowState::fresh(row_count, binding, max_page),
            };
            debug!(group = %node.id, index = state.index, edit_index = state.edit_index, "group rows");
            next.insert(node.id.clone(), state);
        }
        next
    }
}

fn max_page_index(proto: &ComponentPrototype) -> Option<usize> {
    if !proto.is_multi_page() {
        return None;
    }
    proto.children.iter().filter_map(|child| child.page).max()
}

/// Rows a repeating group renders: `0..=last` from the remembered state or
/// the data, widened to one row when the group opens by default, then
/// narrowed by the `start`/`stop` edit filter.
pub fn row_range(
    proto: &ComponentPrototype,
    state: Option<&GroupRowState>,
    row_count: usize,
) -> Option<RangeInclusive<usize>> {
    let mut last = state.map_or(row_count as i64 - 1, |state| state.index);
    let edit = proto.edit.clone().unwrap_or_default();
    if last < 0 && edit.open_by_default.is_enabled() {
        last = 0;
    }
    if last < 0 {
        return None;
    }
    let start = edit.start_index().unwrap_or(0).max(0);
    let stop = edit.stop_index().map_or(last, |stop| stop.min(last));
    if start > stop {
        return None;
    }
    Some(start as usize..=stop as usize)
}
