//! Runs one render cycle through the stage scheduler: generate the node
//! tree, mark hidden state, evaluate node expressions, resolve options.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::data::{DataSources, JsonDataSources, array_len, index_binding, transpose};
use crate::error::{ClaimError, EngineError};
use crate::expr::{ExprContext, evaluate_flag};
use crate::hierarchy::{LayoutNode, LayoutPages, NodeParent, RepeatingGroups, generate};
use crate::layout::{LayoutSet, OptionItem, OptionsConfig, PrototypeSet};
use crate::registry::PrototypeRegistry;
use crate::stages::{HostTime, Stage, StageScheduler};
use crate::visibility::{HiddenResolver, HiddenState};

const GENERATOR_HOOK: &str = "generator";
/// Polls allowed per stage transition; each transition takes two.
const MAX_POLLS: usize = 4;

fn hidden_hook(page: &str) -> String {
    format!("hidden:{}", page)
}

fn expr_hook(node_id: &str) -> String {
    format!("expr:{}", node_id)
}

fn options_hook(node_id: &str) -> String {
    format!("options:{}", node_id)
}

/// Everything a cycle reads besides the layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormInput {
    #[serde(flatten)]
    pub sources: JsonDataSources,
    /// Option lists fetched by the host, by `optionsId`.
    pub options: IndexMap<String, Vec<OptionItem>>,
    /// Data-model paths edited since the previous cycle.
    pub changed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
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
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub data_model_bindings: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    pub hidden: bool,
    pub required: bool,
    pub read_only: bool,
    /// Current value of the `simpleBinding`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionItem>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPage {
    pub hidden: bool,
    pub top_level: Vec<String>,
}

/// Outcome of a cycle. `stage` is where the scheduler stopped; it only
/// reaches `Finished` once every option list is available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedForm {
    pub stage: Stage,
    pub settled: bool,
    pub pages: IndexMap<String, ResolvedPage>,
    pub nodes: IndexMap<String, ResolvedNode>,
    pub repeating_groups: RepeatingGroups,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claim_errors: Vec<ClaimError>,
    /// Nodes still waiting for an option list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_options: Vec<String>,
}

impl ResolvedForm {
    pub fn node(&self, id: &str) -> Option<&ResolvedNode> {
        self.nodes.get(id)
    }

    pub fn visible_nodes(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.nodes.values().filter(|node| !node.hidden)
    }
}

/// Owns the loaded layout and the state carried between cycles.
#[derive(Debug)]
pub struct FormEngine {
    config: EngineConfig,
    registry: PrototypeRegistry,
    prototypes: PrototypeSet,
    scheduler: StageScheduler,
    groups: RepeatingGroups,
    clock: HostTime,
}

impl FormEngine {
    pub fn new(layouts: &LayoutSet, config: EngineConfig) -> Self {
        Self::with_registry(layouts, config, PrototypeRegistry::with_defaults())
    }

    pub fn with_registry(
        layouts: &LayoutSet,
        config: EngineConfig,
        registry: PrototypeRegistry,
    ) -> Self {
        Self {
            scheduler: StageScheduler::from_config(&config),
            prototypes: PrototypeSet::from_layouts(layouts),
            registry,
            config,
            groups: RepeatingGroups::new(),
            clock: HostTime::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prototypes(&self) -> &PrototypeSet {
        &self.prototypes
    }

    pub fn scheduler(&self) -> &StageScheduler {
        &self.scheduler
    }

    pub fn repeating_groups(&self) -> &RepeatingGroups {
        &self.groups
    }

    /// Builds the node tree for `data` and remembers the repeating-group
    /// state for the next cycle.
    pub fn hierarchy(&mut self, data: &serde_json::Value, changed: &[String]) -> LayoutPages {
        let previous = (!self.groups.is_empty()).then_some(&self.groups);
        let groups =
            RepeatingGroups::recompute(&self.prototypes, &self.registry, data, previous, changed);
        let pages = generate(&self.prototypes, &self.registry, data, &groups);
        self.groups = groups;
        pages
    }

    /// Runs a full cycle. Each stage only starts once every hook of the
    /// previous one reported; if a stage never completes, the cycle stops
    /// there and the form reports that stage.
    #[instrument(skip_all, fields(pages = self.prototypes.pages.len()))]
    pub fn resolve(&mut self, input: &FormInput) -> Result<ResolvedForm, EngineError> {
        self.scheduler.reset();
        let sources = &input.sources;

        self.scheduler.register_hook(Stage::AddNodes, GENERATOR_HOOK)?;
        let pages = self.hierarchy(&sources.data_model, &input.changed);
        for name in pages.pages.keys() {
            self.scheduler
                .register_hook(Stage::MarkHidden, &hidden_hook(name))?;
        }
        for node in pages.nodes() {
            self.scheduler
                .register_hook(Stage::EvaluateExpressions, &expr_hook(&node.id))?;
            if node
                .options
                .as_ref()
                .is_some_and(|options| options.options_id.is_some())
            {
                self.scheduler
                    .register_hook(Stage::OptionsFetched, &options_hook(&node.id))?;
            }
        }
        self.scheduler.report_done(Stage::AddNodes, GENERATOR_HOOK);
        if !self.run_until(|scheduler| scheduler.current_phase() >= Stage::MarkHidden) {
            return Ok(self.form(pages, &HiddenState::default(), IndexMap::new(), Vec::new()));
        }

        let mut resolver = HiddenResolver::new(&pages, sources, &self.config);
        for name in pages.pages.keys() {
            resolver.mark_page(name);
            self.scheduler
                .report_done(Stage::MarkHidden, &hidden_hook(name));
        }
        let hidden = resolver.finish();
        if !self.run_until(|scheduler| scheduler.current_phase() >= Stage::EvaluateExpressions) {
            return Ok(self.form(pages, &hidden, IndexMap::new(), Vec::new()));
        }

        let mut nodes = IndexMap::new();
        for node in pages.nodes() {
            nodes.insert(node.id.clone(), self.evaluate_node(node, &pages, &hidden, sources));
            self.scheduler
                .report_done(Stage::EvaluateExpressions, &expr_hook(&node.id));
        }
        if !self.run_until(|scheduler| scheduler.current_phase() >= Stage::OptionsFetched) {
            return Ok(self.form(pages, &hidden, nodes, Vec::new()));
        }

        let mut pending_options = Vec::new();
        for node in pages.nodes() {
            let Some(config) = &node.options else {
                continue;
            };
            let options = match &config.options_id {
                Some(options_id) => match input.options.get(options_id) {
                    Some(list) => {
                        self.scheduler
                            .report_done(Stage::OptionsFetched, &options_hook(&node.id));
                        Some(list.clone())
                    }
                    None => {
                        debug!(node = %node.id, options_id = %options_id, "options not fetched yet");
                        pending_options.push(node.id.clone());
                        None
                    }
                },
                None => Some(static_options(config, node, sources)),
            };
            if let Some(resolved) = nodes.get_mut(&node.id) {
                resolved.options = options;
            }
        }
        self.run_until(StageScheduler::is_settled);
        Ok(self.form(pages, &hidden, nodes, pending_options))
    }

    fn form(
        &self,
        pages: LayoutPages,
        hidden: &HiddenState,
        nodes: IndexMap<String, ResolvedNode>,
        pending_options: Vec<String>,
    ) -> ResolvedForm {
        let resolved_pages = pages
            .pages
            .iter()
            .map(|(name, page)| {
                (
                    name.clone(),
                    ResolvedPage {
                        hidden: hidden.is_page_hidden(name),
                        top_level: page.top_level.clone(),
                    },
                )
            })
            .collect();

        ResolvedForm {
            stage: self.scheduler.current_phase(),
            settled: self.scheduler.is_settled(),
            pages: resolved_pages,
            nodes,
            repeating_groups: self.groups.clone(),
            claim_errors: pages.claim_errors,
            pending_options,
        }
    }

    /// Polls the scheduler on the simulated host clock until `reached`
    /// holds. Returns `false` when hooks are still outstanding.
    fn run_until(&mut self, reached: impl Fn(&StageScheduler) -> bool) -> bool {
        let step = self.scheduler.debounce_ms().max(1);
        for _ in 0..MAX_POLLS {
            if reached(&self.scheduler) {
                return true;
            }
            self.scheduler.poll(self.clock);
            self.clock = self.clock.after(step);
        }
        if reached(&self.scheduler) {
            return true;
        }
        debug!(
            stage = %self.scheduler.current_phase(),
            pending = ?self.scheduler.pending(self.scheduler.current_phase()),
            "scheduler waiting on hooks"
        );
        false
    }

    fn evaluate_node(
        &self,
        node: &LayoutNode,
        pages: &LayoutPages,
        hidden: &HiddenState,
        sources: &JsonDataSources,
    ) -> ResolvedNode {
        let ctx = ExprContext::for_node(node, pages, sources).with_hidden(hidden);
        let mut messages = hidden.messages.get(&node.id).cloned().unwrap_or_default();
        let required = flag(node, "required", self.config.required_default, &ctx, &mut messages);
        let read_only = flag(node, "readOnly", self.config.read_only_default, &ctx, &mut messages);

        ResolvedNode {
            id: node.id.clone(),
            base_component_id: node.base_component_id.clone(),
            kind: node.kind.clone(),
            page: node.page.clone(),
            parent: node.parent.clone(),
            row_index: node.row_index,
            multi_page_index: node.multi_page_index,
            data_model_bindings: node.data_model_bindings.clone(),
            children: node.children.clone(),
            hidden: hidden.is_hidden(&node.id),
            required,
            read_only,
            value: node
                .simple_binding()
                .and_then(|binding| sources.data_model(binding)),
            options: None,
            messages,
        }
    }
}

/// Evaluates boolean prop `key`; absent means `false`, a failing expression
/// means `default` plus a message.
fn flag(
    node: &LayoutNode,
    key: &str,
    default: bool,
    ctx: &ExprContext<'_>,
    messages: &mut Vec<String>,
) -> bool {
    let Some(value) = node.prop(key) else {
        return false;
    };
    match evaluate_flag(value, ctx) {
        Ok(flag) => flag,
        Err(error) => {
            warn!(node = %node.id, prop = key, kind = %error.kind, "expression failed\n{}", error.pretty);
            messages.extend(
                error
                    .messages
                    .iter()
                    .map(|message| format!("{}: {}", key, message)),
            );
            default
        }
    }
}

/// Options that need no fetching: a `source` read from the data model, or
/// the inline `options` list.
fn static_options(
    config: &OptionsConfig,
    node: &LayoutNode,
    sources: &JsonDataSources,
) -> Vec<OptionItem> {
    let Some(source) = &config.source else {
        return config.options.clone();
    };
    let relative = |path: &str| match &node.row_path {
        Some(row) => transpose(path, row),
        None => path.to_string(),
    };
    let group = relative(&source.group);
    let value_path = relative(&source.value);
    let label_path = relative(&source.label);

    (0..array_len(&sources.data_model, &group))
        .filter_map(|row| {
            let value = index_binding(&value_path, &group, row)
                .and_then(|path| sources.data_model(&path))?;
            let label = match index_binding(&label_path, &group, row) {
                Some(path) => sources.data_model(&path).unwrap_or_else(|| value.clone()),
                None => source.label.clone(),
            };
            Some(OptionItem { label, value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_layout_set;
    use serde_json::json;

    fn engine(layouts: &str) -> FormEngine {
        FormEngine::new(
            &parse_layout_set(layouts).expect("layouts"),
            EngineConfig::default(),
        )
    }

    fn input(data: serde_json::Value) -> FormInput {
        FormInput {
            sources: JsonDataSources::with_data_model(data),
            ..FormInput::default()
        }
    }

    #[test]
    fn cycle_reaches_finished_without_fetched_options() {
        let mut engine = engine(
            r#"{"page": {"data": {"layout": [
                {"id": "name", "type": "Input", "required": true,
                 "dataModelBindings": {"simpleBinding": "name"}}
            ]}}}"#,
        );
        let form = engine.resolve(&input(json!({ "name": "Ada" }))).expect("resolve");
        assert_eq!(form.stage, Stage::Finished);
        assert!(form.settled);
        let name = form.node("name").expect("node");
        assert!(name.required);
        assert_eq!(name.value.as_deref(), Some("Ada"));
    }

    #[test]
    fn missing_option_list_holds_the_cycle() {
        let mut engine = engine(
            r#"{"page": {"data": {"layout": [
                {"id": "country", "type": "Dropdown", "optionsId": "countries",
                 "dataModelBindings": {"simpleBinding": "country"}}
            ]}}}"#,
        );
        let form = engine.resolve(&input(json!({}))).expect("resolve");
        assert_eq!(form.stage, Stage::OptionsFetched);
        assert!(!form.settled);
        assert_eq!(form.pending_options, vec!["country"]);

        let mut fetched = input(json!({}));
        fetched.options.insert(
            "countries".into(),
            vec![OptionItem {
                label: "Norway".into(),
                value: "NO".into(),
            }],
        );
        let form = engine.resolve(&fetched).expect("resolve");
        assert!(form.settled);
        assert_eq!(
            form.node("country").and_then(|node| node.options.as_ref()).map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn source_options_read_rows_of_the_data_model() {
        let mut engine = engine(
            r#"{"page": {"data": {"layout": [
                {"id": "pick", "type": "RadioButtons",
                 "source": {"group": "People", "label": "People.name", "value": "People.id"}}
            ]}}}"#,
        );
        let form = engine
            .resolve(&input(json!({
                "People": [{ "id": 1, "name": "Ada" }, { "id": 2 }]
            })))
            .expect("resolve");
        let options = form
            .node("pick")
            .and_then(|node| node.options.clone())
            .expect("options");
        assert_eq!(
            options,
            vec![
                OptionItem { label: "Ada".into(), value: "1".into() },
                OptionItem { label: "2".into(), value: "2".into() },
            ]
        );
    }

    #[test]
    fn run_until_stops_on_outstanding_hooks() {
        let mut engine = engine(r#"{"page": {"data": {"layout": [{"id": "f", "type": "Input"}]}}}"#);
        engine
            .scheduler
            .register_hook(Stage::AddNodes, "slow")
            .expect("register");
        assert!(!engine.run_until(|scheduler| scheduler.current_phase() >= Stage::MarkHidden));
        assert_eq!(engine.scheduler.current_phase(), Stage::AddNodes);

        engine.scheduler.report_done(Stage::AddNodes, "slow");
        assert!(engine.run_until(|scheduler| scheduler.current_phase() >= Stage::MarkHidden));
    }

    #[test]
    fn broken_required_expression_uses_default_and_records_message() {
        let mut engine = FormEngine::new(
            &parse_layout_set(
                r#"{"page": {"data": {"layout": [
                    {"id": "f", "type": "Input", "required": ["nope"]}
                ]}}}"#,
            )
            .expect("layouts"),
            EngineConfig {
                required_default: true,
                ..EngineConfig::default()
            },
        );
        let form = engine.resolve(&input(json!({}))).expect("resolve");
        let node = form.node("f").expect("node");
        assert!(node.required);
        assert_eq!(node.messages, vec!["required: Function \"nope\" not implemented"]);
    }
}
