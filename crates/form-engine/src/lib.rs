#![allow(missing_docs)]

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod expr;
pub mod hierarchy;
pub mod layout;
pub mod registry;
pub mod report;
pub mod stages;
pub mod validate;
pub mod visibility;

pub use config::EngineConfig;
pub use data::{DataSources, JsonDataSources};
pub use engine::{FormEngine, FormInput, ResolvedForm, ResolvedNode, ResolvedPage};
pub use error::{ClaimError, ClaimErrorKind, EngineError, LayoutError, SchedulerError};
pub use expr::{
    EvalOptions, ExprContext, ExprError, ExprErrorKind, ExprType, ExprValue, Expression,
    evaluate, evaluate_flag, evaluate_json, pretty_errors,
};
pub use hierarchy::{
    GroupRowState, LayoutNode, LayoutPage, LayoutPages, NodeParent, RepeatingGroups, Row,
    generate,
};
pub use layout::{
    ComponentDef, ComponentPrototype, LayoutFile, LayoutSet, NestedComponent, PrototypeSet,
    flatten_layout, layout_schema, nest_layout, parse_layout_file, parse_layout_set,
};
pub use registry::{ChildClaiming, ComponentSchema, PrototypeRegistry};
pub use report::{render_json, render_text};
pub use stages::{HostTime, Stage, StageScheduler};
pub use validate::{ValidationError, ValidationResult, validate};
pub use visibility::{HiddenResolver, HiddenState, VisibilityTree, resolve_hidden};
