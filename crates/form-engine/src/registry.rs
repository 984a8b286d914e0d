//! Component type schemas: what each type can do and which children it
//! claims.

use std::collections::HashMap;

use tracing::warn;

use crate::layout::ComponentPrototype;

/// How a component type claims the ids listed in its `children`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildClaiming {
    /// Leaf component; a `children` list is ignored.
    None,
    /// Plain container; children are instantiated once.
    Container,
    /// Container that repeats when `maxCount > 1`, plain otherwise.
    Group,
    /// Always repeats over its `group` binding.
    RepeatingGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub data_bindings: bool,
    pub options: bool,
    pub renders_in_table: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSchema {
    pub type_name: String,
    pub claiming: ChildClaiming,
    pub capabilities: Capabilities,
}

impl ComponentSchema {
    pub fn leaf(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            claiming: ChildClaiming::None,
            capabilities: Capabilities::default(),
        }
    }

    pub fn input(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            claiming: ChildClaiming::None,
            capabilities: Capabilities {
                data_bindings: true,
                options: false,
                renders_in_table: true,
            },
        }
    }

    pub fn selection(type_name: impl Into<String>) -> Self {
        Self {
            capabilities: Capabilities {
                data_bindings: true,
                options: true,
                renders_in_table: true,
            },
            ..Self::input(type_name)
        }
    }

    pub fn container(type_name: impl Into<String>, claiming: ChildClaiming) -> Self {
        Self {
            type_name: type_name.into(),
            claiming,
            capabilities: Capabilities {
                data_bindings: claiming != ChildClaiming::Container,
                options: false,
                renders_in_table: false,
            },
        }
    }

    pub fn claims_children(&self) -> bool {
        self.claiming != ChildClaiming::None
    }

    /// Whether a prototype of this type expands into rows.
    pub fn is_repeating(&self, proto: &ComponentPrototype) -> bool {
        match self.claiming {
            ChildClaiming::RepeatingGroup => true,
            ChildClaiming::Group => proto.max_count().is_some_and(|max| max > 1),
            ChildClaiming::None | ChildClaiming::Container => false,
        }
    }
}

/// Maps component type names to their schemas.
#[derive(Debug, Clone, Default)]
pub struct PrototypeRegistry {
    schemas: HashMap<String, ComponentSchema>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard component types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["Input", "TextArea", "Datepicker", "Checkbox"] {
            registry.register(ComponentSchema::input(name));
        }
        for name in ["Dropdown", "RadioButtons", "Checkboxes", "MultipleSelect"] {
            registry.register(ComponentSchema::selection(name));
        }
        for name in ["Header", "Paragraph", "Image", "Button", "NavigationButtons", "Summary"] {
            registry.register(ComponentSchema::leaf(name));
        }
        registry.register(ComponentSchema::container("Group", ChildClaiming::Group));
        registry.register(ComponentSchema::container(
            "RepeatingGroup",
            ChildClaiming::RepeatingGroup,
        ));
        registry.register(ComponentSchema::container("Panel", ChildClaiming::Container));
        registry.register(ComponentSchema::container("Accordion", ChildClaiming::Container));
        registry
    }

    pub fn register(&mut self, schema: ComponentSchema) {
        self.schemas.insert(schema.type_name.clone(), schema);
    }

    pub fn get(&self, type_name: &str) -> Option<&ComponentSchema> {
        self.schemas.get(type_name)
    }

    /// Schema for a type, falling back to a plain leaf for unknown types.
    pub fn schema_for(&self, type_name: &str) -> ComponentSchema {
        match self.get(type_name) {
            Some(schema) => schema.clone(),
            None => {
                warn!(component_type = %type_name, "unknown component type, treating as leaf");
                ComponentSchema::leaf(type_name)
            }
        }
    }
}
