use serde::{Deserialize, Serialize};

use crate::engine::{ResolvedForm, ResolvedNode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Data-model path the error is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Visible required nodes whose binding has no value.
    pub missing_required: Vec<String>,
}

/// Checks a resolved form. Hidden nodes are skipped entirely.
pub fn validate(form: &ResolvedForm) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for error in &form.claim_errors {
        errors.push(ValidationError {
            node_id: Some(error.child.clone()),
            path: None,
            message: error.message.clone(),
            code: Some(error.kind.as_str().to_string()),
        });
    }

    for node in form.visible_nodes() {
        for message in &node.messages {
            errors.push(ValidationError {
                node_id: Some(node.id.clone()),
                path: None,
                message: message.clone(),
                code: Some("expression_failed".into()),
            });
        }

        let Some(binding) = node.data_model_bindings.get("simpleBinding") else {
            continue;
        };
        match node.value.as_deref() {
            None | Some("") => {
                if node.required {
                    missing_required.push(node.id.clone());
                }
            }
            Some(value) => {
                if let Some(error) = check_option(node, binding, value) {
                    errors.push(error);
                }
            }
        }
    }

    ValidationResult {
        valid: errors.is_empty() && missing_required.is_empty(),
        errors,
        missing_required,
    }
}

/// A bound value must be one of the node's options once they are known.
fn check_option(node: &ResolvedNode, binding: &str, value: &str) -> Option<ValidationError> {
    let options = node.options.as_ref()?;
    if options.iter().any(|option| option.value == value) {
        return None;
    }
    Some(ValidationError {
        node_id: Some(node.id.clone()),
        path: Some(binding.to_string()),
        message: format!("\"{}\" is not one of the available options", value),
        code: Some("option_mismatch".into()),
    })
}
