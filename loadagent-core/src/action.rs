//! Action requests and their argument templates

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// One argument slot of an action request.
///
/// In plan files a parameter placeholder is written as `{"param": "name"}`;
/// any other JSON value is taken literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentTemplate {
    Parameter {
        #[serde(rename = "param")]
        name: String,
    },
    Literal(JsonValue),
}

impl ArgumentTemplate {
    pub fn literal(value: impl Into<JsonValue>) -> Self {
        ArgumentTemplate::Literal(value.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        ArgumentTemplate::Parameter { name: name.into() }
    }

    /// Name of the parameter this slot is bound to, if any
    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            ArgumentTemplate::Parameter { name } => Some(name),
            ArgumentTemplate::Literal(_) => None,
        }
    }
}

/// Immutable description of a single action call, shared read-only by every
/// worker of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub component: String,
    pub action: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentTemplate>,
}

impl ActionRequest {
    pub fn new(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            action: action.into(),
            arguments: Vec::new(),
        }
    }

    /// Append an argument slot
    pub fn with_argument(mut self, argument: ArgumentTemplate) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_literal(self, value: impl Into<JsonValue>) -> Self {
        self.with_argument(ArgumentTemplate::literal(value))
    }

    pub fn with_parameter(self, name: impl Into<String>) -> Self {
        self.with_argument(ArgumentTemplate::parameter(name))
    }

    /// Parameter names referenced by this request, in argument order
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(ArgumentTemplate::parameter_name)
    }

    /// `component.action`, used as the key for per-action statistics
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.component, self.action)
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({} args)", self.component, self.action, self.arguments.len())
    }
}
