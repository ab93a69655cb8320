//! Queue plan files

use anyhow::{Context, Result};
use loadagent_core::ActionRequest;
use loadagent_execution::{ExecutionPattern, LoaderDataConfig, QueueSubmission};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One load queue described in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePlan {
    /// Queue name
    pub queue: String,
    #[serde(default)]
    pub caller: Option<String>,
    pub requests: Vec<ActionRequest>,
    pub pattern: ExecutionPattern,
    #[serde(default)]
    pub parameters: LoaderDataConfig,
}

impl QueuePlan {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue plan {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid queue plan {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let plan: QueuePlan = serde_yaml::from_str(content)?;
        if plan.requests.is_empty() {
            anyhow::bail!("Queue plan '{}' has no action requests", plan.queue);
        }
        Ok(plan)
    }

    pub fn into_submission(self) -> QueueSubmission {
        let submission = QueueSubmission::new(self.queue, self.requests, self.pattern)
            .with_data_config(self.parameters);
        match self.caller {
            Some(caller) => submission.with_caller(caller),
            None => submission,
        }
    }
}
