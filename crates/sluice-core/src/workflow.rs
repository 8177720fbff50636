//! Workflow definition.
//!
//! Workflows are serializable pipelines that define:
//! - Fields: the schema of the main input stream
//! - Breaker: an optional schema for a circuit-breaker stream gating the input
//! - Steps: tools to apply in order, each with its own options
//!
//! The host builds the node chain from a workflow; the core only parses and
//! validates it.

use crate::culture::Culture;
use crate::field::{FieldDescriptor, FieldSchema, SchemaError};
use crate::record::OverflowPolicy;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Workflow {
    /// Fields of the main input stream, in order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,

    /// Fields of the breaker stream. When present the input is gated by a
    /// circuit breaker before the first step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<Vec<FieldDescriptor>>,

    /// Culture used to read input text, unless a step overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<Culture>,

    /// Overflow policy for computed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowPolicy>,

    /// Tools to apply, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A step in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Tool ID to use.
    pub tool: String,

    /// Options for this tool.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, serde_json::Value>,

    /// Optional ID for this step (for log messages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Step {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            options: IndexMap::new(),
            id: None,
        }
    }

    /// Set one option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The options as a JSON object, ready to deserialize a tool config.
    pub fn options_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Name used in log messages: the ID if set, else the tool.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.tool)
    }
}

impl Workflow {
    /// Create a new empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a breaker field, enabling the breaker stage.
    pub fn breaker_field(mut self, field: FieldDescriptor) -> Self {
        self.breaker.get_or_insert_with(Vec::new).push(field);
        self
    }

    /// Add a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// The main input schema.
    pub fn schema(&self) -> Result<FieldSchema, WorkflowError> {
        if self.fields.is_empty() {
            return Err(WorkflowError::Incomplete("no input fields declared".into()));
        }
        Ok(FieldSchema::new(self.fields.iter().cloned())?)
    }

    /// The breaker schema, if the workflow has a breaker stage.
    pub fn breaker_schema(&self) -> Result<Option<FieldSchema>, WorkflowError> {
        self.breaker
            .as_ref()
            .map(|fields| FieldSchema::new(fields.iter().cloned()).map_err(WorkflowError::from))
            .transpose()
    }

    /// Check that both schemas build.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.schema()?;
        self.breaker_schema()?;
        Ok(())
    }

    /// Parse workflow from bytes, auto-detecting format.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, WorkflowError> {
        let format = path
            .and_then(detect_format)
            .unwrap_or_else(|| "yaml".to_string());

        Self::from_bytes_format(data, &format)
    }

    /// Parse workflow from bytes with explicit format.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, WorkflowError> {
        match format {
            "json" => serde_json::from_slice(data).map_err(|e| WorkflowError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_slice(data).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| WorkflowError::Parse(format!("Invalid UTF-8: {}", e)))?;
                toml::from_str(s).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            _ => Err(WorkflowError::Parse(format!(
                "Unsupported workflow format: {}",
                format
            ))),
        }
    }

    /// Serialize workflow to bytes.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>, WorkflowError> {
        match format {
            "json" => {
                serde_json::to_vec_pretty(self).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(|s| s.into_bytes())
                .map_err(|e| WorkflowError::Parse(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(|s| s.into_bytes())
                .map_err(|e| WorkflowError::Parse(e.to_string())),
            _ => Err(WorkflowError::Parse(format!(
                "Unsupported workflow format: {}",
                format
            ))),
        }
    }
}

/// Errors related to workflow parsing and validation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to parse workflow: {0}")]
    Parse(String),

    #[error("incomplete workflow: {0}")]
    Incomplete(String),

    #[error("invalid workflow schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Detect workflow format from file path extension.
pub fn detect_format(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    match ext.to_lowercase().as_str() {
        "json" => Some("json".into()),
        "yaml" | "yml" => Some("yaml".into()),
        "toml" => Some("toml".into()),
        _ => None,
    }
}
