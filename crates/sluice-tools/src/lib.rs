//! Leaf transform tools for Sluice.
//!
//! Each tool is a pass-through calculation: its configuration struct is the
//! [`Calculation`] run by a [`PassThroughEngine`]. Enable tools via feature
//! flags.
//!
//! # Features
//!
//! - `number-parser` (default) - parse a text field into a number
//! - `string-formatter` (default) - format a non-string field as text
//! - `all` - every tool

#[cfg(feature = "number-parser")]
pub mod number_parser;
#[cfg(feature = "string-formatter")]
pub mod string_formatter;

#[cfg(feature = "number-parser")]
pub use number_parser::NumberParser;
#[cfg(feature = "string-formatter")]
pub use string_formatter::StringFormatter;

#[cfg(any(feature = "number-parser", feature = "string-formatter"))]
use sluice_core::{Calculation, PassThroughEngine, PortSink};
use sluice_core::{Culture, OverflowPolicy, RecordSink, Step};
use tracing::debug;

/// A tool available to workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolInfo {
    pub id: &'static str,
    pub description: &'static str,
}

/// List of enabled tools based on feature flags.
pub fn tools() -> Vec<ToolInfo> {
    vec![
        #[cfg(feature = "number-parser")]
        ToolInfo {
            id: number_parser::ID,
            description: "Parse a text field into a number",
        },
        #[cfg(feature = "string-formatter")]
        ToolInfo {
            id: string_formatter::ID,
            description: "Format a non-string field as text",
        },
    ]
}

/// Workflow-wide settings applied to every tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    /// Culture for tools whose options do not name one.
    pub culture: Culture,
    pub overflow: OverflowPolicy,
}

/// Build the node for one workflow step, feeding `downstream`.
///
/// The returned sink is the step's input: pushing into it runs the tool and
/// forwards the result.
pub fn build_tool(
    step: &Step,
    context: &ToolContext,
    downstream: Box<dyn RecordSink>,
) -> Result<Box<dyn RecordSink>, ToolError> {
    let mut options = step.options_value();
    if let serde_json::Value::Object(map) = &mut options {
        map.entry("culture")
            .or_insert_with(|| context.culture.name().into());
    }
    debug!(step = step.label(), tool = %step.tool, "building tool");

    match step.tool.as_str() {
        #[cfg(feature = "number-parser")]
        number_parser::ID => {
            let config: NumberParser = parse_options(step, options)?;
            config.validate()?;
            Ok(chain(config, context, downstream))
        }
        #[cfg(feature = "string-formatter")]
        string_formatter::ID => {
            let config: StringFormatter = parse_options(step, options)?;
            config.validate()?;
            Ok(chain(config, context, downstream))
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

#[cfg(any(feature = "number-parser", feature = "string-formatter"))]
fn parse_options<T: serde::de::DeserializeOwned>(
    step: &Step,
    options: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(options).map_err(|e| ToolError::InvalidOptions {
        tool: step.tool.clone(),
        message: e.to_string(),
    })
}

#[cfg(any(feature = "number-parser", feature = "string-formatter"))]
fn chain<C>(config: C, context: &ToolContext, downstream: Box<dyn RecordSink>) -> Box<dyn RecordSink>
where
    C: Calculation + 'static,
    C::Output: 'static,
{
    let engine = PassThroughEngine::new(config, downstream).with_overflow_policy(context.overflow);
    Box::new(PortSink::new(engine, ()))
}

/// Errors raised while building tools.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid options for {tool}: {message}")]
    InvalidOptions { tool: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::NullSink;

    #[test]
    fn test_tools_listed() {
        let ids: Vec<_> = tools().into_iter().map(|t| t.id).collect();
        assert!(ids.contains(&"number-parser"));
        assert!(ids.contains(&"string-formatter"));
    }

    #[test]
    fn test_unknown_tool() {
        let err = build_tool(&Step::new("teleport"), &ToolContext::default(), Box::new(NullSink))
            .err()
            .unwrap();
        assert_eq!(err, ToolError::UnknownTool("teleport".into()));
    }

    #[test]
    fn test_bad_options() {
        let step = Step::new("number-parser").option("output_type", "date");
        let err = build_tool(&step, &ToolContext::default(), Box::new(NullSink))
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::InvalidOptions { .. }));

        let step = Step::new("string-formatter").option("output_field_length", "long");
        assert!(build_tool(&step, &ToolContext::default(), Box::new(NullSink)).is_err());

        let step = Step::new("string-formatter").option("culture", "xx-XX");
        assert!(build_tool(&step, &ToolContext::default(), Box::new(NullSink)).is_err());
    }
}
