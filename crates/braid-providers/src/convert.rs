//! Projection of the unified tool model into provider-native schemas.
//!
//! Pure and deterministic: no I/O, no clock, no randomness. Descriptions are
//! normalized before projection to satisfy provider length limits, and
//! normalization is idempotent so already-converted tools pass through
//! unchanged.

use braid_abstraction::{ClientType, Tool};
use serde::Serialize;
use serde_json::Value;

/// Character cap for top-level tool descriptions.
pub const TOOL_DESCRIPTION_CAP: usize = 280;

/// Character cap for `description` strings inside a parameter schema.
pub const PARAM_DESCRIPTION_CAP: usize = 220;

const ELLIPSIS: char = '…';

/// Tool definitions in the shape one provider family accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderTools {
    /// OpenAI-compatible: `[{type:"function", function:{…}}]`.
    OpenAi(Vec<OpenAiToolDef>),
    /// Anthropic: `[{name, description, input_schema}]`.
    Anthropic(Vec<AnthropicToolDef>),
    /// Google: single-element `[{functionDeclarations:[…]}]`.
    Google(Vec<GoogleToolDef>),
}

impl ProviderTools {
    /// Whether the container holds no tool definitions.
    ///
    /// Request builders omit the tools field entirely when this is true.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::OpenAi(defs) => defs.is_empty(),
            Self::Anthropic(defs) => defs.is_empty(),
            Self::Google(defs) => defs.is_empty(),
        }
    }
}

/// One OpenAI chat/completions tool entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunctionDef,
}

/// The function body of an OpenAI tool entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One Anthropic tool entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The Google tool container holding all function declarations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleToolDef {
    pub function_declarations: Vec<GoogleFunctionDecl>,
}

/// One Google function declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoogleFunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One flat tool entry for the OpenAI Responses API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsesToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Collapses whitespace runs to single spaces, trims, and caps the result at
/// `cap` characters, ellipsizing with `…` counted inside the cap.
#[must_use]
pub fn normalize_description(text: &str, cap: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= cap {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(cap.saturating_sub(1)).collect();
    truncated.push(ELLIPSIS);
    truncated
}

/// Recursively caps any string value under a key literally named
/// `description` inside a parameter schema. All other structure passes
/// through unchanged.
fn cap_schema_descriptions(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "description" {
                    if let Value::String(text) = child {
                        *text = normalize_description(text, PARAM_DESCRIPTION_CAP);
                        continue;
                    }
                }
                cap_schema_descriptions(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                cap_schema_descriptions(item);
            }
        }
        _ => {}
    }
}

/// A tool with normalized descriptions, ready for projection.
fn normalize_tool(tool: &Tool) -> (String, String, Value) {
    let description = normalize_description(&tool.description, TOOL_DESCRIPTION_CAP);
    let mut parameters = tool.parameters.clone();
    cap_schema_descriptions(&mut parameters);
    (tool.name.clone(), description, parameters)
}

/// Projects a unified tool set into the shape `client_type` accepts.
///
/// An empty input produces a valid empty container so request builders can
/// omit the tools field cleanly.
#[must_use]
pub fn convert_tools_for_provider(tools: &[Tool], client_type: ClientType) -> ProviderTools {
    match client_type {
        ClientType::Anthropic => ProviderTools::Anthropic(
            tools
                .iter()
                .map(|tool| {
                    let (name, description, input_schema) = normalize_tool(tool);
                    AnthropicToolDef { name, description, input_schema }
                })
                .collect(),
        ),
        ClientType::Google => {
            if tools.is_empty() {
                return ProviderTools::Google(Vec::new());
            }
            let declarations = tools
                .iter()
                .map(|tool| {
                    let (name, description, parameters) = normalize_tool(tool);
                    GoogleFunctionDecl { name, description, parameters }
                })
                .collect();
            ProviderTools::Google(vec![GoogleToolDef { function_declarations: declarations }])
        }
        _ => ProviderTools::OpenAi(
            tools
                .iter()
                .map(|tool| {
                    let (name, description, parameters) = normalize_tool(tool);
                    OpenAiToolDef {
                        tool_type: "function".to_string(),
                        function: OpenAiFunctionDef { name, description, parameters },
                    }
                })
                .collect(),
        ),
    }
}

/// Projects a unified tool set into the flat shape the Responses API accepts.
#[must_use]
pub fn responses_tool_defs(tools: &[Tool]) -> Vec<ResponsesToolDef> {
    tools
        .iter()
        .map(|tool| {
            let (name, description, parameters) = normalize_tool(tool);
            ResponsesToolDef { tool_type: "function".to_string(), name, description, parameters }
        })
        .collect()
}
