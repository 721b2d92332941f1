//! MCP result payloads

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::registry::ToolDescriptor;

/// Tool definition as listed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input JSON Schema
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for Tool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        let description = descriptor.description();
        Self {
            name: descriptor.name().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            input_schema: descriptor.input_schema().clone(),
        }
    }
}

/// Content item in a tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// Text value
        text: String,
    },
}

/// Client/Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    /// Name
    pub name: String,
    /// Version
    pub version: String,
}

/// Tools capability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// List changed notification support
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Server capabilities. Only tools are offered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// `initialize` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Negotiated protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Server info
    #[serde(rename = "serverInfo")]
    pub server_info: Info,
    /// Optional instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Visible tools
    pub tools: Vec<Tool>,
}

/// `tools/call` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Content items
    pub content: Vec<Content>,
    /// Machine-readable result, when the handler returned a non-string value
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the result is a tool-level error
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolsCallResult {
    /// Wrap a handler's return value.
    ///
    /// Strings become a single text item. Other values are rendered as JSON
    /// text and also returned as `structuredContent` (objects only, as the
    /// protocol requires an object there).
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self {
                content: vec![Content::Text { text }],
                structured_content: None,
                is_error: false,
            },
            Value::Object(_) => Self {
                content: vec![Content::Text {
                    text: value.to_string(),
                }],
                structured_content: Some(value),
                is_error: false,
            },
            other => Self {
                content: vec![Content::Text {
                    text: other.to_string(),
                }],
                structured_content: Some(json!({ "result": other })),
                is_error: false,
            },
        }
    }

    /// Tool-level error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_result_is_plain_text() {
        let result = ToolsCallResult::from_value(json!("Leave request L1 approved"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "Leave request L1 approved");
        assert!(json.get("structuredContent").is_none());
        assert_eq!(json["isError"], false);
    }

    #[test]
    fn test_object_result_is_structured() {
        let result = ToolsCallResult::from_value(json!({"revenue": 10}));
        assert_eq!(result.structured_content, Some(json!({"revenue": 10})));
    }

    #[test]
    fn test_scalar_result_is_wrapped() {
        let result = ToolsCallResult::from_value(json!(42));
        assert_eq!(result.structured_content, Some(json!({"result": 42})));
    }

    #[test]
    fn test_error_result() {
        let json = serde_json::to_value(ToolsCallResult::error("boom")).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "boom");
    }
}
