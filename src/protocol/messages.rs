//! JSON-RPC envelope and method decoding

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::rpc_codes;
use crate::middleware::Method;

/// JSON-RPC request or notification as received
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID; absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Whether this is a notification (no reply expected)
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID (`null` when the request could not be parsed)
    pub id: Option<RequestId>,
    /// Result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// `tools/call` params
#[derive(Debug, Clone, Deserialize)]
struct ToolsCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Why a request could not be turned into a [`Method`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// JSON-RPC error code
    pub code: i32,
    /// Message for the client
    pub message: String,
}

impl DecodeError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: rpc_codes::INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// Parse a request body. Fails with a `-32700`/`-32600` pair.
pub fn parse_request(body: &[u8]) -> std::result::Result<JsonRpcRequest, DecodeError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| DecodeError {
        code: rpc_codes::PARSE_ERROR,
        message: format!("Parse error: {e}"),
    })?;
    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| DecodeError {
        code: rpc_codes::INVALID_REQUEST,
        message: format!("Invalid request: {e}"),
    })?;
    if request.jsonrpc != "2.0" {
        return Err(DecodeError {
            code: rpc_codes::INVALID_REQUEST,
            message: "Invalid request: jsonrpc must be \"2.0\"".to_string(),
        });
    }
    Ok(request)
}

/// Map a method name and its params to a [`Method`]
pub fn decode_method(
    method: &str,
    params: Option<&Value>,
) -> std::result::Result<Method, DecodeError> {
    match method {
        "initialize" => Ok(Method::Initialize {
            protocol_version: params
                .and_then(|p| p.get("protocolVersion"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "ping" => Ok(Method::Ping),
        "tools/list" => Ok(Method::ListTools),
        "tools/call" => {
            let params = params.ok_or_else(|| DecodeError::invalid_params("Missing params"))?;
            let params: ToolsCallParams = serde_json::from_value(params.clone())
                .map_err(|e| DecodeError::invalid_params(format!("Invalid params: {e}")))?;
            let arguments = match params.arguments {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map,
                Some(_) => {
                    return Err(DecodeError::invalid_params(
                        "Invalid params: arguments must be an object",
                    ));
                }
            };
            Ok(Method::CallTool {
                name: params.name,
                arguments,
            })
        }
        other => Err(DecodeError {
            code: rpc_codes::METHOD_NOT_FOUND,
            message: format!("Method not found: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_request_and_notification() {
        let req = parse_request(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(7)));
        assert!(!req.is_notification());

        let note =
            parse_request(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(note.is_notification());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_request(b"{not json").unwrap_err().code, rpc_codes::PARSE_ERROR);
        assert_eq!(
            parse_request(br#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err().code,
            rpc_codes::INVALID_REQUEST
        );
        assert_eq!(
            parse_request(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err().code,
            rpc_codes::INVALID_REQUEST
        );
    }

    #[test]
    fn test_decode_tools_call() {
        let params = json!({"name": "apply_leave", "arguments": {"employee_id": "E1"}});
        let method = decode_method("tools/call", Some(&params)).unwrap();
        assert_eq!(method.tool_name(), Some("apply_leave"));

        let no_args = json!({"name": "get_company_financials"});
        assert!(matches!(
            decode_method("tools/call", Some(&no_args)).unwrap(),
            Method::CallTool { arguments, .. } if arguments.is_empty()
        ));
    }

    #[test]
    fn test_decode_rejects_bad_params() {
        let bad = json!({"name": "apply_leave", "arguments": [1, 2]});
        assert_eq!(
            decode_method("tools/call", Some(&bad)).unwrap_err().code,
            rpc_codes::INVALID_PARAMS
        );
        assert_eq!(
            decode_method("tools/call", None).unwrap_err().code,
            rpc_codes::INVALID_PARAMS
        );
        assert_eq!(
            decode_method("resources/list", None).unwrap_err().code,
            rpc_codes::METHOD_NOT_FOUND
        );
    }

    #[test]
    fn test_decode_initialize_version() {
        let params = json!({"protocolVersion": "2025-06-18", "capabilities": {}});
        assert_eq!(
            decode_method("initialize", Some(&params)).unwrap(),
            Method::Initialize {
                protocol_version: Some("2025-06-18".to_string())
            }
        );
    }

    #[test]
    fn test_error_response_shape() {
        let resp = JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, "Parse error");
        let json = serde_json::to_value(resp).unwrap();
        assert!(json["id"].is_null());
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32700);
    }
}
