//! Error types for the RBAC gateway

use std::io;

use thiserror::Error;

/// Result type alias for the RBAC gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// `AuthorizationDenied` and `ToolNotFound` are distinct here so audit
/// events can record the real outcome, but [`Error::to_rpc_error`] renders
/// them identically.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing, malformed or unknown credential
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Principal lacks every role the tool requires
    #[error("Role '{role}' may not access tool '{tool}'")]
    AuthorizationDenied {
        /// Requested tool
        tool: String,
        /// Primary role of the caller
        role: String,
    },

    /// No tool registered under this name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool exists and the caller may use it, but it is switched off
    #[error("Tool is currently disabled: {0}")]
    ToolDisabled(String),

    /// A tool with this name is already registered
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Arguments do not match the tool's parameter schema
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments {
        /// Requested tool
        tool: String,
        /// What was wrong
        reason: String,
    },

    /// Tool handler returned a failure
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool that failed
        tool: String,
        /// Handler error message
        message: String,
    },

    /// Per-principal rate limit exceeded
    #[error("Rate limit exceeded for '{0}'")]
    RateLimited(String),

    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A chain unit or handler faulted unexpectedly
    #[error("Middleware failure in '{0}'")]
    MiddlewareFailure(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tool execution error from any displayable handler failure
    pub fn tool_execution(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Authentication(_) => rpc_codes::UNAUTHORIZED,
            Self::AuthorizationDenied { .. }
            | Self::ToolNotFound(_)
            | Self::InvalidArguments { .. } => rpc_codes::INVALID_PARAMS,
            Self::ToolDisabled(_) => rpc_codes::TOOL_DISABLED,
            Self::ToolExecution { .. } => rpc_codes::TOOL_EXECUTION,
            Self::RateLimited(_) => rpc_codes::RATE_LIMITED,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// External `(code, message)` pair for a JSON-RPC error object.
    ///
    /// Denials are rendered exactly like a missing tool; internal faults
    /// never leak their detail.
    #[must_use]
    pub fn to_rpc_error(&self) -> (i32, String) {
        let message = match self {
            Self::Authentication(_) => "Unauthorized".to_string(),
            Self::AuthorizationDenied { tool, .. } | Self::ToolNotFound(tool) => {
                format!("Unknown tool: {tool}")
            }
            Self::ToolDisabled(tool) => format!("Tool is currently disabled: {tool}"),
            Self::InvalidArguments { .. } | Self::ToolExecution { .. } | Self::Protocol(_) => {
                self.to_string()
            }
            Self::RateLimited(_) => "Rate limit exceeded. Try again later.".to_string(),
            Self::Timeout(_) => "Request timed out".to_string(),
            Self::Json(e) => format!("Parse error: {e}"),
            _ => "Internal error".to_string(),
        };
        (self.to_rpc_code(), message)
    }

    /// Short outcome label used by audit events and metrics
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "unauthenticated",
            Self::AuthorizationDenied { .. } => "denied",
            Self::ToolNotFound(_) => "not_found",
            Self::ToolDisabled(_) => "disabled",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ToolExecution { .. } => "tool_error",
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::MiddlewareFailure(_) => "middleware_failure",
            _ => "error",
        }
    }
}

/// JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (also used for unknown and hidden tools)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Missing or invalid bearer credential
    pub const UNAUTHORIZED: i32 = -32001;
    /// Tool administratively disabled
    pub const TOOL_DISABLED: i32 = -32003;
    /// Tool handler failure
    pub const TOOL_EXECUTION: i32 = -32004;
    /// Per-principal rate limit exceeded
    pub const RATE_LIMITED: i32 = -32005;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_and_not_found_render_identically() {
        let denied = Error::AuthorizationDenied {
            tool: "approve_leave".to_string(),
            role: "employee".to_string(),
        };
        let missing = Error::ToolNotFound("approve_leave".to_string());

        assert_eq!(denied.to_rpc_error(), missing.to_rpc_error());
        assert_ne!(denied.outcome(), missing.outcome());
    }

    #[test]
    fn disabled_has_its_own_code() {
        let (code, message) = Error::ToolDisabled("approve_leave".to_string()).to_rpc_error();
        assert_eq!(code, rpc_codes::TOOL_DISABLED);
        assert!(message.contains("disabled"));
    }

    #[test]
    fn internal_faults_are_masked() {
        let (code, message) = Error::MiddlewareFailure("audit".to_string()).to_rpc_error();
        assert_eq!(code, rpc_codes::INTERNAL_ERROR);
        assert_eq!(message, "Internal error");

        let (_, message) = Error::Authentication("unknown token abc".to_string()).to_rpc_error();
        assert_eq!(message, "Unauthorized");
    }
}
