//! Error conversion for tool handlers
//!
//! Tool handlers return `McpError`. Caller mistakes should surface as
//! `invalid_params`, everything else as `internal_error`.

use rmcp::ErrorData as McpError;

pub type McpResult<T> = Result<T, McpError>;

/// Conversion of a domain error into an MCP error
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for anyhow::Error {
    fn into_mcp_error(self) -> McpError {
        internal_error(self.to_string())
    }
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        internal_error(format!("JSON error: {}", self))
    }
}

/// `to_mcp_err()` on any result whose error converts
pub trait ResultExt<T> {
    fn to_mcp_err(self) -> McpResult<T>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> McpResult<T> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}
