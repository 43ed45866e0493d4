//! MCP Common - helpers shared by the MCP servers in this workspace
//!
//! - **Initialization**: [`init_tracing`] sets up stderr logging
//! - **Results**: [`json_success`] and [`text_success`] build `CallToolResult`s
//! - **Errors**: [`IntoMcpError`], [`invalid_params`] and [`internal_error`]

pub mod error;
pub mod init;
pub mod result;

pub use error::{internal_error, invalid_params, IntoMcpError, McpResult, ResultExt};
pub use init::init_tracing;
pub use result::{json_success, text_success};

pub use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
