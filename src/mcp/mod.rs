//! Model Context Protocol surface.
//!
//! - [`protocol`]: JSON-RPC 2.0 messages and tool result envelopes
//! - [`tools`]: typed tool catalog, `inputSchema` generation, argument validation
//! - [`prompts`] and [`resources`]: templated prompts and `stash://` documents
//! - [`handler`]: method dispatch ([`StashServer`])
//! - [`transport`]: line-delimited stdio loop ([`StdioServer`])

pub mod handler;
pub mod metrics;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod tools;
pub mod transport;

pub use handler::{StashServer, SERVER_NAME, SERVER_VERSION};
pub use metrics::{CallMetrics, ToolCallReport, ToolStatus};
pub use prompts::PromptCatalog;
pub use protocol::{JsonRpcError, McpRequest, McpResponse, ToolResult, PROTOCOL_VERSION};
pub use tools::{stash_tools, ParamDef, ParamType, ToolCatalog, ToolEntry};
pub use transport::{McpHandler, StdioServer};
