//! MCP surface: JSON-RPC envelope, tool catalogue, prompts, stdio loop.

pub mod prompts;
pub mod protocol;
pub mod server;
pub mod tools;

pub use server::McpServer;
pub use tools::Toolbox;
