//! phalcon-mcp — MCP server exposing Phalcon devtools commands and read-only
//! access to Cursor's per-workspace state stores.
//!
//! The binary entry point is src/main.rs; the library exposes the pieces for
//! integration tests.

pub mod config;
pub mod cursor;
pub mod error;
pub mod logger;
pub mod mcp;
pub mod phalcon;
