//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC validation, negotiation,
//! formatting, tool dispatch and argument schemas.

pub mod dispatcher;
pub mod rpc;
pub mod schema;
pub mod server;
