//! HTTP transport layer for the Model Context Protocol
//!
//! Maps the `/mcp` endpoint onto session transports and exposes `/health`.

pub mod handlers;
pub mod headers;
