//! Weather domain exposed over the MCP protocol
//!
//! Tool handlers, report rendering and shared formatting.

pub mod report;
pub mod tools;
pub mod utils;
