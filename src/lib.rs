//! # mcphub
//!
//! Run several MCP backends (local processes or remote streamable HTTP endpoints) behind one
//! local endpoint, start and stop them independently, and group them into profiles that are
//! each served at their own path.
//!
//! ## Features
//!
//! - **core** - backend registry, runtime checker, connection pool, lifecycle supervisor and profile router
//! - **server** - hyper HTTP endpoint serving `/mcp` and `/{profile}/mcp`
//! - **full** - Enables all features
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! mcphub = { version = "0.1.0", features = ["full"] }
//! ```
//!
//! ## Example
//!
//! ```rust,no_run,ignore
//! use mcphub::mcphub_core::{BackendDescriptor, McpHub, MemoryConfigStore};
//! use mcphub::mcphub_server_hyper::HubServerBuilder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let hub = McpHub::builder(Arc::new(MemoryConfigStore::new())).build().await?;
//!     hub.install(BackendDescriptor::process("files", "npx", "-y @modelcontextprotocol/server-filesystem .")).await?;
//!     hub.initialize().await;
//!     HubServerBuilder::new(hub).bind().await?.run().await?;
//!     Ok(())
//! }
//! ```

// Re-export wire protocol types (always available)
pub use mcphub_proto::*;

#[cfg(feature = "core")]
pub use mcphub_core;

#[cfg(feature = "server")]
pub use mcphub_server_hyper;

// Re-export commonly used dependencies for convenience
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants_reexported() {
        assert_eq!(MCP_PATH_SEGMENT, "mcp");
        assert_eq!(DEFAULT_PORT, 7195);
    }
}
