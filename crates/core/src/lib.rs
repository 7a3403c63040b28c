//! # LingoClaw Core
//!
//! Domain types, traits, and error definitions for the LingoClaw
//! language-learning backend. Every other crate depends inward on this one.
//!
//! Collaborators (providers, repositories, the vector index, token
//! resolution) are traits here; implementations live in their own crates and
//! are injected through a per-request [`Session`].

pub mod auth;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod provider;
pub mod record;
pub mod session;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root for ergonomics
pub use auth::{AuthResolver, Principal};
pub use error::{Error, Result};
pub use event::AgentEvent;
pub use message::{Message, Role};
pub use model::{ModelSet, ModelSpec, ModelTier};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use record::{Repositories, Repository, Resource, VectorIndex};
pub use session::Session;
pub use tool::{Tool, ToolCall, ToolResult, ToolRegistry};
