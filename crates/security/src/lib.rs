//! Request authentication for LingoClaw.
//!
//! Provides:
//! - **Tokens**: HS256 bearer tokens issued and verified by [`TokenSigner`],
//!   the default [`lingoclaw_core::AuthResolver`]

pub mod token;

pub use token::{Claims, TokenSigner};
