//! LLM provider implementations for LingoClaw.
//!
//! All providers implement the `lingoclaw_core::Provider` trait.
//! [`OpenAiProvider`] talks to the upstream API; [`MeteredProvider`] wraps it
//! per request to enforce the caller's token quota.

pub mod metered;
pub mod openai;

pub use metered::MeteredProvider;
pub use openai::{OpenAiProvider, SseDecoder};
