//! LLM client and wire types
//!
//! Supports both Claude API and OpenAI-compatible APIs (GLM, etc.)

mod client;
mod types;

pub use client::{LlmClient, ModelClient};
pub use types::*;
