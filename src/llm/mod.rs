//! Local LLM integration.

pub mod client;

pub use client::{LlmClient, LlmConfig, LlmError, DEFAULT_DIGEST_PROMPT};
