//! The external LLM oracle adapter: HTTP client, prompts, cost table, and
//! tolerant response parsing.

pub mod client;
pub mod cost;
pub mod parsing;
pub mod prompts;

pub use client::{LlmClient, LlmClientConfig, LlmCompletion};
pub use prompts::PromptSet;
