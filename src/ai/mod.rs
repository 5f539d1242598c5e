//! Generative-AI fallback tier
//!
//! Last resort for nationality values that no table recognizes. The answer
//! is parsed leniently; only an unreachable service is an error.

mod client;
mod parse;
mod resolver;

pub use client::{AiError, CompletionClient, MockCompletionClient, OllamaClient};
pub use parse::{extract_json, parse_nationality_response};
pub use resolver::{build_prompt, AiResolver};
