//! OpenAI-compatible chat-completions provider
//!
//! Works against any endpoint speaking the chat-completions wire format,
//! including search-backed ones that return a `citations` list.

pub mod client;
pub mod knowledge;
pub mod types;

pub use client::KnowledgeClient;
pub use knowledge::ChatKnowledgeProvider;
