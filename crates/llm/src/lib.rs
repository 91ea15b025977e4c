//! Model-backed adapters for the catalog gatekeeper.
//!
//! [`OpenAiProvider`] implements both [`pipeline::ports::Adjudicator`] and
//! [`pipeline::ports::ContentGenerator`] against a chat-completions endpoint.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, prompt formatting and envelope parsing
//! live here. Whether a reply is usable is decided by the [`pipeline`] crate,
//! which treats every reply as untrusted input.

pub mod openai;
pub mod prompt;

pub use openai::{OpenAiConfig, OpenAiProvider, DEFAULT_BASE_URL, DEFAULT_MODEL};
