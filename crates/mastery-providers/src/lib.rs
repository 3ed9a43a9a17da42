//! mastery-providers: Tutor model integrations.
//!
//! Implements the `TutorModel` trait for OpenAI-compatible endpoints,
//! Anthropic, and Ollama, and turns a `mastery.toml` into a ready evaluator.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{build_evaluator, create_tutor_model, load_config, MasteryConfig, ProviderConfig};
pub use error::ProviderError;
