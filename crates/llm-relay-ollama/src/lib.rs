//! Ollama adapter for `llm-relay`.
//!
//! Implements [`Provider`](llm_relay::Provider) against Ollama's HTTP
//! API: `/api/generate` for prompt completions, `/api/chat` for message
//! histories, and `/api/tags` for availability probes and model
//! listing. Streaming responses arrive as JSON Lines and are decoded
//! with the relay's shared decoder.
//!
//! Ollama runs locally and requires no authentication by default.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay::{CompletionParams, Provider};
//! use llm_relay_ollama::{OllamaConfig, OllamaProvider};
//!
//! # async fn example() -> Result<(), llm_relay::RelayError> {
//! let provider = OllamaProvider::new(OllamaConfig::default())?;
//!
//! let params = CompletionParams {
//!     prompt: "Why is the sky blue?".into(),
//!     max_tokens: Some(256),
//!     ..Default::default()
//! };
//!
//! let completion = provider.generate(&params).await?;
//! println!("{}", completion.content);
//! # Ok(())
//! # }
//! ```
//!
//! For settings-driven setups, register [`OllamaFactory`] with the
//! manager and describe providers as `family = "ollama"` entries.

#![warn(missing_docs)]

mod config;
mod convert;
mod factory;
mod provider;
mod stream;
mod types;

pub use config::OllamaConfig;
pub use factory::OllamaFactory;
pub use provider::OllamaProvider;
