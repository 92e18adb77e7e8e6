//! OpenAI-compatible adapter for `llm-relay`.
//!
//! Implements [`Provider`](llm_relay::Provider) against the `/v1` API
//! dialect: `/v1/completions` for prompt completions,
//! `/v1/chat/completions` for message histories, and `/v1/models` for
//! availability probes and model listing. Streaming responses arrive as
//! server-sent events and are decoded with the relay's shared decoder.
//!
//! Besides the hosted OpenAI API this adapter drives any server
//! speaking the same dialect (LM Studio, vLLM, llama.cpp's server);
//! local servers need no API key.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay::{CompletionParams, Provider};
//! use llm_relay_openai::{OpenAiConfig, OpenAiProvider};
//!
//! # async fn example() -> Result<(), llm_relay::RelayError> {
//! let provider = OpenAiProvider::new(OpenAiConfig {
//!     api_key: std::env::var("OPENAI_API_KEY").ok(),
//!     ..Default::default()
//! })?;
//!
//! let completion = provider
//!     .generate(&CompletionParams::new("Hello!"))
//!     .await?;
//! println!("{}", completion.content);
//! # Ok(())
//! # }
//! ```
//!
//! For settings-driven setups, register [`OpenAiFactory`] with the
//! manager and describe providers as `family = "openai"` entries.

#![warn(missing_docs)]

mod config;
mod convert;
mod factory;
mod provider;
mod stream;
mod types;

pub use config::OpenAiConfig;
pub use factory::OpenAiFactory;
pub use provider::OpenAiProvider;
