//! # llm-relay
//!
//! Provider orchestration for local and remote LLM backends.
//!
//! This crate aggregates access to multiple model servers (Ollama-style
//! and OpenAI-compatible) behind one uniform request/response contract:
//! register adapters with a [`ProviderManager`], and it handles default
//! selection, the request lifecycle, streaming decode, and the offline
//! response cache. It contains **zero** backend-specific code — concrete
//! adapters live in sibling crates and implement [`Provider`] (or its
//! object-safe counterpart [`DynProvider`]).
//!
//! # Adapter crates
//!
//! | Crate | Backend | Streaming wire format |
//! |-------|---------|-----------------------|
//! | `llm-relay-ollama` | Ollama | JSON Lines, `done` flag |
//! | `llm-relay-openai` | OpenAI-compatible (`/v1` servers, LM Studio) | SSE, `data: ` / `[DONE]` |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llm_relay::{CompletionParams, ProviderManager, RegisterOptions};
//!
//! # async fn example(adapter: Arc<dyn llm_relay::DynProvider>) -> Result<(), llm_relay::RelayError> {
//! let manager = ProviderManager::builder().build();
//! manager.register_provider("local", "Local Ollama", adapter, RegisterOptions::default());
//!
//! let answer = manager
//!     .send_prompt("Explain ownership in Rust", CompletionParams::default())
//!     .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`manager`] | Provider registry, default selection, dispatch |
//! | [`provider`] | The [`Provider`] trait and request parameters |
//! | [`request`] | Request records and the lifecycle state machine |
//! | [`stream`] | [`CompletionStream`] and stream events |
//! | [`decode`] | Generic line-buffered wire-format decoding |
//! | [`cache`] | The offline response cache |
//! | [`event`] | Registry/lifecycle events and [`RelayObserver`] |
//! | [`config`] | Settings-driven provider construction |
//! | [`error`] | Unified [`RelayError`] across all crates |

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod manager;
pub mod provider;
pub mod request;
pub mod stream;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

// ── Core re-exports ────────────────────────────────────────────────
//
// Only the types that appear in nearly every program are re-exported
// at the crate root. Everything else lives in its submodule:
//
//   llm_relay::decode::*   — FrameSyntax, Frame, decode_stream
//   llm_relay::request::*  — RequestStatus, RequestError, Priority
//   llm_relay::event::*    — RegistryEvent, LifecycleEvent
//   llm_relay::cache::*    — ResponseCache, MemoryCache
//   llm_relay::config::*   — RelaySettings, ProviderFactory
//   llm_relay::mock::*     — MockProvider (test-utils feature)

pub use config::{ProviderFactory, ProviderSettings, RelaySettings};
pub use error::RelayError;
pub use event::RelayObserver;
pub use manager::{ProviderManager, RegisterOptions, Registration};
pub use provider::{
    ChatMessage, Completion, CompletionParams, DynProvider, Provider, ProviderCapabilities,
};
pub use request::RequestHandle;
pub use stream::{CompletionStream, StreamEvent};
