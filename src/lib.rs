//! streamgate - client-facing message exchange for a streaming media engine
//!
//! Typed messages go in on named push endpoints and come back out as
//! time-aligned blocks on named pull endpoints.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod frontend;
pub mod message;

// Messages
pub use message::{Message, MessageBody, MessageError, MessageKind};

// Exchange
pub use endpoint::EndpointRegistry;
pub use exchange::{Block, Engine, LoopbackEngine, MockEngine, Session, SessionState};

// Streaming client
pub use client::{ClientEndpoints, ResultListener, StreamingClient};

// Error handling
pub use error::{ExchangeError, Result};

// Config
pub use config::{EngineConfig, Overrides};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
