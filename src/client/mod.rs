//! Streaming recognition client.
//!
//! A [`ChunkProducer`] pushes audio chunks and conversation-state markers in
//! lockstep while two [`ResultPuller`] threads drain the committed and
//! tentative result endpoints into a [`ResultListener`].

pub mod consumer;
pub mod listener;
pub mod producer;
pub mod streaming;

pub use consumer::{CancelToken, ResultPuller, result_text};
pub use listener::{CollectorListener, ResultEvent, ResultKind, ResultListener, StdoutListener};
pub use producer::{AudioFormat, ChunkProducer, ChunkState};
pub use streaming::{ClientEndpoints, StreamingClient};
