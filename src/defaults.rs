//! Default configuration constants for streamgate.
//!
//! Endpoint and stream names here are the wiring the streaming client expects
//! from the engine; they can be overridden through [`crate::client::ClientEndpoints`].

use std::time::Duration;

/// Capacity of the engine's bounded push queue.
///
/// Pushes block only when this many messages are waiting to be routed.
pub const INPUT_CAPACITY: usize = 1024;

/// Push endpoint receiving raw audio chunks.
pub const AUDIO_ENDPOINT: &str = "raw_audio";

/// Push endpoint receiving conversation-state markers.
pub const CONVSTATE_ENDPOINT: &str = "convstate_input";

/// Pull endpoint delivering committed results.
pub const RESULTS_ENDPOINT: &str = "results";

/// Pull endpoint delivering tentative results.
pub const TENTATIVE_RESULTS_ENDPOINT: &str = "tentative_results";

/// Engine output stream carrying committed n-best results.
pub const DECODER_STREAM: &str = "dec_output";

/// Engine output stream carrying tentative n-best results.
pub const TENTATIVE_DECODER_STREAM: &str = "dec_tentative_output";

/// Engine output stream carrying conversation state alongside results.
pub const CONVSTATE_STREAM: &str = "convstate_output";

/// How long a result consumer waits for a block before re-checking
/// cancellation.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`crate::client::StreamingClient::shutdown`] waits for consumer
/// threads after the session has closed.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default audio sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Default sample width in bits.
pub const SAMPLE_WIDTH_BITS: u16 = 16;

/// Default channel count.
pub const CHANNELS: u16 = 1;

/// Frames per pushed chunk (100ms at 16kHz).
pub const CHUNK_FRAMES: usize = 1600;

/// Tag put on messages the client pushes.
pub const CLIENT_TAG: &str = "streamgate-client";
