use crate::client::consumer::{CancelToken, ResultPuller};
use crate::client::listener::{ResultKind, ResultListener};
use crate::client::producer::{AudioFormat, ChunkProducer};
use crate::defaults;
use crate::endpoint::EndpointRegistry;
use crate::error::{ExchangeError, Result};
use crate::exchange::Session;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Endpoint and stream names the streaming client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEndpoints {
    /// Push endpoint for audio chunks.
    pub audio: String,
    /// Push endpoint for conversation-state markers.
    pub convstate: String,
    /// Pull endpoint for committed results.
    pub results: String,
    /// Pull endpoint for tentative results.
    pub tentative_results: String,
    pub decoder_stream: String,
    pub tentative_decoder_stream: String,
    pub convstate_stream: String,
}

impl Default for ClientEndpoints {
    fn default() -> Self {
        Self {
            audio: defaults::AUDIO_ENDPOINT.to_string(),
            convstate: defaults::CONVSTATE_ENDPOINT.to_string(),
            results: defaults::RESULTS_ENDPOINT.to_string(),
            tentative_results: defaults::TENTATIVE_RESULTS_ENDPOINT.to_string(),
            decoder_stream: defaults::DECODER_STREAM.to_string(),
            tentative_decoder_stream: defaults::TENTATIVE_DECODER_STREAM.to_string(),
            convstate_stream: defaults::CONVSTATE_STREAM.to_string(),
        }
    }
}

impl ClientEndpoints {
    /// Declares the client's push and pull endpoints.
    pub fn register(&self, registry: &mut EndpointRegistry) -> Result<()> {
        registry.add_push_endpoint(self.audio.as_str())?;
        registry.add_push_endpoint(self.convstate.as_str())?;
        registry.add_pull_endpoint(
            self.results.as_str(),
            [self.decoder_stream.as_str(), self.convstate_stream.as_str()],
        )?;
        registry.add_pull_endpoint(
            self.tentative_results.as_str(),
            [
                self.tentative_decoder_stream.as_str(),
                self.convstate_stream.as_str(),
            ],
        )?;
        Ok(())
    }

    /// A registry holding only the client's endpoints.
    pub fn registry(&self) -> Result<EndpointRegistry> {
        let mut registry = EndpointRegistry::new();
        self.register(&mut registry)?;
        Ok(registry)
    }
}

/// Audio in, results out: one producer plus committed and tentative
/// consumer threads sharing a session.
pub struct StreamingClient {
    session: Arc<Session>,
    producer: ChunkProducer,
    cancel: CancelToken,
    consumers: Vec<JoinHandle<()>>,
    join_timeout: Duration,
}

impl StreamingClient {
    /// Spawns both consumer loops. The session must declare `endpoints`.
    pub fn start(
        session: Arc<Session>,
        endpoints: &ClientEndpoints,
        format: AudioFormat,
        listener: Arc<dyn ResultListener>,
    ) -> Result<Self> {
        Self::start_with_timeout(session, endpoints, format, listener, defaults::PULL_TIMEOUT)
    }

    /// [`StreamingClient::start`] with an explicit per-pull timeout.
    pub fn start_with_timeout(
        session: Arc<Session>,
        endpoints: &ClientEndpoints,
        format: AudioFormat,
        listener: Arc<dyn ResultListener>,
        pull_timeout: Duration,
    ) -> Result<Self> {
        let cancel = CancelToken::new();
        let loops = [
            (
                ResultKind::Committed,
                &endpoints.results,
                &endpoints.decoder_stream,
            ),
            (
                ResultKind::Tentative,
                &endpoints.tentative_results,
                &endpoints.tentative_decoder_stream,
            ),
        ];

        let mut consumers = Vec::with_capacity(loops.len());
        for (kind, endpoint, decoder_stream) in loops {
            let puller = ResultPuller::new(
                session.clone(),
                kind,
                endpoint.as_str(),
                decoder_stream.as_str(),
                endpoints.convstate_stream.as_str(),
                listener.clone(),
                cancel.clone(),
            )
            .with_timeout(pull_timeout);
            match puller.spawn() {
                Ok(handle) => consumers.push(handle),
                Err(e) => {
                    cancel.cancel();
                    return Err(ExchangeError::Other(format!(
                        "failed to spawn result consumer: {}",
                        e
                    )));
                }
            }
        }

        tracing::debug!(listener = listener.name(), "Streaming client started");

        Ok(Self {
            producer: ChunkProducer::new(session.clone(), endpoints, format),
            session,
            cancel,
            consumers,
            join_timeout: defaults::JOIN_TIMEOUT,
        })
    }

    pub fn producer(&mut self) -> &mut ChunkProducer {
        &mut self.producer
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Cancels the consumers, closes the session and waits for the consumer
    /// threads up to a deadline. Late threads are detached.
    pub fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        let closed = self.session.close();

        let deadline = Instant::now() + self.join_timeout;
        let poll_interval = Duration::from_millis(10);

        loop {
            // Join finished threads to surface panics
            let mut remaining = Vec::new();
            for handle in self.consumers.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        tracing::error!(panic = msg, "Result consumer panicked");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.consumers = remaining;

            if self.consumers.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    threads = self.consumers.len(),
                    "Result consumers still running at shutdown, detaching"
                );
                break;
            }

            thread::sleep(poll_interval);
        }

        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = ClientEndpoints::default();
        assert_eq!(endpoints.audio, "raw_audio");
        assert_eq!(endpoints.convstate, "convstate_input");
        assert_eq!(endpoints.results, "results");
        assert_eq!(endpoints.tentative_results, "tentative_results");
    }

    #[test]
    fn test_register_declares_result_streams() {
        let registry = ClientEndpoints::default().registry().unwrap();

        assert!(registry.has_push_endpoint("raw_audio"));
        assert!(registry.has_push_endpoint("convstate_input"));

        let results: Vec<&str> = registry
            .streams_for("results")
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(results, vec!["convstate_output", "dec_output"]);

        let tentative: Vec<&str> = registry
            .streams_for("tentative_results")
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tentative, vec!["convstate_output", "dec_tentative_output"]);
    }
}
