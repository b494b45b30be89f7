//! Result consumer loops of the streaming client.

use crate::client::listener::{ResultKind, ResultListener};
use crate::exchange::{Block, Session};
use crate::message::Nbest;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cooperative cancellation flag shared by the client and its loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Text of the best hypothesis, empty when there is none.
pub fn result_text(nbest: &Nbest) -> String {
    nbest.best().map(|entry| entry.joined_text()).unwrap_or_default()
}

/// Drains one result endpoint and hands each block to a listener.
pub struct ResultPuller {
    session: Arc<Session>,
    kind: ResultKind,
    endpoint: String,
    decoder_stream: String,
    convstate_stream: String,
    listener: Arc<dyn ResultListener>,
    cancel: CancelToken,
    timeout: Duration,
}

impl ResultPuller {
    pub fn new(
        session: Arc<Session>,
        kind: ResultKind,
        endpoint: impl Into<String>,
        decoder_stream: impl Into<String>,
        convstate_stream: impl Into<String>,
        listener: Arc<dyn ResultListener>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            session,
            kind,
            endpoint: endpoint.into(),
            decoder_stream: decoder_stream.into(),
            convstate_stream: convstate_stream.into(),
            listener,
            cancel,
            timeout: crate::defaults::PULL_TIMEOUT,
        }
    }

    /// Overrides how long each pull waits before re-checking cancellation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs [`ResultPuller::run`] on a dedicated thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        let name = match self.kind {
            ResultKind::Committed => "streamgate-results",
            ResultKind::Tentative => "streamgate-tentative",
        };
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }

    /// Pulls until cancelled or the session closes.
    pub fn run(&self) {
        while !self.cancel.is_cancelled() {
            match self.session.pull_all(&self.endpoint, self.timeout) {
                Ok(blocks) => {
                    for block in &blocks {
                        self.dispatch(block);
                    }
                }
                Err(e) if e.is_channel_closed() => {
                    tracing::debug!(endpoint = %self.endpoint, "Result endpoint closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(endpoint = %self.endpoint, error = %e, "Result pull failed");
                    break;
                }
            }
        }
    }

    /// Delivers one block; blocks without the expected messages are skipped.
    pub fn dispatch(&self, block: &Block) {
        let Some(state) = block
            .get(&self.convstate_stream)
            .and_then(|m| m.as_conversation_state())
        else {
            tracing::warn!(
                endpoint = %self.endpoint,
                time = block.time(),
                stream = %self.convstate_stream,
                "Skipping block without conversation state"
            );
            return;
        };
        let Some(nbest) = block.get(&self.decoder_stream).and_then(|m| m.as_nbest()) else {
            tracing::warn!(
                endpoint = %self.endpoint,
                time = block.time(),
                stream = %self.decoder_stream,
                "Skipping block without n-best result"
            );
            return;
        };

        let text = result_text(nbest);
        match self.kind {
            ResultKind::Committed => {
                self.listener
                    .committed(state.utterance_id(), &text, state.last_chunk_in_utt())
            }
            ResultKind::Tentative => {
                self.listener
                    .tentative(state.utterance_id(), &text, state.last_chunk_in_utt())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::listener::CollectorListener;
    use crate::endpoint::EndpointRegistry;
    use crate::exchange::MockEngine;
    use crate::message::{Message, NbestEntry};

    fn result_block(time: u64, tokens: &[&str], end: bool) -> Block {
        let nbest = Message::nbest(
            "dec",
            time,
            vec![NbestEntry::from_tokens(tokens.iter().copied())],
        );
        let state = Message::conversation_state("dec", time, "utt", end, "convo", false).unwrap();
        Block::from_messages([("dec_output", nbest), ("convstate_output", state)]).unwrap()
    }

    fn puller(
        engine: Arc<MockEngine>,
        listener: Arc<CollectorListener>,
        cancel: CancelToken,
    ) -> ResultPuller {
        let mut registry = EndpointRegistry::new();
        registry
            .add_pull_endpoint("results", ["dec_output", "convstate_output"])
            .unwrap();
        let session = Arc::new(Session::with_engine(engine, registry));
        ResultPuller::new(
            session,
            ResultKind::Committed,
            "results",
            "dec_output",
            "convstate_output",
            listener,
            cancel,
        )
        .with_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_result_text_uses_best_entry() {
        let nbest = Nbest::new(vec![
            NbestEntry::from_tokens(["hello", "world"]),
            NbestEntry::from_tokens(["yellow", "word"]),
        ]);
        assert_eq!(result_text(&nbest), "hello world");
        assert_eq!(result_text(&Nbest::default()), "");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_dispatch_delivers_committed_text() {
        let engine = Arc::new(MockEngine::new("mock"));
        let listener = Arc::new(CollectorListener::new());
        let puller = puller(engine, listener.clone(), CancelToken::new());

        puller.dispatch(&result_block(10, &["hi", "there"], true));

        let events = listener.committed_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].utterance_id, "utt");
        assert_eq!(events[0].text, "hi there");
        assert!(events[0].end_of_utterance);
    }

    #[test]
    fn test_dispatch_skips_block_without_nbest() {
        let engine = Arc::new(MockEngine::new("mock"));
        let listener = Arc::new(CollectorListener::new());
        let puller = puller(engine, listener.clone(), CancelToken::new());

        let block = Block::from_messages([
            ("dec_output", Message::binary("t", 1, &[1], "f")),
            (
                "convstate_output",
                Message::conversation_state("t", 1, "u", false, "c", false).unwrap(),
            ),
        ])
        .unwrap();
        puller.dispatch(&block);
        assert!(listener.events().is_empty());
    }

    #[test]
    fn test_run_exits_when_session_closes() {
        let engine = Arc::new(
            MockEngine::new("mock").with_blocks("results", vec![result_block(1, &["a"], false)]),
        );
        let listener = Arc::new(CollectorListener::new());
        let puller = puller(engine.clone(), listener.clone(), CancelToken::new());
        let session = puller.session.clone();

        let handle = puller.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        session.close().unwrap();
        handle.join().unwrap();

        assert_eq!(listener.transcript(), Some("a".to_string()));
    }

    #[test]
    fn test_run_exits_when_cancelled() {
        let engine = Arc::new(MockEngine::new("mock"));
        let listener = Arc::new(CollectorListener::new());
        let cancel = CancelToken::new();
        let puller = puller(engine, listener, cancel.clone());

        let handle = puller.spawn().unwrap();
        cancel.cancel();
        handle.join().unwrap();
    }
}
