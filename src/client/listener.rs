use std::sync::{Mutex, MutexGuard};

/// Which result endpoint a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Final text for a span of audio.
    Committed,
    /// Provisional text that a later committed result supersedes.
    Tentative,
}

/// One result as delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    pub kind: ResultKind,
    pub utterance_id: String,
    pub text: String,
    pub end_of_utterance: bool,
}

/// Pluggable handler for recognition results.
///
/// Called from both consumer threads, so implementations take `&self` and
/// must be `Send + Sync`.
pub trait ResultListener: Send + Sync {
    /// A committed result arrived.
    fn committed(&self, utterance_id: &str, text: &str, end_of_utterance: bool);

    /// A tentative result arrived.
    fn tentative(&self, utterance_id: &str, text: &str, end_of_utterance: bool);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "listener"
    }
}

/// Listener that records every result in arrival order.
#[derive(Debug, Default)]
pub struct CollectorListener {
    events: Mutex<Vec<ResultEvent>>,
}

impl CollectorListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn events(&self) -> Vec<ResultEvent> {
        self.lock().clone()
    }

    pub fn committed_events(&self) -> Vec<ResultEvent> {
        self.of_kind(ResultKind::Committed)
    }

    pub fn tentative_events(&self) -> Vec<ResultEvent> {
        self.of_kind(ResultKind::Tentative)
    }

    /// Committed texts joined with spaces, `None` when nothing was committed.
    pub fn transcript(&self) -> Option<String> {
        let texts: Vec<String> = self
            .committed_events()
            .into_iter()
            .map(|e| e.text)
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(" "))
        }
    }

    fn of_kind(&self, kind: ResultKind) -> Vec<ResultEvent> {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    fn record(&self, kind: ResultKind, utterance_id: &str, text: &str, end_of_utterance: bool) {
        self.lock().push(ResultEvent {
            kind,
            utterance_id: utterance_id.to_string(),
            text: text.to_string(),
            end_of_utterance,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResultEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResultListener for CollectorListener {
    fn committed(&self, utterance_id: &str, text: &str, end_of_utterance: bool) {
        self.record(ResultKind::Committed, utterance_id, text, end_of_utterance);
    }

    fn tentative(&self, utterance_id: &str, text: &str, end_of_utterance: bool) {
        self.record(ResultKind::Tentative, utterance_id, text, end_of_utterance);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Listener that prints committed results to stdout, one line each.
/// Tentative results are printed only when `show_tentative` is set.
#[derive(Debug, Default)]
pub struct StdoutListener {
    show_tentative: bool,
}

impl StdoutListener {
    pub fn new(show_tentative: bool) -> Self {
        Self { show_tentative }
    }
}

impl ResultListener for StdoutListener {
    fn committed(&self, utterance_id: &str, text: &str, _end_of_utterance: bool) {
        if !text.is_empty() {
            println!("[{}] {}", utterance_id, text);
        }
    }

    fn tentative(&self, utterance_id: &str, text: &str, _end_of_utterance: bool) {
        if self.show_tentative && !text.is_empty() {
            println!("[{}] ~ {}", utterance_id, text);
        }
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
