//! Ranked recognition hypotheses.

use super::MessageError;
use super::matrix::{check_finite, same_floats};

/// One hypothesis: per-token word ids, alignment times, surface text and
/// confidences, all of equal length.
#[derive(Debug, Clone)]
pub struct NbestEntry {
    words: Vec<u32>,
    alignment: Vec<u64>,
    text: Vec<String>,
    confidences: Vec<f32>,
}

impl NbestEntry {
    pub fn new(
        words: Vec<u32>,
        alignment: Vec<u64>,
        text: Vec<String>,
        confidences: Vec<f32>,
    ) -> Result<Self, MessageError> {
        let n = words.len();
        if alignment.len() != n || text.len() != n || confidences.len() != n {
            return Err(MessageError::NbestEntryShape {
                words: words.len(),
                alignment: alignment.len(),
                text: text.len(),
                confidences: confidences.len(),
            });
        }
        check_finite("confidences", &confidences)?;
        Ok(Self {
            words,
            alignment,
            text,
            confidences,
        })
    }

    /// Entry carrying only surface tokens, with zeroed ids, times and scores.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let text: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let n = text.len();
        Self {
            words: vec![0; n],
            alignment: vec![0; n],
            text,
            confidences: vec![0.0; n],
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn alignment(&self) -> &[u64] {
        &self.alignment
    }

    pub fn text(&self) -> &[String] {
        &self.text
    }

    pub fn confidences(&self) -> &[f32] {
        &self.confidences
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Tokens joined with single spaces, trimmed.
    pub fn joined_text(&self) -> String {
        self.text.join(" ").trim().to_string()
    }
}

impl PartialEq for NbestEntry {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
            && self.alignment == other.alignment
            && self.text == other.text
            && same_floats(&self.confidences, &other.confidences)
    }
}

/// Hypotheses ordered best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nbest {
    entries: Vec<NbestEntry>,
}

impl Nbest {
    pub fn new(entries: Vec<NbestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[NbestEntry] {
        &self.entries
    }

    pub fn best(&self) -> Option<&NbestEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
