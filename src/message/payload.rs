//! Audio, binary, conversation-state and JSON payloads.

use super::MessageError;
use super::matrix::{check_finite, same_floats};
use serde_json::{Map, Value};

/// Floating-point audio samples with their rate.
#[derive(Debug, Clone)]
pub struct Audio {
    samples: Vec<f32>,
    sample_rate: f32,
    ticks_per_sample: f32,
}

impl Audio {
    /// Copies `samples`; an empty buffer or a non-finite value is rejected.
    pub fn new(
        samples: &[f32],
        sample_rate: f32,
        ticks_per_sample: f32,
    ) -> Result<Self, MessageError> {
        if samples.is_empty() {
            return Err(MessageError::EmptyAudio);
        }
        check_finite("samples", samples)?;
        check_finite("sample_rate", &[sample_rate])?;
        check_finite("ticks_per_sample", &[ticks_per_sample])?;
        Ok(Self {
            samples: samples.to_vec(),
            sample_rate,
            ticks_per_sample,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn ticks_per_sample(&self) -> f32 {
        self.ticks_per_sample
    }
}

impl PartialEq for Audio {
    fn eq(&self, other: &Self) -> bool {
        same_floats(&self.samples, &other.samples)
            && self.sample_rate.to_bits() == other.sample_rate.to_bits()
            && self.ticks_per_sample.to_bits() == other.ticks_per_sample.to_bits()
    }
}

/// Opaque bytes plus a free-form format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    data: Vec<u8>,
    format: String,
}

impl Binary {
    /// Copies `data` so later caller mutation cannot reach the message.
    pub fn new(data: &[u8], format: impl Into<String>) -> Self {
        Self {
            data: data.to_vec(),
            format: format.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

/// Utterance and conversation boundary marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    utterance_id: String,
    last_chunk_in_utt: bool,
    convo_id: String,
    last_chunk_in_convo: bool,
}

impl ConversationState {
    /// A conversation cannot end in the middle of an utterance.
    pub fn new(
        utterance_id: impl Into<String>,
        last_chunk_in_utt: bool,
        convo_id: impl Into<String>,
        last_chunk_in_convo: bool,
    ) -> Result<Self, MessageError> {
        if last_chunk_in_convo && !last_chunk_in_utt {
            return Err(MessageError::ConversationEndsMidUtterance);
        }
        Ok(Self {
            utterance_id: utterance_id.into(),
            last_chunk_in_utt,
            convo_id: convo_id.into(),
            last_chunk_in_convo,
        })
    }

    pub fn utterance_id(&self) -> &str {
        &self.utterance_id
    }

    pub fn last_chunk_in_utt(&self) -> bool {
        self.last_chunk_in_utt
    }

    pub fn convo_id(&self) -> &str {
        &self.convo_id
    }

    pub fn last_chunk_in_convo(&self) -> bool {
        self.last_chunk_in_convo
    }
}

/// A structured JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    object: Map<String, Value>,
}

impl JsonDocument {
    /// Parses `text`, which must be a JSON object.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text).map_err(|e| MessageError::Decode {
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            other => Err(MessageError::NotAnObject {
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.object.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_copies_samples() {
        let mut samples = vec![0.25f32, 0.5];
        let audio = Audio::new(&samples, 16000.0, 1.0).unwrap();
        samples[0] = 9.0;
        assert_eq!(audio.samples(), &[0.25, 0.5]);
        assert_eq!(audio.sample_rate(), 16000.0);
        assert_eq!(audio.ticks_per_sample(), 1.0);
    }

    #[test]
    fn audio_rejects_empty_samples() {
        assert_eq!(
            Audio::new(&[], 16000.0, 1.0).unwrap_err(),
            MessageError::EmptyAudio
        );
    }

    #[test]
    fn binary_equality_is_byte_exact() {
        let a = Binary::new(&[3, 7, 5, 8, 6, 4, 2, 5, 8], "myformat");
        let b = Binary::new(&[3, 7, 5, 8, 6, 4, 2, 5, 8], "myformat");
        let c = Binary::new(&[3, 7, 5, 8, 6, 4, 2, 5, 9], "myformat");
        let d = Binary::new(&[3, 7, 5, 8, 6, 4, 2, 5, 8], "otherformat");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn conversation_state_accessors() {
        let state = ConversationState::new("utt_id", true, "convo_id", false).unwrap();
        assert_eq!(state.utterance_id(), "utt_id");
        assert!(state.last_chunk_in_utt());
        assert_eq!(state.convo_id(), "convo_id");
        assert!(!state.last_chunk_in_convo());
    }

    #[test]
    fn conversation_state_compares_every_field() {
        let base = ConversationState::new("u", false, "c", false).unwrap();
        assert_ne!(base, ConversationState::new("u2", false, "c", false).unwrap());
        assert_ne!(base, ConversationState::new("u", true, "c", false).unwrap());
        assert_ne!(base, ConversationState::new("u", false, "c2", false).unwrap());
    }

    #[test]
    fn json_document_reports_found_type() {
        let err = JsonDocument::parse("\"text\"").unwrap_err();
        assert_eq!(
            err,
            MessageError::NotAnObject {
                found: "string".to_string()
            }
        );
    }

    #[test]
    fn json_document_equality_is_structural() {
        let a = JsonDocument::parse(r#"{"hello": "123", "n": 1}"#).unwrap();
        let b = JsonDocument::parse(r#"{ "n": 1, "hello": "123" }"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("hello"), Some(&Value::String("123".to_string())));
    }
}
