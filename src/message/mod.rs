//! Typed messages exchanged with the engine.
//!
//! A [`Message`] is a tagged, timestamped envelope around one of a closed set
//! of payload variants ([`MessageBody`]). Equality is structural: time, the
//! canonical descriptor string and every variant field must match exactly.
//! The tag is caller bookkeeping and does not take part in equality.

pub mod descriptors;
pub mod features;
pub mod matrix;
pub mod nbest;
pub mod payload;
mod wire;

pub use descriptors::Descriptors;
pub use features::Features;
pub use matrix::{Matrix, Vector};
pub use nbest::{Nbest, NbestEntry};
pub use payload::{Audio, Binary, ConversationState, JsonDocument};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a message would violate one of its invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("Audio message requires at least one sample")]
    EmptyAudio,

    #[error(
        "Conversation state cannot end a conversation mid-utterance \
         (last_chunk_in_convo=true but last_chunk_in_utt=false)"
    )]
    ConversationEndsMidUtterance,

    #[error("Feature matrix has {columns} columns but {timestamps} timestamps")]
    FeatureShape { columns: usize, timestamps: usize },

    #[error(
        "N-best entry lengths differ: {words} words, {alignment} alignments, \
         {text} tokens, {confidences} confidences"
    )]
    NbestEntryShape {
        words: usize,
        alignment: usize,
        text: usize,
        confidences: usize,
    },

    #[error("Invalid descriptor {key:?}: {message}")]
    InvalidDescriptor { key: String, message: String },

    #[error("{field} must be finite")]
    NonFinite { field: &'static str },

    #[error("Matrix shape mismatch: {message}")]
    MatrixShape { message: String },

    #[error("JSON message must be an object, got {found}")]
    NotAnObject { found: String },

    #[error("Failed to decode message description: {message}")]
    Decode { message: String },
}

/// Discriminant of [`MessageBody`], used on the wire and in front-end paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Audio,
    Binary,
    ConversationState,
    Features,
    Json,
    Nbest,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Audio,
        MessageKind::Binary,
        MessageKind::ConversationState,
        MessageKind::Features,
        MessageKind::Json,
        MessageKind::Nbest,
    ];

    /// Snake-case name used in self descriptions and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Audio => "audio",
            MessageKind::Binary => "binary",
            MessageKind::ConversationState => "conversation_state",
            MessageKind::Features => "features",
            MessageKind::Json => "json",
            MessageKind::Nbest => "nbest",
        }
    }

    /// Whether [`Message::from_description`] can rebuild this kind.
    pub fn is_reconstructable(&self) -> bool {
        !matches!(self, MessageKind::Json)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MessageError::Decode {
                message: format!("unknown message type '{}'", s),
            })
    }
}

/// Variant-specific payload of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Audio(Audio),
    Binary(Binary),
    ConversationState(ConversationState),
    Features(Features),
    Json(JsonDocument),
    Nbest(Nbest),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Audio(_) => MessageKind::Audio,
            MessageBody::Binary(_) => MessageKind::Binary,
            MessageBody::ConversationState(_) => MessageKind::ConversationState,
            MessageBody::Features(_) => MessageKind::Features,
            MessageBody::Json(_) => MessageKind::Json,
            MessageBody::Nbest(_) => MessageKind::Nbest,
        }
    }
}

impl From<Audio> for MessageBody {
    fn from(body: Audio) -> Self {
        MessageBody::Audio(body)
    }
}

impl From<Binary> for MessageBody {
    fn from(body: Binary) -> Self {
        MessageBody::Binary(body)
    }
}

impl From<ConversationState> for MessageBody {
    fn from(body: ConversationState) -> Self {
        MessageBody::ConversationState(body)
    }
}

impl From<Features> for MessageBody {
    fn from(body: Features) -> Self {
        MessageBody::Features(body)
    }
}

impl From<JsonDocument> for MessageBody {
    fn from(body: JsonDocument) -> Self {
        MessageBody::Json(body)
    }
}

impl From<Nbest> for MessageBody {
    fn from(body: Nbest) -> Self {
        MessageBody::Nbest(body)
    }
}

/// A timestamped message travelling through a push or pull endpoint.
#[derive(Debug, Clone)]
pub struct Message {
    tag: String,
    time: u64,
    descriptors: Descriptors,
    body: MessageBody,
}

impl Message {
    /// Wraps an already-validated payload.
    pub fn new(tag: impl Into<String>, time: u64, body: impl Into<MessageBody>) -> Self {
        Self {
            tag: tag.into(),
            time,
            descriptors: Descriptors::new(),
            body: body.into(),
        }
    }

    /// Audio message; fails on an empty sample buffer or a non-finite value.
    /// Samples are copied.
    pub fn audio(
        tag: impl Into<String>,
        time: u64,
        samples: &[f32],
        sample_rate: f32,
        ticks_per_sample: f32,
    ) -> Result<Self, MessageError> {
        Ok(Self::new(
            tag,
            time,
            Audio::new(samples, sample_rate, ticks_per_sample)?,
        ))
    }

    /// Binary message. The bytes are copied.
    pub fn binary(
        tag: impl Into<String>,
        time: u64,
        data: &[u8],
        format: impl Into<String>,
    ) -> Self {
        Self::new(tag, time, Binary::new(data, format))
    }

    /// Conversation-state marker; fails when the conversation would end
    /// without ending the utterance.
    pub fn conversation_state(
        tag: impl Into<String>,
        time: u64,
        utterance_id: impl Into<String>,
        last_chunk_in_utt: bool,
        convo_id: impl Into<String>,
        last_chunk_in_convo: bool,
    ) -> Result<Self, MessageError> {
        Ok(Self::new(
            tag,
            time,
            ConversationState::new(
                utterance_id,
                last_chunk_in_utt,
                convo_id,
                last_chunk_in_convo,
            )?,
        ))
    }

    /// Feature message; every matrix column needs exactly one timestamp and
    /// every value must be finite.
    pub fn features(
        tag: impl Into<String>,
        time: u64,
        utterance_id: impl Into<String>,
        features: Matrix,
        timestamps: Vec<u64>,
        feature_names: impl Into<String>,
    ) -> Result<Self, MessageError> {
        Ok(Self::new(
            tag,
            time,
            Features::new(utterance_id, features, timestamps, feature_names)?,
        ))
    }

    /// N-best message, hypotheses ordered best first.
    pub fn nbest(tag: impl Into<String>, time: u64, entries: Vec<NbestEntry>) -> Self {
        Self::new(tag, time, Nbest::new(entries))
    }

    /// JSON message; the text must parse to an object.
    pub fn json(tag: impl Into<String>, time: u64, text: &str) -> Result<Self, MessageError> {
        Ok(Self::new(tag, time, JsonDocument::parse(text)?))
    }

    /// Builder form of [`Message::set_descriptor`].
    pub fn with_descriptor(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MessageError> {
        self.set_descriptor(key, value)?;
        Ok(self)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn into_body(self) -> MessageBody {
        self.body
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Sets caller metadata. Keys and values may not contain `;` or `=`.
    pub fn set_descriptor(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MessageError> {
        self.descriptors.set(key, value)
    }

    pub fn descriptor(&self, key: &str) -> Option<&str> {
        self.descriptors.get(key)
    }

    /// Canonical `key=value;` rendering of the descriptors.
    pub fn descriptor_string(&self) -> String {
        self.descriptors.to_canonical_string()
    }

    pub(crate) fn set_descriptors(&mut self, descriptors: Descriptors) {
        self.descriptors = descriptors;
    }

    pub fn as_audio(&self) -> Option<&Audio> {
        match &self.body {
            MessageBody::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match &self.body {
            MessageBody::Binary(binary) => Some(binary),
            _ => None,
        }
    }

    pub fn as_conversation_state(&self) -> Option<&ConversationState> {
        match &self.body {
            MessageBody::ConversationState(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_features(&self) -> Option<&Features> {
        match &self.body {
            MessageBody::Features(features) => Some(features),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonDocument> {
        match &self.body {
            MessageBody::Json(document) => Some(document),
            _ => None,
        }
    }

    pub fn as_nbest(&self) -> Option<&Nbest> {
        match &self.body {
            MessageBody::Nbest(nbest) => Some(nbest),
            _ => None,
        }
    }

    /// Deterministic pretty-printed JSON description of this message.
    ///
    /// JSON messages describe themselves as their document. Every other
    /// variant produces an object with `time`, `tag`, `descriptors`, a `type`
    /// discriminant and its `m`-prefixed payload fields (`mUtteranceId`,
    /// `mSampleRate`, ...), which [`Message::from_description`] accepts.
    pub fn describe_self(&self) -> Vec<u8> {
        wire::describe(self)
    }

    /// Rebuilds a message from its self description, re-checking invariants.
    /// The description must carry a `type`.
    pub fn from_description(bytes: &[u8]) -> Result<Self, MessageError> {
        wire::decode(None, bytes)
    }

    /// Rebuilds a message of a kind known out of band, such as from a URL
    /// path. A `type` in the description is optional but must agree.
    pub fn from_description_as(kind: MessageKind, bytes: &[u8]) -> Result<Self, MessageError> {
        wire::decode(Some(kind), bytes)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
            && self.descriptors.to_canonical_string() == other.descriptors.to_canonical_string()
            && self.body == other.body
    }
}
