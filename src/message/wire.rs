//! Self-description format.
//!
//! A description is a pretty-printed JSON object holding `time`, `tag` and
//! `descriptors` next to the payload fields, which keep the engine's
//! `m`-prefixed names (`mUtteranceId`, `mSampleRate`, ...). N-best lists are
//! spelled out as `nbest_<i>` objects of `segment_<j>` objects. Keys come out
//! sorted (`serde_json::Map` is ordered), so equal messages always describe
//! themselves byte-for-byte identically.
//!
//! A `type` discriminant is written too. Readers that learn the kind from
//! elsewhere, such as a URL path, may omit it.

use super::{
    Audio, Binary, ConversationState, Descriptors, Features, Matrix, Message, MessageBody,
    MessageError, MessageKind, Nbest, NbestEntry, Vector,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const TIME: &str = "time";
const TAG: &str = "tag";
const DESCRIPTORS: &str = "descriptors";
const TYPE: &str = "type";

const AUDIO: &str = "mAudio";
const SAMPLE_RATE: &str = "mSampleRate";
const TICKS_PER_SAMPLE: &str = "mTickPerSample";
const DATA: &str = "mData";
const FORMAT: &str = "mFormat";
const UTTERANCE_ID: &str = "mUtteranceId";
const LAST_CHUNK_IN_UTT: &str = "mLastChunkInUtt";
const CONVO_ID: &str = "mConvoId";
const LAST_CHUNK_IN_CONVO: &str = "mLastChunkInConvo";
const FEATURES: &str = "mFeatures";
const FEATURE_ROWS: &str = "mFeatureRows";
const FEATURE_TIMESTAMPS: &str = "mFeatureTimestamps";
const FEATURE_NAMES: &str = "mFeatureNames";

const NBEST_PREFIX: &str = "nbest_";
const SEGMENT_PREFIX: &str = "segment_";

#[derive(Debug, Deserialize)]
struct AudioFields {
    #[serde(rename = "mAudio")]
    samples: Vec<f32>,
    #[serde(rename = "mSampleRate")]
    sample_rate: f32,
    #[serde(rename = "mTickPerSample")]
    ticks_per_sample: f32,
}

#[derive(Debug, Deserialize)]
struct BinaryFields {
    #[serde(rename = "mData")]
    data: Vec<u8>,
    #[serde(rename = "mFormat")]
    format: String,
}

#[derive(Debug, Deserialize)]
struct ConversationStateFields {
    #[serde(rename = "mUtteranceId")]
    utterance_id: String,
    #[serde(rename = "mLastChunkInUtt")]
    last_chunk_in_utt: bool,
    #[serde(rename = "mConvoId")]
    convo_id: String,
    #[serde(rename = "mLastChunkInConvo")]
    last_chunk_in_convo: bool,
}

#[derive(Debug, Deserialize)]
struct FeaturesFields {
    #[serde(rename = "mUtteranceId")]
    utterance_id: String,
    #[serde(rename = "mFeatureRows")]
    rows: usize,
    /// Column-major: one inner list per column.
    #[serde(rename = "mFeatures")]
    features: Vec<Vec<f32>>,
    #[serde(rename = "mFeatureTimestamps")]
    timestamps: Vec<u64>,
    #[serde(rename = "mFeatureNames")]
    feature_names: String,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
    alignment: u64,
    words: u32,
    confidences: f32,
}

fn decode_error(message: impl Into<String>) -> MessageError {
    MessageError::Decode {
        message: message.into(),
    }
}

fn floats(values: &[f32]) -> Value {
    Value::Array(values.iter().map(|&v| Value::from(v)).collect())
}

/// Payload fields of `body`; `None` for JSON documents, which describe
/// themselves verbatim.
fn encode_body(body: &MessageBody) -> Option<Map<String, Value>> {
    let mut fields = Map::new();
    match body {
        MessageBody::Audio(audio) => {
            fields.insert(AUDIO.into(), floats(audio.samples()));
            fields.insert(SAMPLE_RATE.into(), Value::from(audio.sample_rate()));
            fields.insert(TICKS_PER_SAMPLE.into(), Value::from(audio.ticks_per_sample()));
        }
        MessageBody::Binary(binary) => {
            fields.insert(DATA.into(), Value::from(binary.data().to_vec()));
            fields.insert(FORMAT.into(), Value::from(binary.format()));
        }
        MessageBody::ConversationState(state) => {
            fields.insert(UTTERANCE_ID.into(), Value::from(state.utterance_id()));
            fields.insert(LAST_CHUNK_IN_UTT.into(), Value::from(state.last_chunk_in_utt()));
            fields.insert(CONVO_ID.into(), Value::from(state.convo_id()));
            fields.insert(
                LAST_CHUNK_IN_CONVO.into(),
                Value::from(state.last_chunk_in_convo()),
            );
        }
        MessageBody::Features(features) => {
            let matrix = features.features();
            fields.insert(UTTERANCE_ID.into(), Value::from(features.utterance_id()));
            fields.insert(FEATURE_ROWS.into(), Value::from(matrix.rows()));
            fields.insert(
                FEATURES.into(),
                Value::Array(
                    matrix
                        .columns()
                        .iter()
                        .map(|column| floats(column.as_slice()))
                        .collect(),
                ),
            );
            fields.insert(
                FEATURE_TIMESTAMPS.into(),
                Value::from(features.timestamps().to_vec()),
            );
            fields.insert(FEATURE_NAMES.into(), Value::from(features.feature_names()));
        }
        MessageBody::Nbest(nbest) => {
            for (i, entry) in nbest.entries().iter().enumerate() {
                let mut segments = Map::new();
                for j in 0..entry.len() {
                    let mut segment = Map::new();
                    segment.insert("text".into(), Value::from(entry.text()[j].as_str()));
                    segment.insert("alignment".into(), Value::from(entry.alignment()[j]));
                    segment.insert("words".into(), Value::from(entry.words()[j]));
                    segment.insert("confidences".into(), Value::from(entry.confidences()[j]));
                    segments.insert(format!("{}{}", SEGMENT_PREFIX, j), Value::Object(segment));
                }
                fields.insert(format!("{}{}", NBEST_PREFIX, i), Value::Object(segments));
            }
        }
        MessageBody::Json(_) => return None,
    }
    Some(fields)
}

pub(super) fn describe(message: &Message) -> Vec<u8> {
    let value = match encode_body(message.body()) {
        Some(mut object) => {
            object.insert(TYPE.into(), Value::from(message.kind().as_str()));
            object.insert(TIME.into(), Value::from(message.time()));
            object.insert(TAG.into(), Value::from(message.tag()));
            object.insert(DESCRIPTORS.into(), Value::from(message.descriptor_string()));
            Value::Object(object)
        }
        None => match message.as_json() {
            Some(document) => document.to_value(),
            None => Value::Null,
        },
    };
    // `Value`'s alternate Display is the pretty printer and cannot fail.
    format!("{:#}", value).into_bytes()
}

fn fields<T: DeserializeOwned>(object: Map<String, Value>) -> Result<T, MessageError> {
    serde_json::from_value(Value::Object(object)).map_err(|e| decode_error(e.to_string()))
}

/// Objects stored under `<prefix><index>` keys, in index order. Indices must
/// run from zero without gaps.
fn indexed_objects(
    object: &Map<String, Value>,
    prefix: &str,
) -> Result<Vec<Map<String, Value>>, MessageError> {
    let mut indexed: Vec<(usize, Map<String, Value>)> = Vec::new();
    for (key, value) in object {
        let Some(index) = key.strip_prefix(prefix) else {
            continue;
        };
        let index: usize = index
            .parse()
            .map_err(|_| decode_error(format!("invalid key '{}'", key)))?;
        let Value::Object(inner) = value else {
            return Err(decode_error(format!("'{}' must be an object", key)));
        };
        indexed.push((index, inner.clone()));
    }
    indexed.sort_by_key(|(index, _)| *index);
    for (position, (index, _)) in indexed.iter().enumerate() {
        if *index != position {
            return Err(decode_error(format!("missing '{}{}'", prefix, position)));
        }
    }
    Ok(indexed.into_iter().map(|(_, inner)| inner).collect())
}

fn decode_nbest_entry(segments: Map<String, Value>) -> Result<NbestEntry, MessageError> {
    let segments = indexed_objects(&segments, SEGMENT_PREFIX)?;
    let mut words = Vec::with_capacity(segments.len());
    let mut alignment = Vec::with_capacity(segments.len());
    let mut text = Vec::with_capacity(segments.len());
    let mut confidences = Vec::with_capacity(segments.len());
    for segment in segments {
        let segment: Segment = fields(segment)?;
        words.push(segment.words);
        alignment.push(segment.alignment);
        text.push(segment.text);
        confidences.push(segment.confidences);
    }
    NbestEntry::new(words, alignment, text, confidences)
}

/// Rebuilds the payload, re-checking every construction invariant.
fn decode_body(kind: MessageKind, object: Map<String, Value>) -> Result<MessageBody, MessageError> {
    let body = match kind {
        MessageKind::Audio => {
            let audio: AudioFields = fields(object)?;
            Audio::new(&audio.samples, audio.sample_rate, audio.ticks_per_sample)?.into()
        }
        MessageKind::Binary => {
            let binary: BinaryFields = fields(object)?;
            Binary::new(&binary.data, binary.format).into()
        }
        MessageKind::ConversationState => {
            let state: ConversationStateFields = fields(object)?;
            ConversationState::new(
                state.utterance_id,
                state.last_chunk_in_utt,
                state.convo_id,
                state.last_chunk_in_convo,
            )?
            .into()
        }
        MessageKind::Features => {
            let wire: FeaturesFields = fields(object)?;
            let columns: Vec<Vector> = wire.features.iter().map(|c| Vector::from_slice(c)).collect();
            let mut matrix = Matrix::from_columns(columns)?;
            if matrix.cols() == 0 {
                matrix.conservative_resize(wire.rows, 0);
            } else if matrix.rows() != wire.rows {
                return Err(MessageError::MatrixShape {
                    message: format!(
                        "declared {} rows but columns have {}",
                        wire.rows,
                        matrix.rows()
                    ),
                });
            }
            Features::new(wire.utterance_id, matrix, wire.timestamps, wire.feature_names)?.into()
        }
        MessageKind::Nbest => Nbest::new(
            indexed_objects(&object, NBEST_PREFIX)?
                .into_iter()
                .map(decode_nbest_entry)
                .collect::<Result<Vec<_>, _>>()?,
        )
        .into(),
        MessageKind::Json => {
            return Err(decode_error(format!(
                "'{}' messages cannot be rebuilt from a description",
                kind
            )));
        }
    };
    Ok(body)
}

/// Decodes a description. `expected` is the kind known out of band; when it
/// is absent the description must name its own `type`.
pub(super) fn decode(expected: Option<MessageKind>, bytes: &[u8]) -> Result<Message, MessageError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(decode_error("description is not a JSON object"));
    };

    let declared: Option<MessageKind> = match object.remove(TYPE) {
        Some(Value::String(name)) => Some(name.parse()?),
        None => None,
        Some(_) => return Err(decode_error("'type' must be a string")),
    };
    let kind = match (expected, declared) {
        (Some(expected), Some(declared)) if expected != declared => {
            return Err(decode_error(format!(
                "expected '{}' but description says '{}'",
                expected, declared
            )));
        }
        (Some(kind), _) | (None, Some(kind)) => kind,
        (None, None) => return Err(decode_error("missing 'type'")),
    };
    if !kind.is_reconstructable() {
        return Err(decode_error(format!(
            "'{}' messages cannot be rebuilt from a description",
            kind
        )));
    }

    let time = object
        .remove(TIME)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| decode_error("missing or invalid 'time'"))?;
    let tag = match object.remove(TAG) {
        Some(Value::String(tag)) => tag,
        _ => return Err(decode_error("missing or invalid 'tag'")),
    };
    let descriptors = match object.remove(DESCRIPTORS) {
        Some(Value::String(text)) => Descriptors::parse(&text)?,
        None => Descriptors::new(),
        Some(_) => return Err(decode_error("'descriptors' must be a string")),
    };

    let mut message = Message::new(tag, time, decode_body(kind, object)?);
    message.set_descriptors(descriptors);
    Ok(message)
}
