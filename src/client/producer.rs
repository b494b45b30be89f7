//! Audio producer side of the streaming client.
//!
//! Every chunk is pushed as a `Binary` audio message immediately followed by
//! the matching `ConversationState` message, both stamped with the running
//! frame count. The engine relies on that pairing; this type is the only
//! client path that pushes, so the order cannot be broken.

use crate::client::streaming::ClientEndpoints;
use crate::defaults;
use crate::error::{ExchangeError, Result};
use crate::exchange::Session;
use crate::message::Message;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Raw PCM layout of pushed audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_width_bits: u16,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            sample_width_bits: defaults::SAMPLE_WIDTH_BITS,
            channels: defaults::CHANNELS,
        }
    }
}

impl AudioFormat {
    /// Format string carried by every audio message.
    pub fn format_string(&self) -> String {
        format!(
            "base_format=PCM;sample_width={};sample_rate={};num_channels={}",
            self.sample_width_bits, self.sample_rate, self.channels
        )
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.sample_width_bits / 8) * usize::from(self.channels)
    }
}

/// Utterance and conversation position of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkState {
    pub utterance_id: String,
    pub last_chunk_in_utt: bool,
    pub convo_id: String,
    pub last_chunk_in_convo: bool,
}

impl ChunkState {
    /// A chunk in the middle of an utterance.
    pub fn new(utterance_id: impl Into<String>, convo_id: impl Into<String>) -> Self {
        Self {
            utterance_id: utterance_id.into(),
            last_chunk_in_utt: false,
            convo_id: convo_id.into(),
            last_chunk_in_convo: false,
        }
    }

    /// Marks the chunk as closing its utterance.
    pub fn end_of_utterance(mut self) -> Self {
        self.last_chunk_in_utt = true;
        self
    }

    /// Marks the chunk as closing its conversation, and so its utterance.
    pub fn end_of_conversation(mut self) -> Self {
        self.last_chunk_in_utt = true;
        self.last_chunk_in_convo = true;
        self
    }
}

pub struct ChunkProducer {
    session: Arc<Session>,
    audio_endpoint: String,
    convstate_endpoint: String,
    format: AudioFormat,
    frames_pushed: u64,
}

impl ChunkProducer {
    pub fn new(session: Arc<Session>, endpoints: &ClientEndpoints, format: AudioFormat) -> Self {
        Self {
            session,
            audio_endpoint: endpoints.audio.clone(),
            convstate_endpoint: endpoints.convstate.clone(),
            format,
            frames_pushed: 0,
        }
    }

    /// Frames pushed so far; also the time stamp of the last chunk.
    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Pushes one chunk of raw PCM bytes and its conversation state.
    ///
    /// Returns the time stamp both messages carry. The chunk must hold a
    /// whole, non-zero number of frames.
    pub fn push_chunk(&mut self, bytes: &[u8], state: &ChunkState) -> Result<u64> {
        let frame_bytes = self.format.frame_bytes();
        if frame_bytes == 0 {
            return Err(ExchangeError::Audio {
                message: format!("unsupported sample width {}", self.format.sample_width_bits),
            });
        }
        if bytes.is_empty() || bytes.len() % frame_bytes != 0 {
            return Err(ExchangeError::Audio {
                message: format!(
                    "chunk of {} bytes is not a whole number of {}-byte frames",
                    bytes.len(),
                    frame_bytes
                ),
            });
        }

        let time = self.frames_pushed + (bytes.len() / frame_bytes) as u64;
        let audio = Message::binary(
            defaults::CLIENT_TAG,
            time,
            bytes,
            self.format.format_string(),
        );
        let marker = Message::conversation_state(
            defaults::CLIENT_TAG,
            time,
            state.utterance_id.as_str(),
            state.last_chunk_in_utt,
            state.convo_id.as_str(),
            state.last_chunk_in_convo,
        )?;

        self.session.push(&self.audio_endpoint, audio)?;
        self.frames_pushed = time;
        self.session.push(&self.convstate_endpoint, marker)?;
        Ok(time)
    }

    /// Streams a 16-bit PCM WAV in chunks of `chunk_frames`, flagging the
    /// final chunk as the end of `utterance_id` (and of the conversation
    /// when `end_conversation` is set). Returns the number of chunks pushed.
    pub fn push_wav<R: Read>(
        &mut self,
        reader: R,
        utterance_id: &str,
        convo_id: &str,
        end_conversation: bool,
        chunk_frames: usize,
    ) -> Result<usize> {
        let bytes = self.read_wav(reader)?;
        let chunk_bytes = chunk_frames.max(1) * self.format.frame_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(chunk_bytes).collect();
        let last = chunks.len().saturating_sub(1);

        for (index, chunk) in chunks.iter().enumerate() {
            let mut state = ChunkState::new(utterance_id, convo_id);
            if index == last {
                state = if end_conversation {
                    state.end_of_conversation()
                } else {
                    state.end_of_utterance()
                };
            }
            self.push_chunk(chunk, &state)?;
        }

        tracing::debug!(
            utterance = utterance_id,
            chunks = chunks.len(),
            frames = self.frames_pushed,
            "WAV pushed"
        );
        Ok(chunks.len())
    }

    /// [`ChunkProducer::push_wav`] over a file on disk.
    pub fn push_wav_file(
        &mut self,
        path: &Path,
        utterance_id: &str,
        convo_id: &str,
        end_conversation: bool,
        chunk_frames: usize,
    ) -> Result<usize> {
        let file = File::open(path)?;
        self.push_wav(
            BufReader::new(file),
            utterance_id,
            convo_id,
            end_conversation,
            chunk_frames,
        )
    }

    /// Decodes a WAV into little-endian PCM bytes matching this producer's format.
    fn read_wav<R: Read>(&self, reader: R) -> Result<Vec<u8>> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| ExchangeError::Audio {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ExchangeError::Audio {
                message: format!(
                    "only 16-bit integer PCM is supported, got {}-bit {:?}",
                    spec.bits_per_sample, spec.sample_format
                ),
            });
        }
        let found = AudioFormat {
            sample_rate: spec.sample_rate,
            sample_width_bits: spec.bits_per_sample,
            channels: spec.channels,
        };
        if found != self.format {
            return Err(ExchangeError::Audio {
                message: format!(
                    "WAV format {} does not match the stream format {}",
                    found.format_string(),
                    self.format.format_string()
                ),
            });
        }

        let samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExchangeError::Audio {
                message: format!("Failed to read WAV samples: {}", e),
            })?;
        if samples.is_empty() {
            return Err(ExchangeError::Audio {
                message: "WAV file contains no samples".to_string(),
            });
        }

        Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointRegistry;
    use crate::exchange::MockEngine;
    use crate::message::MessageKind;
    use std::io::Cursor;

    fn create_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn producer() -> (Arc<MockEngine>, ChunkProducer) {
        let engine = Arc::new(MockEngine::new("mock"));
        let endpoints = ClientEndpoints::default();
        let mut registry = EndpointRegistry::new();
        endpoints.register(&mut registry).unwrap();
        let session = Arc::new(Session::with_engine(engine.clone(), registry));
        let producer = ChunkProducer::new(session, &endpoints, AudioFormat::default());
        (engine, producer)
    }

    #[test]
    fn test_format_string() {
        assert_eq!(
            AudioFormat::default().format_string(),
            "base_format=PCM;sample_width=16;sample_rate=16000;num_channels=1"
        );
        assert_eq!(AudioFormat::default().frame_bytes(), 2);
    }

    #[test]
    fn test_chunk_state_builders() {
        let mid = ChunkState::new("u", "c");
        assert!(!mid.last_chunk_in_utt);
        let end = mid.clone().end_of_utterance();
        assert!(end.last_chunk_in_utt && !end.last_chunk_in_convo);
        let done = mid.end_of_conversation();
        assert!(done.last_chunk_in_utt && done.last_chunk_in_convo);
    }

    #[test]
    fn test_push_chunk_pairs_audio_and_state() {
        let (engine, mut producer) = producer();
        let state = ChunkState::new("utt", "convo");

        assert_eq!(producer.push_chunk(&[0u8; 8], &state).unwrap(), 4);
        assert_eq!(producer.push_chunk(&[0u8; 4], &state).unwrap(), 6);

        let pushed = engine.pushed();
        let order: Vec<(&str, MessageKind, u64)> = pushed
            .iter()
            .map(|(ep, m)| (ep.as_str(), m.kind(), m.time()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("raw_audio", MessageKind::Binary, 4),
                ("convstate_input", MessageKind::ConversationState, 4),
                ("raw_audio", MessageKind::Binary, 6),
                ("convstate_input", MessageKind::ConversationState, 6),
            ]
        );
        assert_eq!(
            pushed[0].1.as_binary().unwrap().format(),
            "base_format=PCM;sample_width=16;sample_rate=16000;num_channels=1"
        );
    }

    #[test]
    fn test_push_chunk_rejects_partial_frames() {
        let (engine, mut producer) = producer();
        let state = ChunkState::new("u", "c");
        assert!(matches!(
            producer.push_chunk(&[0u8; 3], &state),
            Err(ExchangeError::Audio { .. })
        ));
        assert!(producer.push_chunk(&[], &state).is_err());
        assert!(engine.pushed().is_empty());
        assert_eq!(producer.frames_pushed(), 0);
    }

    #[test]
    fn test_invalid_state_pushes_nothing() {
        let (engine, mut producer) = producer();
        let state = ChunkState {
            utterance_id: "u".to_string(),
            last_chunk_in_utt: false,
            convo_id: "c".to_string(),
            last_chunk_in_convo: true,
        };
        assert!(producer.push_chunk(&[0u8; 2], &state).is_err());
        assert!(engine.pushed().is_empty());
    }

    #[test]
    fn test_push_wav_flags_final_chunk_on_exact_multiple() {
        let (engine, mut producer) = producer();
        let wav = create_wav(&[1i16; 20], 16000, 1);

        let chunks = producer
            .push_wav(Cursor::new(wav), "utt", "convo", false, 10)
            .unwrap();
        assert_eq!(chunks, 2);

        let states: Vec<(u64, bool, bool)> = engine
            .pushed()
            .iter()
            .filter_map(|(_, m)| {
                m.as_conversation_state()
                    .map(|s| (m.time(), s.last_chunk_in_utt(), s.last_chunk_in_convo()))
            })
            .collect();
        assert_eq!(states, vec![(10, false, false), (20, true, false)]);
    }

    #[test]
    fn test_push_wav_short_final_chunk_ends_conversation() {
        let (engine, mut producer) = producer();
        let wav = create_wav(&[1i16; 25], 16000, 1);

        let chunks = producer
            .push_wav(Cursor::new(wav), "utt", "convo", true, 10)
            .unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(producer.frames_pushed(), 25);

        let pushed = engine.pushed();
        let (_, last) = pushed.last().unwrap();
        let state = last.as_conversation_state().unwrap();
        assert_eq!(last.time(), 25);
        assert!(state.last_chunk_in_utt());
        assert!(state.last_chunk_in_convo());
    }

    #[test]
    fn test_push_wav_rejects_mismatched_format() {
        let (engine, mut producer) = producer();
        let wav = create_wav(&[1i16; 10], 44100, 1);
        let result = producer.push_wav(Cursor::new(wav), "u", "c", false, 10);
        assert!(matches!(result, Err(ExchangeError::Audio { .. })));
        assert!(engine.pushed().is_empty());
    }

    #[test]
    fn test_push_wav_rejects_garbage() {
        let (_, mut producer) = producer();
        let result = producer.push_wav(Cursor::new(b"not a wav".to_vec()), "u", "c", false, 10);
        assert!(matches!(result, Err(ExchangeError::Audio { .. })));
    }

    #[test]
    fn test_push_wav_rejects_empty_file() {
        let (_, mut producer) = producer();
        let wav = create_wav(&[], 16000, 1);
        let result = producer.push_wav(Cursor::new(wav), "u", "c", false, 10);
        assert!(matches!(result, Err(ExchangeError::Audio { .. })));
    }
}
