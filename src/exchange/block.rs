//! Synchronized blocks and the synchronizer that assembles them.

use crate::error::{ExchangeError, Result};
use crate::message::Message;
use std::collections::{BTreeMap, VecDeque};

/// One message per constituent stream, all sharing the same time.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    time: u64,
    messages: BTreeMap<String, Message>,
}

impl Block {
    /// Builds a block from `(stream, message)` pairs.
    ///
    /// Fails when no messages are given, a stream appears twice, or the
    /// messages disagree on time.
    pub fn from_messages<I, S>(messages: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Message)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        let mut time = None;
        for (stream, message) in messages {
            let stream = stream.into();
            match time {
                None => time = Some(message.time()),
                Some(t) if t != message.time() => {
                    return Err(ExchangeError::InvalidBlock {
                        message: format!(
                            "stream {} has time {} but the block time is {}",
                            stream,
                            message.time(),
                            t
                        ),
                    });
                }
                Some(_) => {}
            }
            if map.insert(stream.clone(), message).is_some() {
                return Err(ExchangeError::InvalidBlock {
                    message: format!("stream {} appears twice", stream),
                });
            }
        }
        let time = time.ok_or_else(|| ExchangeError::InvalidBlock {
            message: "a block needs at least one message".to_string(),
        })?;
        Ok(Self {
            time,
            messages: map,
        })
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn get(&self, stream: &str) -> Option<&Message> {
        self.messages.get(stream)
    }

    /// Stream names, sorted.
    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Message)> {
        self.messages.iter().map(|(s, m)| (s.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> BTreeMap<String, Message> {
        self.messages
    }

    /// True when the block covers exactly `streams`.
    pub fn covers<'a, I>(&self, streams: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut expected = streams.into_iter();
        let mut actual = self.messages.keys();
        loop {
            match (expected.next(), actual.next()) {
                (None, None) => return true,
                (Some(e), Some(a)) if e == a => continue,
                _ => return false,
            }
        }
    }
}

/// Aligns per-stream message queues into blocks of equal time.
///
/// Output times are strictly increasing. A head message that is older than
/// another stream's head can never be matched and is dropped.
#[derive(Debug)]
pub struct BlockSynchronizer {
    queues: BTreeMap<String, VecDeque<Message>>,
    last_emitted: Option<u64>,
}

impl BlockSynchronizer {
    pub fn new<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queues: streams
                .into_iter()
                .map(|s| (s.into(), VecDeque::new()))
                .collect(),
            last_emitted: None,
        }
    }

    /// Queues `message` on `stream`. Returns false when the message was
    /// discarded: unknown stream, or not later than what the stream or the
    /// output already reached.
    pub fn offer(&mut self, stream: &str, message: Message) -> bool {
        let last_emitted = self.last_emitted;
        let Some(queue) = self.queues.get_mut(stream) else {
            return false;
        };
        let floor = queue.back().map(Message::time).or(last_emitted);
        if let Some(floor) = floor
            && message.time() <= floor
        {
            tracing::warn!(
                stream = stream,
                time = message.time(),
                floor = floor,
                "Discarding out-of-order message"
            );
            return false;
        }
        queue.push_back(message);
        true
    }

    /// Emits the next complete block, if every stream has one ready.
    pub fn next_block(&mut self) -> Option<Block> {
        loop {
            let newest = self
                .queues
                .values()
                .map(|q| q.front().map(Message::time))
                .collect::<Option<Vec<u64>>>()?
                .into_iter()
                .max()?;

            let mut dropped = false;
            for (stream, queue) in &mut self.queues {
                while let Some(head) = queue.front()
                    && head.time() < newest
                {
                    tracing::warn!(
                        stream = stream.as_str(),
                        time = head.time(),
                        newest = newest,
                        "Discarding message with no partner on other streams"
                    );
                    queue.pop_front();
                    dropped = true;
                }
            }
            if dropped {
                continue;
            }

            let messages: BTreeMap<String, Message> = self
                .queues
                .iter_mut()
                .filter_map(|(stream, queue)| queue.pop_front().map(|m| (stream.clone(), m)))
                .collect();
            self.last_emitted = Some(newest);
            return Some(Block {
                time: newest,
                messages,
            });
        }
    }

    /// Messages queued and not yet emitted.
    pub fn pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }
}
