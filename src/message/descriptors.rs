//! Caller-defined string metadata attached to a message.
//!
//! On the wire descriptors travel as one string of `key=value;` pairs. Keys
//! are rendered in sorted order so the string is canonical, and neither keys
//! nor values may contain the delimiters or surrounding whitespace, which
//! would not survive a parse.

use super::MessageError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const PAIR_DELIMITER: char = ';';
const KEY_VALUE_DELIMITER: char = '=';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptors {
    entries: BTreeMap<String, String>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MessageError> {
        let key = key.into();
        let value = value.into();
        validate(&key, &value)?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a `key=value;key=value;` string. Empty elements are skipped.
    pub fn parse(s: &str) -> Result<Self, MessageError> {
        let mut descriptors = Self::new();
        for element in s.split(PAIR_DELIMITER) {
            let element = element.trim();
            if element.is_empty() {
                continue;
            }
            let (key, value) = element.split_once(KEY_VALUE_DELIMITER).ok_or_else(|| {
                MessageError::InvalidDescriptor {
                    key: element.to_string(),
                    message: "missing '='".to_string(),
                }
            })?;
            descriptors.set(key, value)?;
        }
        Ok(descriptors)
    }

    /// Renders `key=value;` pairs in key order.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push(KEY_VALUE_DELIMITER);
            out.push_str(value);
            out.push(PAIR_DELIMITER);
        }
        out
    }
}

fn validate(key: &str, value: &str) -> Result<(), MessageError> {
    let invalid = |message: &str| MessageError::InvalidDescriptor {
        key: key.to_string(),
        message: message.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.contains([PAIR_DELIMITER, KEY_VALUE_DELIMITER]) {
        return Err(invalid("key contains ';' or '='"));
    }
    if value.contains([PAIR_DELIMITER, KEY_VALUE_DELIMITER]) {
        return Err(invalid("value contains ';' or '='"));
    }
    if key.trim() != key || value.trim() != value {
        return Err(invalid("leading or trailing whitespace"));
    }
    Ok(())
}

impl fmt::Display for Descriptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for Descriptors {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
