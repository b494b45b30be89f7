//! Push and pull endpoint declarations.
//!
//! A push endpoint is a named sink feeding the engine. A pull endpoint is a
//! named aggregation point that yields blocks drawn from a fixed, non-empty
//! set of output streams. The registry is pure configuration: it is built
//! before a session opens and never changes afterwards.

use crate::error::{ExchangeError, Result};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointRegistry {
    push: BTreeSet<String>,
    pull: BTreeMap<String, BTreeSet<String>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a push endpoint. Declaring the same name twice is a no-op.
    pub fn add_push_endpoint(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ExchangeError::InvalidEndpoint {
                endpoint: name,
                message: "name is empty".to_string(),
            });
        }
        self.push.insert(name);
        Ok(())
    }

    /// Declares a pull endpoint over `streams`. Re-declaring a name replaces
    /// its stream set.
    pub fn add_pull_endpoint<I, S>(&mut self, name: impl Into<String>, streams: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ExchangeError::InvalidEndpoint {
                endpoint: name,
                message: "name is empty".to_string(),
            });
        }
        let streams: BTreeSet<String> = streams.into_iter().map(Into::into).collect();
        if streams.is_empty() {
            return Err(ExchangeError::InvalidEndpoint {
                endpoint: name,
                message: "a pull endpoint needs at least one stream".to_string(),
            });
        }
        if let Some(blank) = streams.iter().find(|s| s.trim().is_empty()) {
            return Err(ExchangeError::InvalidEndpoint {
                endpoint: name,
                message: format!("invalid stream name {:?}", blank),
            });
        }
        self.pull.insert(name, streams);
        Ok(())
    }

    /// Push endpoint names, sorted.
    pub fn push_endpoints(&self) -> impl Iterator<Item = &str> {
        self.push.iter().map(String::as_str)
    }

    /// Pull endpoint names with their stream sets, sorted by name.
    pub fn pull_endpoints(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.pull.iter().map(|(name, streams)| (name.as_str(), streams))
    }

    pub fn streams_for(&self, pull_endpoint: &str) -> Option<&BTreeSet<String>> {
        self.pull.get(pull_endpoint)
    }

    pub fn has_push_endpoint(&self, name: &str) -> bool {
        self.push.contains(name)
    }

    pub fn has_pull_endpoint(&self, name: &str) -> bool {
        self.pull.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.pull.is_empty()
    }
}
