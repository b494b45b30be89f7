use crate::config::{EngineConfig, Overrides};
use crate::endpoint::EndpointRegistry;
use crate::error::{ExchangeError, Result};
use crate::exchange::block::Block;
use crate::exchange::engine::Engine;
use crate::exchange::loopback::LoopbackEngine;
use crate::message::Message;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle of a [`Session`]. Push and pull are only valid while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Running,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Running => "running",
            SessionState::ShuttingDown => "shutting down",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One started engine plus the endpoints declared for it.
///
/// `Session` is `Send + Sync`; share it as `Arc<Session>` between the
/// producer and consumer threads. [`Session::close`] is the authoritative
/// teardown and may race with in-flight pushes and pulls.
pub struct Session {
    engine: Arc<dyn Engine>,
    registry: EndpointRegistry,
    state: Mutex<SessionState>,
    state_changed: Condvar,
    verbose: bool,
    quiet: bool,
}

impl Session {
    /// Loads the TOML configuration at `config_path`, applies `overrides`
    /// and starts the in-process engine for `registry`.
    pub fn open(
        config_path: &Path,
        overrides: &Overrides,
        registry: EndpointRegistry,
        quiet: bool,
    ) -> Result<Self> {
        let config = EngineConfig::load_with_overrides(config_path, overrides)?;
        Self::open_with_config(&config, registry, quiet)
    }

    /// Starts the in-process engine from an already loaded configuration.
    pub fn open_with_config(
        config: &EngineConfig,
        registry: EndpointRegistry,
        quiet: bool,
    ) -> Result<Self> {
        let engine = LoopbackEngine::start(config, &registry)?;
        let mut session = Self::with_engine(Arc::new(engine), registry);
        session.verbose = config.engine.verbose;
        session.quiet = quiet;
        if !quiet {
            tracing::info!(
                push_endpoints = session.registry.push_endpoints().count(),
                pull_endpoints = session.registry.pull_endpoints().count(),
                "Session opened"
            );
        }
        Ok(session)
    }

    /// Binds an already started engine.
    pub fn with_engine(engine: Arc<dyn Engine>, registry: EndpointRegistry) -> Self {
        Self {
            engine,
            registry,
            state: Mutex::new(SessionState::Running),
            state_changed: Condvar::new(),
            verbose: false,
            quiet: false,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Hands `message` to a push endpoint without waiting for processing.
    pub fn push(&self, endpoint: &str, message: Message) -> Result<()> {
        self.ensure_running(endpoint)?;
        if !self.registry.has_push_endpoint(endpoint) {
            return Err(ExchangeError::UnknownEndpoint {
                endpoint: endpoint.to_string(),
            });
        }
        if self.verbose {
            tracing::debug!(
                endpoint = endpoint,
                kind = %message.kind(),
                time = message.time(),
                "Push"
            );
        }
        self.engine.push(endpoint, message)
    }

    /// Waits up to `timeout` for the next block on a pull endpoint.
    ///
    /// Returns `Ok(None)` on timeout. A zero timeout never waits and
    /// `Duration::MAX` waits without bound.
    pub fn pull_one(&self, endpoint: &str, timeout: Duration) -> Result<Option<Block>> {
        self.ensure_running(endpoint)?;
        let streams = self.declared_streams(endpoint)?;
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let remaining = match deadline {
                None => Duration::MAX,
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            };
            let Some(block) = self.engine.pull_one(endpoint, remaining)? else {
                return Ok(None);
            };
            if block.covers(streams) {
                self.log_pulled(endpoint, 1);
                return Ok(Some(block));
            }
            self.warn_mismatch(endpoint, &block);
        }
    }

    /// Waits up to `timeout` for the first block, then returns every block
    /// already available in arrival order. Empty on timeout.
    ///
    /// Blocks that do not match the declared streams are dropped and do not
    /// end the wait.
    pub fn pull_all(&self, endpoint: &str, timeout: Duration) -> Result<Vec<Block>> {
        self.ensure_running(endpoint)?;
        let streams = self.declared_streams(endpoint)?;
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let remaining = match deadline {
                None => Duration::MAX,
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            };
            let pulled = self.engine.pull_all(endpoint, remaining)?;
            if pulled.is_empty() {
                return Ok(pulled);
            }
            let blocks: Vec<Block> = pulled
                .into_iter()
                .filter(|block| {
                    let complete = block.covers(streams);
                    if !complete {
                        self.warn_mismatch(endpoint, block);
                    }
                    complete
                })
                .collect();
            if !blocks.is_empty() {
                self.log_pulled(endpoint, blocks.len());
                return Ok(blocks);
            }
        }
    }

    /// Stops accepting pushes, lets the engine drain and blocks until it has
    /// stopped. Afterwards every push and pull fails with `ChannelClosed`.
    ///
    /// A second call returns `Ok(())` immediately; a call racing an
    /// in-progress close waits for it to finish.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            loop {
                match *state {
                    SessionState::Running => {
                        *state = SessionState::ShuttingDown;
                        break;
                    }
                    SessionState::ShuttingDown => {
                        state = self
                            .state_changed
                            .wait(state)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                    SessionState::Closed | SessionState::Uninitialized => {
                        *state = SessionState::Closed;
                        return Ok(());
                    }
                }
            }
        }

        let result = self.engine.shutdown();

        *self.lock_state() = SessionState::Closed;
        self.state_changed.notify_all();

        match &result {
            Ok(()) if !self.quiet => tracing::info!(engine = self.engine.name(), "Session closed"),
            Ok(()) => {}
            Err(e) => tracing::error!(error = %e, "Engine shutdown failed"),
        }
        result
    }

    fn ensure_running(&self, endpoint: &str) -> Result<()> {
        match *self.lock_state() {
            SessionState::Running => Ok(()),
            _ => Err(ExchangeError::closed(endpoint)),
        }
    }

    fn declared_streams(&self, endpoint: &str) -> Result<&std::collections::BTreeSet<String>> {
        self.registry
            .streams_for(endpoint)
            .ok_or_else(|| ExchangeError::UnknownEndpoint {
                endpoint: endpoint.to_string(),
            })
    }

    fn warn_mismatch(&self, endpoint: &str, block: &Block) {
        tracing::warn!(
            endpoint = endpoint,
            time = block.time(),
            streams = ?block.streams().collect::<Vec<_>>(),
            "Dropping block whose streams differ from the endpoint declaration"
        );
    }

    fn log_pulled(&self, endpoint: &str, count: usize) {
        if self.verbose && count > 0 {
            tracing::debug!(endpoint = endpoint, blocks = count, "Pull");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() == SessionState::Running
            && let Err(e) = self.close()
        {
            tracing::error!(error = %e, "Session close on drop failed");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}
