//! In-process reference engine.
//!
//! Pushed messages go through one bounded queue to a router thread. The
//! router feeds each message to every stream it sources (see
//! [`EngineConfig::source_for`]) and runs one [`BlockSynchronizer`] per pull
//! endpoint. Finished blocks land on an unbounded per-endpoint channel, so
//! routing never waits on consumers.

use crate::config::EngineConfig;
use crate::endpoint::EndpointRegistry;
use crate::error::{ExchangeError, Result};
use crate::exchange::block::{Block, BlockSynchronizer};
use crate::exchange::engine::Engine;
use crate::message::Message;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ROUTER_THREAD_NAME: &str = "streamgate-router";

struct Routed {
    endpoint: String,
    message: Message,
}

/// One pull endpoint as seen by the router.
struct Output {
    endpoint: String,
    synchronizer: BlockSynchronizer,
    blocks: Sender<Block>,
}

pub struct LoopbackEngine {
    push_endpoints: BTreeSet<String>,
    input: Mutex<Option<Sender<Routed>>>,
    outputs: HashMap<String, Receiver<Block>>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackEngine {
    /// Validates the wiring and starts the router thread.
    pub fn start(config: &EngineConfig, registry: &EndpointRegistry) -> Result<Self> {
        config.validate()?;
        config.check_wiring(registry)?;

        let mut outputs = Vec::new();
        let mut receivers = HashMap::new();
        // push endpoint -> (output index, stream)
        let mut fan_out: HashMap<String, Vec<(usize, String)>> = HashMap::new();

        for (endpoint, streams) in registry.pull_endpoints() {
            let (tx, rx) = unbounded();
            let index = outputs.len();
            for stream in streams {
                fan_out
                    .entry(config.source_for(stream).to_string())
                    .or_default()
                    .push((index, stream.clone()));
            }
            outputs.push(Output {
                endpoint: endpoint.to_string(),
                synchronizer: BlockSynchronizer::new(streams.iter().cloned()),
                blocks: tx,
            });
            receivers.insert(endpoint.to_string(), rx);
        }

        let (input_tx, input_rx) = bounded::<Routed>(config.engine.input_capacity);
        let verbose = config.engine.verbose;
        let router = thread::Builder::new()
            .name(ROUTER_THREAD_NAME.to_string())
            .spawn(move || route(input_rx, fan_out, outputs, verbose))
            .map_err(|e| ExchangeError::EngineStartup {
                message: format!("failed to spawn router thread: {}", e),
            })?;

        tracing::debug!(
            push_endpoints = registry.push_endpoints().count(),
            pull_endpoints = receivers.len(),
            capacity = config.engine.input_capacity,
            "Loopback engine started"
        );

        Ok(Self {
            push_endpoints: registry.push_endpoints().map(str::to_string).collect(),
            input: Mutex::new(Some(input_tx)),
            outputs: receivers,
            router: Mutex::new(Some(router)),
        })
    }

    fn receiver(&self, endpoint: &str) -> Result<&Receiver<Block>> {
        self.outputs
            .get(endpoint)
            .ok_or_else(|| ExchangeError::UnknownEndpoint {
                endpoint: endpoint.to_string(),
            })
    }

    fn input(&self) -> MutexGuard<'_, Option<Sender<Routed>>> {
        self.input.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Router loop; exits once every input sender is gone and the queue is empty.
fn route(
    input: Receiver<Routed>,
    fan_out: HashMap<String, Vec<(usize, String)>>,
    mut outputs: Vec<Output>,
    verbose: bool,
) {
    while let Ok(Routed { endpoint, message }) = input.recv() {
        let Some(targets) = fan_out.get(&endpoint) else {
            if verbose {
                tracing::debug!(endpoint = %endpoint, "No stream reads this endpoint, dropping");
            }
            continue;
        };
        for (index, stream) in targets {
            let output = &mut outputs[*index];
            output.synchronizer.offer(stream, message.clone());
            while let Some(block) = output.synchronizer.next_block() {
                if verbose {
                    tracing::debug!(
                        endpoint = %output.endpoint,
                        time = block.time(),
                        "Block ready"
                    );
                }
                // A send only fails once the engine itself is gone.
                if output.blocks.send(block).is_err() {
                    return;
                }
            }
        }
    }

    for output in &outputs {
        let pending = output.synchronizer.pending();
        if pending > 0 {
            tracing::warn!(
                endpoint = %output.endpoint,
                pending = pending,
                "Discarding incomplete block at shutdown"
            );
        }
    }
}

impl Engine for LoopbackEngine {
    fn push(&self, endpoint: &str, message: Message) -> Result<()> {
        if !self.push_endpoints.contains(endpoint) {
            return Err(ExchangeError::UnknownEndpoint {
                endpoint: endpoint.to_string(),
            });
        }
        // Clone out so shutdown never waits behind a push blocked on a full queue.
        let sender = self
            .input()
            .as_ref()
            .cloned()
            .ok_or_else(|| ExchangeError::closed(endpoint))?;
        sender
            .send(Routed {
                endpoint: endpoint.to_string(),
                message,
            })
            .map_err(|_| ExchangeError::closed(endpoint))
    }

    fn pull_one(&self, endpoint: &str, timeout: Duration) -> Result<Option<Block>> {
        let receiver = self.receiver(endpoint)?;
        if timeout.is_zero() {
            return match receiver.try_recv() {
                Ok(block) => Ok(Some(block)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(ExchangeError::closed(endpoint)),
            };
        }
        match receiver.recv_timeout(timeout) {
            Ok(block) => Ok(Some(block)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ExchangeError::closed(endpoint)),
        }
    }

    fn pull_all(&self, endpoint: &str, timeout: Duration) -> Result<Vec<Block>> {
        let Some(first) = self.pull_one(endpoint, timeout)? else {
            return Ok(Vec::new());
        };
        let mut blocks = vec![first];
        blocks.extend(self.receiver(endpoint)?.try_iter());
        Ok(blocks)
    }

    fn shutdown(&self) -> Result<()> {
        drop(self.input().take());
        let handle = self
            .router
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| ExchangeError::Other("router thread panicked".to_string()))?;
            tracing::debug!("Loopback engine stopped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "Loopback engine shutdown failed");
        }
    }
}
