use crate::error::{ExchangeError, Result};
use crate::exchange::block::Block;
use crate::message::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The streaming engine behind a session.
///
/// This trait allows swapping implementations (in-process loopback vs mock
/// vs an external engine binding).
pub trait Engine: Send + Sync {
    /// Hands `message` to the engine on a push endpoint without waiting for
    /// downstream processing.
    fn push(&self, endpoint: &str, message: Message) -> Result<()>;

    /// Waits up to `timeout` for the next block on a pull endpoint.
    ///
    /// Returns `Ok(None)` on timeout. A zero timeout never waits and
    /// `Duration::MAX` waits without bound.
    fn pull_one(&self, endpoint: &str, timeout: Duration) -> Result<Option<Block>>;

    /// Waits up to `timeout` for the first block, then returns it together
    /// with every block already available, in arrival order.
    fn pull_all(&self, endpoint: &str, timeout: Duration) -> Result<Vec<Block>>;

    /// Stops the engine and blocks until it has drained. Idempotent.
    fn shutdown(&self) -> Result<()>;

    /// Name of the engine implementation, for logging.
    fn name(&self) -> &str;
}

/// Implement Engine for Arc<T> to allow sharing one engine across owners.
impl<T: Engine> Engine for Arc<T> {
    fn push(&self, endpoint: &str, message: Message) -> Result<()> {
        (**self).push(endpoint, message)
    }

    fn pull_one(&self, endpoint: &str, timeout: Duration) -> Result<Option<Block>> {
        (**self).pull_one(endpoint, timeout)
    }

    fn pull_all(&self, endpoint: &str, timeout: Duration) -> Result<Vec<Block>> {
        (**self).pull_all(endpoint, timeout)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, Default)]
struct MockState {
    scripted: HashMap<String, VecDeque<Block>>,
    pushed: Vec<(String, Message)>,
    closed: bool,
    shutdown_calls: usize,
}

/// Scripted engine for testing.
///
/// Blocks queued with [`MockEngine::with_blocks`] or [`MockEngine::script`]
/// are handed out in order; pushes are recorded.
#[derive(Debug)]
pub struct MockEngine {
    name: String,
    state: Mutex<MockState>,
    ready: Condvar,
    fail_push: bool,
}

impl MockEngine {
    /// Create a new mock engine with nothing scripted
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(MockState::default()),
            ready: Condvar::new(),
            fail_push: false,
        }
    }

    /// Configure blocks to hand out on `endpoint`
    pub fn with_blocks(self, endpoint: &str, blocks: Vec<Block>) -> Self {
        self.lock()
            .scripted
            .entry(endpoint.to_string())
            .or_default()
            .extend(blocks);
        self
    }

    /// Configure the mock to reject every push
    pub fn with_push_failure(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Queues one more block on `endpoint`, waking any waiting pull.
    pub fn script(&self, endpoint: &str, block: Block) {
        self.lock()
            .scripted
            .entry(endpoint.to_string())
            .or_default()
            .push_back(block);
        self.ready.notify_all();
    }

    /// Every `(endpoint, message)` pushed so far, in order.
    pub fn pushed(&self) -> Vec<(String, Message)> {
        self.lock().pushed.clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.lock().shutdown_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Engine for MockEngine {
    fn push(&self, endpoint: &str, message: Message) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(ExchangeError::closed(endpoint));
        }
        if self.fail_push {
            return Err(ExchangeError::Other("mock push failure".to_string()));
        }
        state.pushed.push((endpoint.to_string(), message));
        Ok(())
    }

    fn pull_one(&self, endpoint: &str, timeout: Duration) -> Result<Option<Block>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(ExchangeError::closed(endpoint));
            }
            if let Some(block) = state
                .scripted
                .get_mut(endpoint)
                .and_then(VecDeque::pop_front)
            {
                return Ok(Some(block));
            }
            state = match deadline {
                None => self.ready.wait(state).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    fn pull_all(&self, endpoint: &str, timeout: Duration) -> Result<Vec<Block>> {
        let Some(first) = self.pull_one(endpoint, timeout)? else {
            return Ok(Vec::new());
        };
        let mut blocks = vec![first];
        if let Some(queue) = self.lock().scripted.get_mut(endpoint) {
            blocks.extend(queue.drain(..));
        }
        Ok(blocks)
    }

    fn shutdown(&self) -> Result<()> {
        let mut state = self.lock();
        state.closed = true;
        state.shutdown_calls += 1;
        self.ready.notify_all();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
