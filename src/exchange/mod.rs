//! Exchange layer: sessions over a streaming engine.
//!
//! A [`Session`] binds an [`Engine`] to an [`EndpointRegistry`](crate::endpoint::EndpointRegistry)
//! and gates every push and pull on its lifecycle. Pull endpoints yield
//! [`Block`]s assembled by a [`BlockSynchronizer`].

pub mod block;
pub mod engine;
pub mod loopback;
pub mod session;

pub use block::{Block, BlockSynchronizer};
pub use engine::{Engine, MockEngine};
pub use loopback::LoopbackEngine;
pub use session::{Session, SessionState};
