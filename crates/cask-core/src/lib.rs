//! Cask Core Library
//!
//! Shared types used across the Cask content-addressed object store: the
//! [`Key`] identifier, [`Config`] loading, and the common [`CaskError`].

pub mod config;
pub mod error;
pub mod key;

pub use config::Config;
pub use error::{CaskError, Result};
pub use key::Key;

/// Cask version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of virtual ring tokens hashed per physical node.
pub const RING_REPLICAS_PER_NODE: usize = 16;

/// Multiple of the heartbeat interval after which a silent neighbor is reaped.
pub const REAP_AFTER_MISSED_HEARTBEATS: u32 = 3;
