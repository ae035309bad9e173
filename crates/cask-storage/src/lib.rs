//! Cask Storage
//!
//! The `Backend` interface content is written to and read from, the local
//! filesystem implementation of it, and the active anti-entropy walker that
//! sweeps a backend's contents in the background.

pub mod aae;
pub mod backend;

pub use aae::{run as run_active_entropy, AaeHooks};
pub use backend::{Backend, LocalBackend};
