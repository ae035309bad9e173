//! The `axum` adapter exposing a [`cask_cluster::Site`] over HTTP.
//!
//! Thin by design: every handler in [`handlers`] is a few lines that parses
//! its inputs and calls straight into `Site`. All placement, replication,
//! and repair logic lives in `cask-cluster`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
