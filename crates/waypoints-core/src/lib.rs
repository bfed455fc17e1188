//! waypoints-core library.
//!
//! Local-first storage for a hierarchy of directions, waypoints, and steps,
//! with identical-text items auto-linked, an append-only achievement ledger,
//! per-day baseline points, and a one-shot migration into a remote account.
//!
//! Most callers want [`tracker::Tracker`], which wires every component to a
//! single [`store::Store`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per component, each mapping to a
//!   stable [`error::ErrorCode`]. `anyhow::Result` only at config loading.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Time and ids**: injected through [`clock::Clock`] and
//!   [`id::IdGenerator`] so tests are deterministic.

pub mod autolink;
pub mod baseline;
pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod ledger;
pub mod migration;
pub mod model;
pub mod profile;
pub mod repo;
pub mod store;
pub mod tracker;
pub mod validate;

pub use error::ErrorCode;
pub use repo::{ItemRepository, RepoError};
pub use tracker::{Completion, EditOutcome, Tracker};
