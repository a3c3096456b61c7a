//! standings-store — Attempt store backends.
//!
//! Implements the `AttemptStore` trait over an in-memory, optionally
//! file-backed dataset, plus a scripted store for tests, and loads the
//! `standings.toml` configuration that wires them up.

pub mod config;
pub mod memory;
pub mod mock;

pub use config::{create_store, load_config, load_config_from, StandingsConfig, StoreConfig};
pub use memory::{Dataset, InMemoryStore};
pub use mock::ScriptedStore;
