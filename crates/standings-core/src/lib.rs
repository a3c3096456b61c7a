//! standings-core — Normalization, aggregation, ranking and snapshot caching.
//!
//! This crate defines the data model, the store trait, the pure scoring
//! pipeline and the pre-aggregation cache that the rest of the standings
//! workspace builds on.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod harness;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod service;
pub mod statistics;
pub mod strategy;
pub mod submission;
pub mod traits;

#[cfg(test)]
mod testing;
