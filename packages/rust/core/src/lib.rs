//! Core discovery orchestration for GrantScout.
//!
//! This crate ties extraction, parsing, deduplication, and digest delivery
//! into a single-flight discovery run (see [`pipeline::DiscoveryOrchestrator`]).

pub mod dedup;
pub mod log;
pub mod pipeline;
pub mod repository;

pub use dedup::{DedupOutcome, filter_new};
pub use log::LogStream;
pub use pipeline::{DiscoveryOrchestrator, NotificationOutcome, RunReport};
pub use repository::GrantRepository;
