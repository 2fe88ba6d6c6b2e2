// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod bootstrap;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod leader;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod schedule;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::error::{RelayError, Result};
pub use crate::ingest::types::{FeedSpec, NewsItem};
pub use crate::notify::{Dispatcher, Notifier, OutboundMessage};
pub use crate::pipeline::{run_leader_loop, CycleReport, Relay, RelayParts, RelaySettings};
