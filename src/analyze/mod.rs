// src/analyze/mod.rs
pub mod ai_adapter;
pub mod classify;
pub mod facts;
pub mod summarize;

pub use classify::{Category, Classifier};
pub use facts::{Fact, FactKind, FactSet};
pub use summarize::{Draft, FirstSuccess, Provenance, SummaryRequest, Summarizer, VerifiedSummary, Verifier};
