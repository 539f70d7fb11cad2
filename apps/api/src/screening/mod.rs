//! Candidate screening: scoring, ranking, the per-candidate pipeline and the
//! request orchestrator.

pub mod cancel;
pub mod handlers;
pub mod orchestrator;
pub mod pipeline;
pub mod ranking;
pub mod request;
pub mod scoring;
