// Biblical quotation detection for Koine Greek prose
//
// Pipeline: normalize the input, retrieve candidate verses from a vector
// index of the New Testament, then classify with a threshold table or an
// LLM verifier. External failures degrade to well-typed results; only
// retrieval outages surface to the caller.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod greek;
pub mod heuristic;
pub mod index;
pub mod retriever;
pub mod store;
pub mod types;
pub mod verifier;

pub use config::EngineConfig;
pub use engine::DetectionEngine;
pub use error::DetectError;
pub use types::{
    Candidate, DetectOptions, DetectionMode, DetectionResult, MatchType, SourceMatch, Verse,
};
