// Type definitions shared across the detection pipeline

use serde::{Deserialize, Serialize};

/// A single New Testament verse as stored at ingestion time.
///
/// `greek_normalized` is the output of [`crate::greek::normalize`] applied to
/// `greek_original`; the core never recomputes it for stored verses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub id: i64,
    pub reference: String,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub greek_original: String,
    pub greek_normalized: String,
    pub source_edition: String,
}

/// A retrieval hit: a verse plus its similarity score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub verse: Verse,
    pub similarity_score: f32,
}

/// Classification of a detected match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    CloseParaphrase,
    LooseParaphrase,
    Allusion,
    NonBiblical,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::CloseParaphrase => "close_paraphrase",
            MatchType::LooseParaphrase => "loose_paraphrase",
            MatchType::Allusion => "allusion",
            MatchType::NonBiblical => "non_biblical",
        }
    }

    /// Parse the wire form used in LLM responses and API payloads.
    pub fn parse(s: &str) -> Option<MatchType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(MatchType::Exact),
            "close_paraphrase" => Some(MatchType::CloseParaphrase),
            "loose_paraphrase" => Some(MatchType::LooseParaphrase),
            "allusion" => Some(MatchType::Allusion),
            "non_biblical" => Some(MatchType::NonBiblical),
            _ => None,
        }
    }

    /// True for the four quotation-grade variants.
    pub fn is_quotation(&self) -> bool {
        !matches!(self, MatchType::NonBiblical)
    }
}

/// Detection mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// LLM verification over the retrieved candidates (accurate, slower).
    Llm,
    /// Threshold-table classification only (fast).
    Heuristic,
}

/// Per-request options for [`crate::engine::DetectionEngine::detect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectOptions {
    pub mode: DetectionMode,
    pub min_confidence: u8,
    pub include_all_candidates: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        DetectOptions {
            mode: DetectionMode::Llm,
            min_confidence: 50,
            include_all_candidates: false,
        }
    }
}

/// A candidate rendered for callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub reference: String,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub greek_text: String,
    pub similarity_score: f32,
    pub source_edition: String,
}

impl From<&Candidate> for SourceMatch {
    fn from(c: &Candidate) -> Self {
        SourceMatch {
            reference: c.verse.reference.clone(),
            book: c.verse.book.clone(),
            chapter: c.verse.chapter,
            verse: c.verse.verse,
            greek_text: c.verse.greek_original.clone(),
            similarity_score: c.similarity_score,
            source_edition: c.verse.source_edition.clone(),
        }
    }
}

/// Final outcome of a detection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub input_text: String,
    pub is_quotation: bool,
    /// 0-100.
    pub confidence: u8,
    pub match_type: MatchType,
    /// Top candidates, at most three unless `include_all_candidates` was set.
    pub sources: Vec<SourceMatch>,
    /// Present unless `match_type` is `non_biblical`.
    pub best_match: Option<SourceMatch>,
    pub explanation: String,
    pub processing_time_ms: u64,
}
