// Heuristic classifier
//
// Maps a ranked candidate list to a result using a fixed threshold table
// gated by lexical overlap. The overlap gate is what rejects verses that are
// thematically similar but lexically disjoint from the input; without it the
// embedding scores alone produce false positives.

use crate::greek::{count_shared_words, DEFAULT_MIN_WORD_LEN};
use crate::types::{Candidate, DetectionResult, MatchType, SourceMatch};

/// Score/overlap thresholds, evaluated top-down; the first row whose score
/// range matches decides, and a failed overlap gate rejects outright.
const THRESHOLDS: [(f32, usize, MatchType, u8); 4] = [
    (0.95, 5, MatchType::Exact, 95),
    (0.90, 3, MatchType::CloseParaphrase, 85),
    (0.80, 3, MatchType::LooseParaphrase, 70),
    (0.70, 2, MatchType::Allusion, 55),
];

/// Classify `text` against retrieved candidates without an LLM call.
///
/// `processing_time_ms` is left at zero; the engine stamps it.
pub fn classify(text: &str, candidates: &[Candidate]) -> DetectionResult {
    if candidates.is_empty() {
        return DetectionResult {
            input_text: text.to_string(),
            is_quotation: false,
            confidence: 90,
            match_type: MatchType::NonBiblical,
            sources: Vec::new(),
            best_match: None,
            explanation: "No similar biblical texts found in vector search.".to_string(),
            processing_time_ms: 0,
        };
    }

    let top = &candidates[0];
    let score = top.similarity_score;
    let overlap = count_shared_words(text, &top.verse.greek_normalized, DEFAULT_MIN_WORD_LEN);

    let sources: Vec<SourceMatch> = candidates.iter().take(3).map(SourceMatch::from).collect();

    for (min_score, min_overlap, match_type, confidence) in THRESHOLDS {
        if score < min_score {
            continue;
        }
        if overlap < min_overlap {
            // The score range matched but the lexical gate did not; this is
            // the embedding-only false-positive case, rejected outright.
            return DetectionResult {
                input_text: text.to_string(),
                is_quotation: false,
                confidence: 60,
                match_type: MatchType::NonBiblical,
                sources,
                best_match: None,
                explanation: format!(
                    "Similarity {:.3} suggests {} but only {} shared word(s) with {} (need {}); \
                     rejecting as lexically disjoint.",
                    score,
                    match_type.as_str(),
                    overlap,
                    top.verse.reference,
                    min_overlap
                ),
                processing_time_ms: 0,
            };
        }

        return DetectionResult {
            input_text: text.to_string(),
            is_quotation: true,
            confidence,
            match_type,
            best_match: Some(SourceMatch::from(top)),
            explanation: format!(
                "Heuristic classification from similarity {:.3} and {} shared words. Top match: {}.",
                score, overlap, top.verse.reference
            ),
            sources,
            processing_time_ms: 0,
        };
    }

    DetectionResult {
        input_text: text.to_string(),
        is_quotation: false,
        confidence: 60,
        match_type: MatchType::NonBiblical,
        sources,
        best_match: None,
        explanation: format!(
            "Top similarity {:.3} is below the allusion threshold.",
            score
        ),
        processing_time_ms: 0,
    }
}
