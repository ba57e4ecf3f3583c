// Koine Greek text normalization and lexical overlap
//
// Normalization maps accented, cased, punctuated Greek to a canonical
// lowercase diacritic-free form so that query-side and index-side text
// compare equal. Overlap counting gates the heuristic classifier: semantic
// embeddings retrieve thematically similar but lexically disjoint verses,
// and a shared-word count rejects those cheaply.

use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tokens shorter than this are ignored by [`count_shared_words`]. Greek
/// articles, particles, and common conjunctions (ο, η, το, εν, δε, τε, ως,
/// εκ ...) are all one or two letters, so a length cut removes them without
/// a per-edition stopword list.
pub const DEFAULT_MIN_WORD_LEN: usize = 3;

/// Normalize Greek text for comparison and embedding.
///
/// In order: NFD decomposition, combining-mark removal, Unicode lowercasing,
/// final sigma (ς) to medial sigma (σ), removal of every code point that is
/// neither alphabetic nor whitespace (punctuation collapses to nothing, not
/// to a space), and whitespace run collapsing with trim.
///
/// The function is idempotent and invariant under differences of accentuation
/// or letter case.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    let folded = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'ς' { 'σ' } else { c });

    for c in folded {
        if c.is_whitespace() {
            if !out.is_empty() {
                pending_space = true;
            }
        } else if c.is_alphabetic() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
        // anything else (punctuation, digits, symbols) drops silently
    }

    out
}

/// Split normalized text into word tokens of at least `min_len` characters.
fn significant_tokens(normalized: &str, min_len: usize) -> HashSet<&str> {
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .collect()
}

/// Count word types shared by two Greek texts after normalization.
///
/// Both inputs are normalized, tokenized on whitespace, and filtered to
/// tokens of at least `min_len` characters; the result is the cardinality of
/// the token-set intersection. Symmetric and deterministic.
pub fn count_shared_words(a: &str, b: &str, min_len: usize) -> usize {
    let na = normalize(a);
    let nb = normalize(b);

    let ta = significant_tokens(&na, min_len);
    let tb = significant_tokens(&nb, min_len);

    ta.intersection(&tb).count()
}
