use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::ExtractLimits;
use crate::entities::drug::{ResolvedDrug, resolve_many};
use crate::sources::Terminology;

/// Dosage and frequency jargon that never names a drug on its own.
const STOP_PHRASES: [&str; 8] = [
    "take", "tablet", "capsule", "daily", "mg", "bid", "tid", "prn",
];

const MIN_PHRASE_CHARS: usize = 3;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A token starts with a letter, so purely numeric runs ("500", "7") never qualify.
    RE.get_or_init(|| Regex::new(r"\p{L}[\p{L}\p{N}'\-]*").expect("valid regex"))
}

fn normalize_whitespace(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() || c.is_whitespace() { ' ' } else { c })
        .collect()
}

fn is_stop_phrase(phrase: &str) -> bool {
    let lower = phrase.to_lowercase();
    STOP_PHRASES.contains(&lower.as_str())
}

fn keep_phrase(phrase: &str) -> bool {
    phrase.chars().count() >= MIN_PHRASE_CHARS && !is_stop_phrase(phrase)
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    token_re()
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Every contiguous phrase of 1..=`max_phrase_len` tokens that could name a drug.
///
/// Phrases come out in the order they first appear (all phrases starting at token 0, then
/// token 1, ...) with exact duplicates removed, so any cap applied downstream is stable.
pub fn candidate_phrases(text: &str, max_phrase_len: usize) -> Vec<String> {
    let tokens = tokenize(text);
    let max_len = max_phrase_len.max(1);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for start in 0..tokens.len() {
        for len in 1..=max_len {
            let end = start + len;
            if end > tokens.len() {
                break;
            }
            let phrase = tokens[start..end].join(" ");
            if keep_phrase(&phrase) && seen.insert(phrase.clone()) {
                out.push(phrase);
            }
        }
    }
    out
}

/// Finds likely drug names in free text.
///
/// At most `limits.candidate_cap` phrases are resolved; the resolved drugs are unique by code
/// and truncated to `limits.result_limit`.
pub async fn extract_drugs(
    terminology: &dyn Terminology,
    text: &str,
    limits: &ExtractLimits,
) -> Vec<ResolvedDrug> {
    let mut candidates = candidate_phrases(text, limits.max_phrase_len);
    let total = candidates.len();
    candidates.truncate(limits.candidate_cap);
    debug!(
        total,
        resolving = candidates.len(),
        "extracted candidate phrases"
    );

    let mut resolved = resolve_many(terminology, &candidates, limits.concurrency).await;
    resolved.truncate(limits.result_limit);
    resolved
}
