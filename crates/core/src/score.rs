use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").expect("valid regex"));

/// ROUGE-1 recall of the expected fact in the response, on a 0-100 scale.
/// Case-sensitive, stemmed unigram overlap with clipped counts. This is the
/// primary scoring path persisted with every trial.
pub fn rouge1_recall(expected: &str, response: &str) -> f64 {
    let expected_words = stemmed_words(expected);
    if expected_words.is_empty() {
        return 0.0;
    }
    let response_words = stemmed_words(response);
    let mut available: HashMap<&str, usize> = HashMap::new();
    for word in &response_words {
        *available.entry(word.as_str()).or_insert(0) += 1;
    }
    let mut matched = 0usize;
    for word in &expected_words {
        if let Some(count) = available.get_mut(word.as_str()) {
            if *count > 0 {
                *count -= 1;
                matched += 1;
            }
        }
    }
    matched as f64 / expected_words.len() as f64 * 100.0
}

/// ROUGE-L recall: longest common subsequence of stemmed words over the
/// expected length, on a 0-100 scale. Same tokenization as `rouge1_recall`.
pub fn rouge_l_recall(expected: &str, response: &str) -> f64 {
    let expected_words = stemmed_words(expected);
    if expected_words.is_empty() {
        return 0.0;
    }
    let response_words = stemmed_words(response);
    let lcs = lcs_len(&expected_words, &response_words);
    lcs as f64 / expected_words.len() as f64 * 100.0
}

/// Secondary aggregation-time metric: lowercases both sides, splits on
/// whitespace, and measures unique-word intersection over the expected
/// vocabulary, on a 0-100 scale. Kept under a distinct name so it is never
/// conflated with the case-sensitive ROUGE path.
pub fn word_overlap_recall(expected: &str, response: &str) -> f64 {
    let expected_words: HashSet<String> = expected
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.to_string())
        .collect();
    if expected_words.is_empty() {
        return 0.0;
    }
    let response_words: HashSet<String> = response
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.to_string())
        .collect();
    let shared = expected_words.intersection(&response_words).count();
    shared as f64 / expected_words.len() as f64 * 100.0
}

fn stemmed_words(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|word| stem(word.as_str()))
        .collect()
}

/// Compact suffix-stripping stemmer covering the plural and participle forms
/// that matter for short factual sentences.
fn stem(word: &str) -> String {
    let mut out = word.to_string();
    if let Some(base) = out.strip_suffix("sses") {
        out = format!("{base}ss");
    } else if let Some(base) = out.strip_suffix("ies") {
        out = format!("{base}i");
    } else if out.len() > 3 && out.ends_with('s') && !out.ends_with("ss") {
        out.truncate(out.len() - 1);
    }
    if let Some(stripped) = strip_participle(&out) {
        out = stripped;
    }
    out
}

fn strip_participle(word: &str) -> Option<String> {
    for suffix in ["ing", "ed"] {
        let base = match word.strip_suffix(suffix) {
            Some(base) if base.len() >= 2 && has_vowel(base) => base,
            _ => continue,
        };
        let mut out = base.to_string();
        let bytes = out.as_bytes();
        let n = bytes.len();
        if n >= 2 && bytes[n - 1] == bytes[n - 2] && !matches!(bytes[n - 1], b'l' | b's' | b'z') {
            out.truncate(n - 1);
        }
        return Some(out);
    }
    None
}

fn has_vowel(word: &str) -> bool {
    word.chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y'))
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
