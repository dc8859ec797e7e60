use crate::error::{HarnessError, Result};
use crate::tokenizer::{TokenMemo, Tokenizer};

/// Sentence-terminal id pairs of known vocabularies, matched against the
/// trailing id of "." when the inserter is built.
const KNOWN_TERMINAL_FAMILIES: &[&[u32]] = &[
    &[29889, 869],
    &[88946, 13],
    &[842, 28723],
    &[918, 30930],
];

/// Canonical sentence endings probed when the vocabulary is unknown.
const PROBE_STRINGS: &[&str] = &["Hi.", ".", "\n.", "..."];

#[derive(Debug)]
pub struct NeedleInserter<'a, T: Tokenizer> {
    tokenizer: &'a T,
    terminal_tokens: Vec<u32>,
    buffer: usize,
}

impl<'a, T: Tokenizer> NeedleInserter<'a, T> {
    /// Resolves the sentence-terminal token set once, up front.
    /// `final_context_length_buffer` is the token cushion reserved for the
    /// trailing question and generation headroom.
    pub fn new(tokenizer: &'a T, final_context_length_buffer: usize) -> Result<Self> {
        let memo = TokenMemo::new();
        let terminal_tokens = resolve_terminal_tokens(tokenizer, &memo)?;
        Ok(Self {
            tokenizer,
            terminal_tokens,
            buffer: final_context_length_buffer,
        })
    }

    pub fn terminal_tokens(&self) -> &[u32] {
        &self.terminal_tokens
    }

    /// Token-exact insertion. The corpus is truncated from the front when it
    /// overflows the effective budget; the needle is never trimmed. At any
    /// depth below 100 the insertion point walks backward to the nearest
    /// sentence boundary, which biases the realized depth earlier than
    /// requested, never later.
    pub fn insert(
        &self,
        corpus_text: &str,
        needle_text: &str,
        depth_percent: f64,
        context_length: usize,
    ) -> Result<String> {
        let needle_tokens = self.tokenizer.tokenize(needle_text)?;
        let mut corpus_tokens = self.tokenizer.tokenize(corpus_text)?;
        if corpus_tokens.is_empty() {
            return Err(HarnessError::Configuration(
                "corpus text tokenized to nothing".to_string(),
            ));
        }
        if corpus_tokens.len() < needle_tokens.len() {
            return Err(HarnessError::Configuration(format!(
                "corpus of {} tokens is shorter than the {} token needle",
                corpus_tokens.len(),
                needle_tokens.len()
            )));
        }
        let budget = context_length.checked_sub(self.buffer).ok_or_else(|| {
            HarnessError::Configuration(format!(
                "context length {context_length} does not cover the {} token buffer",
                self.buffer
            ))
        })?;
        if needle_tokens.len() > budget {
            return Err(HarnessError::Configuration(format!(
                "needle of {} tokens exceeds the effective budget of {budget}",
                needle_tokens.len()
            )));
        }
        if corpus_tokens.len() + needle_tokens.len() > budget {
            corpus_tokens.truncate(budget - needle_tokens.len());
        }

        let spliced = if depth_percent == 100.0 {
            let mut out = corpus_tokens;
            out.extend_from_slice(&needle_tokens);
            out
        } else {
            let mut insertion_point =
                (corpus_tokens.len() as f64 * depth_percent / 100.0).floor() as usize;
            while insertion_point > 0
                && !self
                    .terminal_tokens
                    .contains(&corpus_tokens[insertion_point - 1])
            {
                insertion_point -= 1;
            }
            let mut out = Vec::with_capacity(corpus_tokens.len() + needle_tokens.len());
            out.extend_from_slice(&corpus_tokens[..insertion_point]);
            out.extend_from_slice(&needle_tokens);
            out.extend_from_slice(&corpus_tokens[insertion_point..]);
            out
        };
        self.tokenizer.detokenize(&spliced)
    }
}

fn resolve_terminal_tokens<T: Tokenizer>(tokenizer: &T, memo: &TokenMemo) -> Result<Vec<u32>> {
    let period = *memo
        .tokens(tokenizer, ".")?
        .last()
        .ok_or_else(|| HarnessError::Tokenizer("tokenizer produced no tokens for '.'".to_string()))?;
    for family in KNOWN_TERMINAL_FAMILIES {
        if family.contains(&period) {
            return Ok(family.to_vec());
        }
    }
    // Unknown vocabulary: collect the distinct trailing ids of the canonical
    // probes instead of trusting the bare period alone.
    let mut terminals = Vec::new();
    for probe in PROBE_STRINGS {
        if let Some(&last) = memo.tokens(tokenizer, probe)?.last() {
            if !terminals.contains(&last) {
                terminals.push(last);
            }
        }
    }
    Ok(terminals)
}
