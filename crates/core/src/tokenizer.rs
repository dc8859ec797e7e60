use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{HarnessError, Result};

/// Boundary to the model's tokenizer, remote or local. Implementations must
/// be deterministic for a fixed model and tokenizer version; truncation is
/// expressed by slicing the token slice before calling `detokenize`.
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;
    fn detokenize(&self, tokens: &[u32]) -> Result<String>;
}

/// Memo cache for short, frequently repeated lookups such as punctuation
/// probes. Owned by whoever probes, never a process-wide singleton.
#[derive(Default)]
pub struct TokenMemo {
    entries: RefCell<HashMap<String, Vec<u32>>>,
}

impl TokenMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens<T: Tokenizer + ?Sized>(&self, tokenizer: &T, text: &str) -> Result<Vec<u32>> {
        if let Some(hit) = self.entries.borrow().get(text) {
            return Ok(hit.clone());
        }
        let tokens = tokenizer.tokenize(text)?;
        self.entries
            .borrow_mut()
            .insert(text.to_string(), tokens.clone());
        Ok(tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Cl100k,
    O200k,
    P50k,
}

impl TokenizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenizerKind::Cl100k => "cl100k",
            TokenizerKind::O200k => "o200k",
            TokenizerKind::P50k => "p50k",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "cl100k" => Some(TokenizerKind::Cl100k),
            "o200k" => Some(TokenizerKind::O200k),
            "p50k" => Some(TokenizerKind::P50k),
            _ => None,
        }
    }

    pub fn build(&self) -> Result<LocalTokenizer> {
        let bpe = match self {
            TokenizerKind::Cl100k => tiktoken_rs::cl100k_base(),
            TokenizerKind::O200k => tiktoken_rs::o200k_base(),
            TokenizerKind::P50k => tiktoken_rs::p50k_base(),
        }
        .map_err(|e| HarnessError::Tokenizer(e.to_string()))?;
        Ok(LocalTokenizer { bpe })
    }
}

/// Local adapter over a bundled BPE vocabulary, used for offline context
/// construction and tests. The remote adapter lives in the client crate.
pub struct LocalTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl Tokenizer for LocalTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self
            .bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|id| id as u32)
            .collect())
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.iter().map(|&id| id as usize).collect())
            .map_err(|e| HarnessError::Tokenizer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTokenizer {
        calls: RefCell<usize>,
    }

    impl Tokenizer for CountingTokenizer {
        fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
            *self.calls.borrow_mut() += 1;
            Ok(text.bytes().map(u32::from).collect())
        }

        fn detokenize(&self, tokens: &[u32]) -> Result<String> {
            Ok(tokens.iter().map(|&b| b as u8 as char).collect())
        }
    }

    #[test]
    fn memo_hits_skip_the_tokenizer() {
        let tokenizer = CountingTokenizer {
            calls: RefCell::new(0),
        };
        let memo = TokenMemo::new();
        let first = memo.tokens(&tokenizer, ".").unwrap();
        let second = memo.tokens(&tokenizer, ".").unwrap();
        assert_eq!(first, second);
        assert_eq!(*tokenizer.calls.borrow(), 1);
    }

    #[test]
    fn kind_parses_known_names() {
        assert_eq!(TokenizerKind::from_str("CL100K"), Some(TokenizerKind::Cl100k));
        assert_eq!(TokenizerKind::from_str("bogus"), None);
    }

    #[test]
    fn local_roundtrip_is_a_fixed_point_for_ascii() {
        let tokenizer = TokenizerKind::Cl100k.build().unwrap();
        let text = "The quick brown fox. It jumps over the lazy dog.";
        let once = tokenizer
            .detokenize(&tokenizer.tokenize(text).unwrap())
            .unwrap();
        let twice = tokenizer
            .detokenize(&tokenizer.tokenize(&once).unwrap())
            .unwrap();
        assert_eq!(once, text);
        assert_eq!(twice, once);
    }
}
