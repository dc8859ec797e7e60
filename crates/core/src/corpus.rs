use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{HarnessError, Result};
use crate::tokenizer::Tokenizer;

/// Reads the haystack directory into one long text.
#[derive(Debug)]
pub struct CorpusReader {
    dir: PathBuf,
}

impl CorpusReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Concatenates every haystack document in sorted listing order,
    /// repeating whole passes over the directory until the accumulated text
    /// measures at least `min_token_length` tokens. Files are never
    /// truncated here; the final trim belongs to the needle inserter.
    pub fn read_and_accumulate<T: Tokenizer>(
        &self,
        tokenizer: &T,
        min_token_length: usize,
    ) -> Result<String> {
        let files = self.document_paths()?;
        if files.is_empty() {
            return Err(HarnessError::Configuration(format!(
                "haystack directory {} contains no documents",
                self.dir.display()
            )));
        }
        let mut text = String::new();
        while tokenizer.tokenize(&text)?.len() < min_token_length {
            for path in &files {
                text.push_str(&fs::read_to_string(path)?);
            }
        }
        Ok(text)
    }

    fn document_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(HarnessError::Configuration(format!(
                "haystack directory {} does not exist",
                self.dir.display()
            )));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("txt"))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Lazy corpus accumulation, memoized by the largest minimum length served
/// so far. Growth re-reads the directory; text already handed to an earlier
/// trial is never mutated in place.
#[derive(Debug)]
pub struct CorpusCache {
    reader: CorpusReader,
    text: String,
    token_len: usize,
}

impl CorpusCache {
    pub fn new(reader: CorpusReader) -> Self {
        Self {
            reader,
            text: String::new(),
            token_len: 0,
        }
    }

    pub fn ensure<T: Tokenizer>(
        &mut self,
        tokenizer: &T,
        min_token_length: usize,
    ) -> Result<&str> {
        if self.token_len < min_token_length {
            let text = self
                .reader
                .read_and_accumulate(tokenizer, min_token_length)?;
            self.token_len = tokenizer.tokenize(&text)?.len();
            self.text = text;
        }
        Ok(&self.text)
    }
}
