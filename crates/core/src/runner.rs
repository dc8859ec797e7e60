use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::corpus::CorpusCache;
use crate::error::{HarnessError, Result};
use crate::needle::NeedleInserter;
use crate::score;
use crate::store::{ResultStore, TrialResult};
use crate::sweep::Trial;
use crate::tokenizer::Tokenizer;

/// Boundary to the model-serving endpoint. One call per trial; any failure
/// is fatal for the whole sweep.
pub trait InferenceClient {
    fn generate(&self, prompt: &str, tokens_to_generate: usize) -> Result<String>;
}

/// How the echoed prompt is removed from the raw completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoStrip {
    /// Remove the prompt only when the response starts with it verbatim.
    /// Whitespace drift in the echo leaves the response untouched.
    ExactPrefix,
    /// Trim the longest common prefix of prompt and response.
    CommonPrefix,
}

impl EchoStrip {
    pub fn as_str(&self) -> &'static str {
        match self {
            EchoStrip::ExactPrefix => "exact",
            EchoStrip::CommonPrefix => "common-prefix",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "exact" => Some(EchoStrip::ExactPrefix),
            "common-prefix" => Some(EchoStrip::CommonPrefix),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Model description persisted with every record.
    pub model: String,
    /// Derived identifier used as the record filename stem.
    pub model_version: String,
    /// Results subdirectory; carries the mask-mode tag when one is active.
    pub namespace: String,
    pub needle: String,
    /// The fact scored against the response; the needle minus its framing.
    pub expected_answer: String,
    pub retrieval_question: String,
    pub version: u32,
    pub final_context_length_buffer: usize,
    pub tokens_to_generate: usize,
    pub save_results: bool,
    pub save_contexts: bool,
    pub resume: bool,
    pub print_ongoing_status: bool,
    pub echo_strip: EchoStrip,
    pub sleep_between_ms: Option<u64>,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.needle.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "needle must not be empty".to_string(),
            ));
        }
        if self.retrieval_question.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "retrieval question must not be empty".to_string(),
            ));
        }
        if self.expected_answer.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "expected answer must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sequential orchestration core: planner order is execution order, one
/// inference call per trial, fail-fast on every error. Operators fix the
/// root cause and re-run; resume-by-skip avoids redoing finished trials.
#[derive(Debug)]
pub struct TrialRunner<'a, T: Tokenizer, C: InferenceClient> {
    config: RunnerConfig,
    tokenizer: &'a T,
    client: &'a C,
    corpus: CorpusCache,
    inserter: NeedleInserter<'a, T>,
    store: ResultStore,
}

impl<'a, T: Tokenizer, C: InferenceClient> TrialRunner<'a, T, C> {
    pub fn new(
        config: RunnerConfig,
        tokenizer: &'a T,
        client: &'a C,
        corpus: CorpusCache,
        store: ResultStore,
    ) -> Result<Self> {
        config.validate()?;
        let inserter = NeedleInserter::new(tokenizer, config.final_context_length_buffer)?;
        Ok(Self {
            config,
            tokenizer,
            client,
            corpus,
            inserter,
            store,
        })
    }

    pub fn run(&mut self, trials: &[Trial]) -> Result<Vec<TrialResult>> {
        let mut results = Vec::new();
        for trial in trials {
            if self.config.resume
                && self.store.exists(
                    &self.config.namespace,
                    trial.context_length,
                    trial.depth_percent,
                    self.config.version,
                    &self.config.model,
                )?
            {
                if self.config.print_ongoing_status {
                    status(format!(
                        "skipping len={} depth={}%: result already on disk",
                        trial.context_length, trial.depth_percent
                    ));
                }
                continue;
            }
            results.push(self.run_trial(trial)?);
            if let Some(ms) = self.config.sleep_between_ms {
                thread::sleep(Duration::from_millis(ms));
            }
        }
        Ok(results)
    }

    fn run_trial(&mut self, trial: &Trial) -> Result<TrialResult> {
        let context = self.generate_context(trial)?;
        let prompt = format!(
            "{context}Based on the content of the book, Question: {}\nAnswer:",
            self.config.retrieval_question
        );

        let start = Instant::now();
        let output = self
            .client
            .generate(&prompt, self.config.tokens_to_generate)?;
        let elapsed = start.elapsed().as_secs_f64();

        let response = strip_prompt_echo(&output, &prompt, self.config.echo_strip)
            .trim()
            .to_string();
        let score = score::rouge1_recall(&self.config.expected_answer, &response);

        let result = TrialResult {
            model: self.config.model.clone(),
            context_length: trial.context_length,
            depth_percent: trial.depth_percent,
            version: self.config.version,
            needle: self.config.needle.clone(),
            model_response: response,
            score,
            test_duration_seconds: elapsed,
            test_timestamp_utc: Utc::now().format("%Y-%m-%d %H:%M:%S%z").to_string(),
        };

        if self.config.save_results {
            if self.config.save_contexts {
                self.store.save_context(
                    &self.config.namespace,
                    &self.config.model_version,
                    trial.context_length,
                    trial.depth_percent,
                    &context,
                )?;
            }
            let path = self
                .store
                .save(&self.config.namespace, &self.config.model_version, &result)?;
            if self.config.print_ongoing_status {
                status(format!("wrote {}", path.display()));
            }
        }
        if self.config.print_ongoing_status {
            print_trial_summary(trial, &result);
        }
        Ok(result)
    }

    fn generate_context(&mut self, trial: &Trial) -> Result<String> {
        let corpus = self.corpus.ensure(self.tokenizer, trial.context_length)?;
        let trimmed = encode_and_trim(self.tokenizer, corpus, trial.context_length)?;
        self.inserter.insert(
            &trimmed,
            &self.config.needle,
            trial.depth_percent,
            trial.context_length,
        )
    }
}

fn encode_and_trim<T: Tokenizer>(
    tokenizer: &T,
    text: &str,
    context_length: usize,
) -> Result<String> {
    let tokens = tokenizer.tokenize(text)?;
    if tokens.len() > context_length {
        return tokenizer.detokenize(&tokens[..context_length]);
    }
    Ok(text.to_string())
}

fn strip_prompt_echo<'s>(output: &'s str, prompt: &str, strategy: EchoStrip) -> &'s str {
    match strategy {
        EchoStrip::ExactPrefix => output.strip_prefix(prompt.trim()).unwrap_or(output),
        EchoStrip::CommonPrefix => {
            let shared = output
                .chars()
                .zip(prompt.trim().chars())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a.len_utf8())
                .sum::<usize>();
            &output[shared..]
        }
    }
}

// Status output must never fail a trial, so write errors are dropped.
fn status(message: impl AsRef<str>) {
    let mut err = io::stderr().lock();
    let _ = writeln!(err, "[needlebench] {}", message.as_ref());
}

fn print_trial_summary(trial: &Trial, result: &TrialResult) {
    let mut err = io::stderr().lock();
    let _ = writeln!(err, "-- Test Summary --");
    let _ = writeln!(err, "Duration: {:.1} seconds", result.test_duration_seconds);
    let _ = writeln!(err, "Context: {} tokens", trial.context_length);
    let _ = writeln!(err, "Depth: {}%", trial.depth_percent);
    let _ = writeln!(err, "Score: {}", result.score);
    let _ = writeln!(err, "Response: {}\n", result.model_response);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prefix_strip_requires_a_verbatim_echo() {
        let stripped = strip_prompt_echo("prompt text answer", "prompt text ", EchoStrip::ExactPrefix);
        assert_eq!(stripped, " answer");
        // Whitespace drift defeats the exact strategy on purpose.
        let drifted = strip_prompt_echo("prompt  text answer", "prompt text", EchoStrip::ExactPrefix);
        assert_eq!(drifted, "prompt  text answer");
    }

    #[test]
    fn common_prefix_strip_trims_the_shared_run() {
        let drifted = strip_prompt_echo("prompt  text answer", "prompt text", EchoStrip::CommonPrefix);
        assert_eq!(drifted, " text answer");
        let clean = strip_prompt_echo("prompt text answer", "prompt text", EchoStrip::CommonPrefix);
        assert_eq!(clean, " answer");
    }

    #[test]
    fn echo_strip_parsing() {
        assert_eq!(EchoStrip::from_str("exact"), Some(EchoStrip::ExactPrefix));
        assert_eq!(
            EchoStrip::from_str("COMMON-PREFIX"),
            Some(EchoStrip::CommonPrefix)
        );
        assert_eq!(EchoStrip::from_str("fuzzy"), None);
    }
}
