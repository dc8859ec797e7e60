use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use needlebench_core::{
    CorpusCache, CorpusReader, DepthIntervalType, EchoStrip, HarnessError, InferenceClient,
    NeedleInserter, Result, ResultStore, RunnerConfig, SweepConfig, Tokenizer, Trial, TrialRunner,
};

const NEEDLE: &str =
    "The best thing to do in San Francisco is eat a sandwich and sit in Dolores Park on a sunny day.";
const ANSWER: &str = "eat a sandwich and sit in Dolores Park on a sunny day";
const QUESTION: &str = "What is the best thing to do in San Francisco?";

/// Word-level tokenizer with a stable interned vocabulary. A trailing '.'
/// becomes its own token so sentence boundaries are visible to the
/// inserter, and detokenize(tokenize(x)) is a fixed point.
#[derive(Debug)]
struct FakeTokenizer {
    vocab: RefCell<HashMap<String, u32>>,
    words: RefCell<Vec<String>>,
}

impl FakeTokenizer {
    fn new() -> Self {
        Self {
            vocab: RefCell::new(HashMap::new()),
            words: RefCell::new(Vec::new()),
        }
    }

    fn intern(&self, word: &str) -> u32 {
        if let Some(&id) = self.vocab.borrow().get(word) {
            return id;
        }
        let mut words = self.words.borrow_mut();
        let id = words.len() as u32;
        words.push(word.to_string());
        self.vocab.borrow_mut().insert(word.to_string(), id);
        id
    }
}

impl Tokenizer for FakeTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        for word in text.split_whitespace() {
            match word.strip_suffix('.') {
                Some("") => out.push(self.intern(".")),
                Some(stem) => {
                    out.push(self.intern(stem));
                    out.push(self.intern("."));
                }
                None => out.push(self.intern(word)),
            }
        }
        Ok(out)
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        let words = self.words.borrow();
        let mut out = String::new();
        for &token in tokens {
            let word = words
                .get(token as usize)
                .ok_or_else(|| HarnessError::Tokenizer(format!("unknown token id {token}")))?;
            if word == "." {
                out.push('.');
            } else {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
            }
        }
        Ok(out)
    }
}

/// Echoes the prompt and appends a fixed completion, counting invocations.
#[derive(Debug)]
struct MockClient {
    completion: String,
    calls: RefCell<usize>,
}

impl MockClient {
    fn answering(completion: &str) -> Self {
        Self {
            completion: completion.to_string(),
            calls: RefCell::new(0),
        }
    }
}

impl InferenceClient for MockClient {
    fn generate(&self, prompt: &str, _tokens_to_generate: usize) -> Result<String> {
        *self.calls.borrow_mut() += 1;
        Ok(format!("{prompt} {}", self.completion))
    }
}

fn write_haystack(dir: &Path, files: usize, sentences_per_file: usize) {
    let mut counter = 0usize;
    for file_idx in 0..files {
        let mut text = String::new();
        for _ in 0..sentences_per_file {
            counter += 1;
            // Nine words plus the period token: ten tokens per sentence.
            text.push_str(&format!(
                "Filler sentence number {counter} talks about ordinary city life.\n"
            ));
        }
        fs::write(dir.join(format!("essay_{file_idx:02}.txt")), text).unwrap();
    }
}

fn runner_config(namespace: &str) -> RunnerConfig {
    RunnerConfig {
        model: "tiny-model".to_string(),
        model_version: "tiny-model_Megatron".to_string(),
        namespace: namespace.to_string(),
        needle: NEEDLE.to_string(),
        expected_answer: ANSWER.to_string(),
        retrieval_question: QUESTION.to_string(),
        version: 1,
        final_context_length_buffer: 200,
        tokens_to_generate: 50,
        save_results: true,
        save_contexts: false,
        resume: true,
        print_ongoing_status: false,
        echo_strip: EchoStrip::ExactPrefix,
        sleep_between_ms: None,
    }
}

#[test]
fn fake_tokenizer_roundtrip_is_stable() {
    let tokenizer = FakeTokenizer::new();
    let text = "Hello world. This is a test.";
    let tokens = tokenizer.tokenize(text).unwrap();
    let decoded = tokenizer.detokenize(&tokens).unwrap();
    assert_eq!(decoded, text);
    assert_eq!(tokenizer.tokenize(&decoded).unwrap(), tokens);
}

#[test]
fn insertion_is_token_exact_at_mid_depth() {
    // Scenario A: a long corpus, context_length 2000, depth 50.
    let dir = tempfile::tempdir().unwrap();
    write_haystack(dir.path(), 3, 50);
    let tokenizer = FakeTokenizer::new();
    let reader = CorpusReader::new(dir.path());
    let corpus = reader.read_and_accumulate(&tokenizer, 10_000).unwrap();

    let inserter = NeedleInserter::new(&tokenizer, 200).unwrap();
    let context = inserter.insert(&corpus, NEEDLE, 50.0, 2000).unwrap();

    let tokens = tokenizer.tokenize(&context).unwrap();
    assert_eq!(tokens.len(), 2000 - 200);
    assert_eq!(context.matches("The best thing to do").count(), 1);
    // The needle sits immediately after a sentence boundary.
    assert!(context.contains("life. The best thing to do"));
}

#[test]
fn depth_one_hundred_appends_the_needle_as_suffix() {
    // Scenario B.
    let dir = tempfile::tempdir().unwrap();
    write_haystack(dir.path(), 1, 60);
    let tokenizer = FakeTokenizer::new();
    let corpus = CorpusReader::new(dir.path())
        .read_and_accumulate(&tokenizer, 500)
        .unwrap();
    let inserter = NeedleInserter::new(&tokenizer, 100).unwrap();
    let context = inserter
        .insert(&corpus, "The sky is blue.", 100.0, 400)
        .unwrap();
    assert!(context.ends_with("The sky is blue."));
}

#[test]
fn depth_zero_walks_to_the_front() {
    let dir = tempfile::tempdir().unwrap();
    write_haystack(dir.path(), 1, 60);
    let tokenizer = FakeTokenizer::new();
    let corpus = CorpusReader::new(dir.path())
        .read_and_accumulate(&tokenizer, 500)
        .unwrap();
    let inserter = NeedleInserter::new(&tokenizer, 100).unwrap();
    let context = inserter.insert(&corpus, NEEDLE, 0.0, 400).unwrap();
    assert!(context.starts_with("The best thing to do"));
}

#[test]
fn short_corpus_skips_truncation() {
    let dir = tempfile::tempdir().unwrap();
    write_haystack(dir.path(), 1, 30);
    let tokenizer = FakeTokenizer::new();
    let corpus = CorpusReader::new(dir.path())
        .read_and_accumulate(&tokenizer, 300)
        .unwrap();
    let corpus_len = tokenizer.tokenize(&corpus).unwrap().len();
    let needle_len = tokenizer.tokenize(NEEDLE).unwrap().len();

    let inserter = NeedleInserter::new(&tokenizer, 200).unwrap();
    let context = inserter.insert(&corpus, NEEDLE, 50.0, 2000).unwrap();
    let tokens = tokenizer.tokenize(&context).unwrap();
    assert_eq!(tokens.len(), corpus_len + needle_len);
}

#[test]
fn needle_longer_than_budget_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_haystack(dir.path(), 1, 30);
    let tokenizer = FakeTokenizer::new();
    let corpus = CorpusReader::new(dir.path())
        .read_and_accumulate(&tokenizer, 300)
        .unwrap();
    let inserter = NeedleInserter::new(&tokenizer, 10).unwrap();
    let err = inserter.insert(&corpus, NEEDLE, 50.0, 20).unwrap_err();
    assert!(matches!(err, HarnessError::Configuration(_)));
}

#[test]
fn sweep_runs_score_and_persist_each_trial() {
    let haystack = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_haystack(haystack.path(), 2, 60);

    let tokenizer = FakeTokenizer::new();
    let client = MockClient::answering(ANSWER);
    let sweep = SweepConfig {
        context_min: 600,
        context_max: 900,
        context_intervals: 2,
        depth_min: 0.0,
        depth_max: 100.0,
        depth_intervals: 3,
        depth_interval_type: DepthIntervalType::Linear,
        length_range: None,
    };
    let trials = sweep.plan().unwrap();
    assert_eq!(trials.len(), 6);

    let corpus = CorpusCache::new(CorpusReader::new(haystack.path()));
    let store = ResultStore::new(results.path());
    let mut runner = TrialRunner::new(
        runner_config("tiny-model_Megatron"),
        &tokenizer,
        &client,
        corpus,
        store,
    )
    .unwrap();
    let outcomes = runner.run(&trials).unwrap();

    assert_eq!(outcomes.len(), 6);
    assert_eq!(*client.calls.borrow(), 6);
    for outcome in &outcomes {
        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.model_response, ANSWER);
        assert_eq!(outcome.version, 1);
    }
    let record = results
        .path()
        .join("tiny-model_Megatron/tiny-model_Megatron_len_600_depth_0_results.json");
    assert!(record.exists());
}

#[test]
fn completed_trials_are_skipped_on_resume() {
    // Scenario E: the second pass must not re-invoke inference.
    let haystack = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_haystack(haystack.path(), 2, 60);

    let tokenizer = FakeTokenizer::new();
    let client = MockClient::answering(ANSWER);
    let sweep = SweepConfig {
        context_min: 600,
        context_max: 600,
        context_intervals: 1,
        depth_min: 50.0,
        depth_max: 50.0,
        depth_intervals: 1,
        depth_interval_type: DepthIntervalType::Linear,
        length_range: None,
    };
    let trials = sweep.plan().unwrap();

    for expected_calls in [1usize, 1] {
        let corpus = CorpusCache::new(CorpusReader::new(haystack.path()));
        let store = ResultStore::new(results.path());
        let mut runner = TrialRunner::new(
            runner_config("tiny-model_Megatron"),
            &tokenizer,
            &client,
            corpus,
            store,
        )
        .unwrap();
        runner.run(&trials).unwrap();
        assert_eq!(*client.calls.borrow(), expected_calls);
    }
}

#[test]
fn save_contexts_writes_the_audit_copy() {
    let haystack = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_haystack(haystack.path(), 1, 60);

    let tokenizer = FakeTokenizer::new();
    let client = MockClient::answering(ANSWER);
    let mut config = runner_config("tiny-model_Megatron");
    config.save_contexts = true;
    let corpus = CorpusCache::new(CorpusReader::new(haystack.path()));
    let store = ResultStore::new(results.path());
    let mut runner = TrialRunner::new(config, &tokenizer, &client, corpus, store).unwrap();
    let trials = [Trial {
        context_length: 600,
        depth_percent: 25.0,
    }];
    runner.run(&trials).unwrap();

    let audit = results
        .path()
        .join("tiny-model_Megatron/tiny-model_Megatron_len_600_depth_2500_context.txt");
    let context = fs::read_to_string(audit).unwrap();
    assert!(context.contains("Dolores Park"));
}

#[test]
fn empty_needle_fails_construction() {
    let haystack = tempfile::tempdir().unwrap();
    write_haystack(haystack.path(), 1, 5);
    let tokenizer = FakeTokenizer::new();
    let client = MockClient::answering(ANSWER);
    let mut config = runner_config("ns");
    config.needle = "  ".to_string();
    let corpus = CorpusCache::new(CorpusReader::new(haystack.path()));
    let store = ResultStore::new(haystack.path().join("results"));
    let err = TrialRunner::new(config, &tokenizer, &client, corpus, store).unwrap_err();
    assert!(matches!(err, HarnessError::Configuration(_)));
}
