mod corpus;
mod error;
mod needle;
mod runner;
mod score;
mod store;
mod sweep;
mod tokenizer;

pub use corpus::{CorpusCache, CorpusReader};
pub use error::{HarnessError, Result};
pub use needle::NeedleInserter;
pub use runner::{EchoStrip, InferenceClient, RunnerConfig, TrialRunner};
pub use score::{rouge1_recall, rouge_l_recall, word_overlap_recall};
pub use store::{ResultStore, TrialResult};
pub use sweep::{DepthIntervalType, SweepConfig, Trial};
pub use tokenizer::{LocalTokenizer, TokenMemo, Tokenizer, TokenizerKind};
