use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "needlebench",
    about = "needle-in-a-haystack long-context retrieval harness"
)]
pub struct Cli {
    /// Only run trials with a context length of at least this many tokens.
    #[arg(short = 's', long)]
    pub s_len: Option<usize>,
    /// Only run trials with a context length of at most this many tokens.
    #[arg(short = 'e', long)]
    pub e_len: Option<usize>,

    /// Smallest context length in the sweep grid.
    #[arg(long, default_value_t = 1000)]
    pub min_len: usize,
    /// Largest context length in the sweep grid.
    #[arg(long, default_value_t = 128_000)]
    pub max_len: usize,
    /// Number of context lengths between min and max, inclusive.
    #[arg(long, default_value_t = 40)]
    pub num_intervals: usize,

    #[arg(long, default_value_t = 0.0)]
    pub depth_min: f64,
    #[arg(long, default_value_t = 100.0)]
    pub depth_max: f64,
    #[arg(long, default_value_t = 10)]
    pub depth_intervals: usize,
    /// Depth distribution: linear or sigmoid.
    #[arg(long, default_value = "linear")]
    pub depth_interval_type: String,

    /// Model identifier; mutually exclusive with --model-path.
    #[arg(long)]
    pub model_name: Option<String>,
    /// Local model path; mutually exclusive with --model-name.
    #[arg(long)]
    pub model_path: Option<String>,
    /// Extra tag folded into the derived model version.
    #[arg(long)]
    pub model_name_suffix: Option<String>,

    /// Base URL of the model service.
    #[arg(long, default_value = "localhost:5000")]
    pub url: String,
    /// Sliding-window override, applied server-side before the sweep.
    #[arg(long)]
    pub window_size: Option<u32>,
    /// Attention-head mask selector: 0 = baseline, positive = top-k,
    /// negative = random-k. Only affects the result namespace here.
    #[arg(long, default_value_t = 0)]
    pub mask_topk: i64,

    #[arg(long, default_value = "PaulGrahamEssays")]
    pub haystack_dir: String,
    #[arg(long)]
    pub needle: Option<String>,
    #[arg(long)]
    pub retrieval_question: Option<String>,
    /// The bare fact scored against the response; defaults to the needle's
    /// answer clause.
    #[arg(long)]
    pub expected_answer: Option<String>,

    /// Bump to re-test an already recorded (model, length, depth) cell.
    #[arg(long, default_value_t = 1)]
    pub results_version: u32,
    #[arg(long, default_value = "results")]
    pub results_root: String,
    /// Skip writing result records (and context copies) to disk.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_save: bool,
    /// Also write each assembled context beside its result for audit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub save_contexts: bool,
    /// Re-run trials even when a matching record already exists.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_resume: bool,

    /// Prompt-echo removal strategy: exact or common-prefix.
    #[arg(long, default_value = "exact")]
    pub echo_strip: String,
    /// Pause between completed trials, in milliseconds.
    #[arg(long)]
    pub sleep_between_ms: Option<u64>,
    /// Token cushion reserved for the question and generation headroom.
    #[arg(long, default_value_t = 200)]
    pub context_buffer: usize,
    #[arg(long, default_value_t = 50)]
    pub tokens_to_generate: usize,

    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}
