use anyhow::{anyhow, Result};

use needlebench_core::{DepthIntervalType, EchoStrip, RunnerConfig, SweepConfig};

use crate::cli::Cli;

pub const DEFAULT_NEEDLE: &str = "\nThe best thing to do in San Francisco is eat a sandwich and sit in Dolores Park on a sunny day.\n";
pub const DEFAULT_RETRIEVAL_QUESTION: &str = "What is the best thing to do in San Francisco?";
pub const DEFAULT_EXPECTED_ANSWER: &str =
    "eat a sandwich and sit in Dolores Park on a sunny day";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub service_url: String,
    pub window_size: Option<u32>,
    pub haystack_dir: String,
    pub results_root: String,
    pub sweep: SweepConfig,
    pub runner: RunnerConfig,
}

impl HarnessConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let model_name = match (&cli.model_name, &cli.model_path) {
            (Some(name), None) => name.clone(),
            (None, Some(path)) => path.clone(),
            (Some(_), Some(_)) => {
                return Err(anyhow!("pass --model-name or --model-path, not both"))
            }
            (None, None) => {
                return Err(anyhow!("one of --model-name or --model-path is required"))
            }
        };
        let depth_interval_type = DepthIntervalType::from_str(&cli.depth_interval_type)
            .ok_or_else(|| {
                anyhow!(
                    "depth interval type must be linear or sigmoid, got {}",
                    cli.depth_interval_type
                )
            })?;
        let echo_strip = EchoStrip::from_str(&cli.echo_strip).ok_or_else(|| {
            anyhow!(
                "echo strip strategy must be exact or common-prefix, got {}",
                cli.echo_strip
            )
        })?;
        let length_range = match (cli.s_len, cli.e_len) {
            (None, None) => None,
            (s_len, e_len) => Some((s_len.unwrap_or(0), e_len.unwrap_or(usize::MAX))),
        };

        let version = model_version(
            &model_name,
            cli.model_name_suffix.as_deref(),
            cli.window_size,
        );
        let namespace = MaskMode::from_topk(cli.mask_topk).namespace(&version);

        let sweep = SweepConfig {
            context_min: cli.min_len,
            context_max: cli.max_len,
            context_intervals: cli.num_intervals,
            depth_min: cli.depth_min,
            depth_max: cli.depth_max,
            depth_intervals: cli.depth_intervals,
            depth_interval_type,
            length_range,
        };
        let runner = RunnerConfig {
            model: model_name,
            model_version: version,
            namespace,
            needle: cli
                .needle
                .clone()
                .unwrap_or_else(|| DEFAULT_NEEDLE.to_string()),
            expected_answer: cli
                .expected_answer
                .clone()
                .unwrap_or_else(|| DEFAULT_EXPECTED_ANSWER.to_string()),
            retrieval_question: cli
                .retrieval_question
                .clone()
                .unwrap_or_else(|| DEFAULT_RETRIEVAL_QUESTION.to_string()),
            version: cli.results_version,
            final_context_length_buffer: cli.context_buffer,
            tokens_to_generate: cli.tokens_to_generate,
            save_results: !cli.no_save,
            save_contexts: cli.save_contexts,
            resume: !cli.no_resume,
            print_ongoing_status: true,
            echo_strip,
            sleep_between_ms: cli.sleep_between_ms,
        };
        Ok(Self {
            service_url: cli.url.clone(),
            window_size: cli.window_size,
            haystack_dir: cli.haystack_dir.clone(),
            results_root: cli.results_root.clone(),
            sweep,
            runner,
        })
    }
}

/// Namespace tag for the attention-head masking modes. The masking itself
/// happens server-side; here it only decides where results land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    Baseline,
    Top(u32),
    Random(u32),
}

impl MaskMode {
    pub fn from_topk(mask_topk: i64) -> Self {
        match mask_topk {
            0 => MaskMode::Baseline,
            k if k > 0 => MaskMode::Top(k as u32),
            k => MaskMode::Random(k.unsigned_abs() as u32),
        }
    }

    pub fn namespace(&self, model_version: &str) -> String {
        match self {
            MaskMode::Baseline => model_version.to_string(),
            MaskMode::Top(k) => format!("{model_version}_block_top{k}"),
            MaskMode::Random(k) => format!("{model_version}_block_random{k}"),
        }
    }
}

/// Derived identifier: final path segment of the model name, plus the
/// optional suffix and window tag, plus the provider tag.
pub fn model_version(model_name: &str, suffix: Option<&str>, window_size: Option<u32>) -> String {
    let mut version = model_name
        .split('/')
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or(model_name)
        .to_string();
    if let Some(suffix) = suffix {
        version.push('_');
        version.push_str(suffix);
    }
    if let Some(size) = window_size {
        version.push_str(&format!("_window_{size}"));
    }
    version.push_str("_Megatron");
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn model_version_folds_in_suffix_and_window() {
        assert_eq!(
            model_version("../models/llama-2-7b-80k", None, None),
            "llama-2-7b-80k_Megatron"
        );
        assert_eq!(
            model_version("llama-2-7b-80k", Some("rope"), Some(2048)),
            "llama-2-7b-80k_rope_window_2048_Megatron"
        );
    }

    #[test]
    fn mask_modes_partition_the_namespace() {
        assert_eq!(MaskMode::from_topk(0).namespace("v"), "v");
        assert_eq!(MaskMode::from_topk(5).namespace("v"), "v_block_top5");
        assert_eq!(MaskMode::from_topk(-3).namespace("v"), "v_block_random3");
    }

    #[test]
    fn model_name_and_path_are_mutually_exclusive() {
        let both = Cli::parse_from([
            "needlebench",
            "--model-name",
            "m",
            "--model-path",
            "/p",
        ]);
        assert!(HarnessConfig::from_cli(&both).is_err());
        let neither = Cli::parse_from(["needlebench"]);
        assert!(HarnessConfig::from_cli(&neither).is_err());
    }

    #[test]
    fn unknown_interval_type_fails_fast() {
        let cli = Cli::parse_from([
            "needlebench",
            "--model-name",
            "m",
            "--depth-interval-type",
            "quadratic",
        ]);
        assert!(HarnessConfig::from_cli(&cli).is_err());
    }

    #[test]
    fn range_filter_defaults_open_ends() {
        let cli = Cli::parse_from(["needlebench", "--model-name", "m", "-s", "4000"]);
        let config = HarnessConfig::from_cli(&cli).unwrap();
        assert_eq!(config.sweep.length_range, Some((4000, usize::MAX)));
    }
}
