use anyhow::{Context, Result};

use needlebench_client::ServiceClient;
use needlebench_core::{CorpusCache, CorpusReader, ResultStore, TrialRunner};

use crate::config::HarnessConfig;
use crate::logging;

pub fn run(config: HarnessConfig) -> Result<()> {
    let client = ServiceClient::new(config.service_url.clone())?;
    logging::info(format!("setting window size to {:?}", config.window_size));
    client
        .modify_window_size(config.window_size)
        .context("failed to configure the service window size")?;

    let trials = config.sweep.plan()?;
    print_start_summary(&config)?;
    logging::verbose(format!("planned {} trials", trials.len()));

    let corpus = CorpusCache::new(CorpusReader::new(&config.haystack_dir));
    let store = ResultStore::new(&config.results_root);
    let mut runner = TrialRunner::new(config.runner.clone(), &client, &client, corpus, store)?;
    let results = runner.run(&trials)?;
    logging::info(format!(
        "completed {} trials ({} already recorded)",
        results.len(),
        trials.len() - results.len()
    ));
    Ok(())
}

fn print_start_summary(config: &HarnessConfig) -> Result<()> {
    let lengths = config.sweep.context_lengths()?;
    let depths = config.sweep.depth_percents()?;
    logging::info("starting needle-in-a-haystack testing");
    logging::info(format!("- Model: {}", config.runner.model));
    logging::info(format!(
        "- Context lengths: {}, min: {}, max: {}",
        lengths.len(),
        lengths.iter().min().copied().unwrap_or_default(),
        lengths.iter().max().copied().unwrap_or_default()
    ));
    logging::info(format!(
        "- Document depths: {}, min: {}%, max: {}%",
        depths.len(),
        depths.first().copied().unwrap_or_default(),
        depths.last().copied().unwrap_or_default()
    ));
    logging::info(format!("- Needle: {}", config.runner.needle.trim()));
    Ok(())
}
