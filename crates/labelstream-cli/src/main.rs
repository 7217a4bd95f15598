#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, CliConfig, Command};
use futures::StreamExt;
use labelstream::{BatchStream, LabelService, index::memory::MemIndex};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    sync::Arc,
};
use telemetry::init_telemetry;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let index = Arc::new(load_series(&config.series_file)?);
    log_startup_info(&config, &index);

    let service = LabelService::with_matcher_resolver(index, config.service.clone())?;
    let res = match config.command {
        Command::NamesValues => {
            print_batches(service.stream_label_names_and_values(config.matchers)).await
        }
        Command::Cardinality { label_names } => {
            print_batches(service.stream_label_values_cardinality(label_names, config.matchers))
                .await
        }
    };

    providers.shutdown();
    res
}

/// Reads a JSON array of `{label name: value}` objects into a fresh index.
fn load_series(path: &Path) -> anyhow::Result<MemIndex> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let series: Vec<BTreeMap<String, String>> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse series from {}", path.display()))?;

    let index = MemIndex::new();
    for labels in &series {
        let pairs: Vec<(&String, &String)> = labels.iter().collect();
        index.add_series(&pairs);
    }
    Ok(index)
}

fn log_startup_info(_config: &CliConfig, _index: &MemIndex) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Loaded {} series, running with full config: {:#?}",
            _index.series_count(),
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Loaded {} series, running {:?} with {} workers",
            _index.series_count(),
            _config.command,
            _config.service.count_workers
        );
    }
}

/// Writes every batch to stdout as one JSON line.
///
/// Ctrl+C cancels the query; batches already produced are still printed and
/// the call then fails with the cancellation error.
async fn print_batches<B: Serialize>(mut stream: BatchStream<B>) -> anyhow::Result<()> {
    let cancel = stream.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::select! {
            res = signal::ctrl_c() => {
                if res.is_ok() {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Received Ctrl+C signal, cancelling query");
                    cancel.cancel();
                }
            }
            () = cancel.cancelled() => {}
        }
    });

    let mut batches = 0_usize;
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &batch)?;
        writeln!(out)?;
        batches += 1;
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Query finished after {batches} batches");
    #[cfg(not(feature = "tracing"))]
    let _ = batches;

    Ok(())
}
