//! Command implementations: run a resource, list topics, show offsets.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use checkpoint::{CheckpointManager, CheckpointStorage};
use kafka_source::resolver::{compile, discover};
use kafka_source::{
    run_extraction, Broker, ConsumerConfig, KafkaBroker, OffsetState, RunStats,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ExtractConfig;
use crate::sink::JsonlSink;
use crate::{OffsetsArgs, RunArgs, TopicsArgs};

/// Extract one configured resource through `broker` into JSONL files under
/// `output_dir`, persisting offsets through `checkpoints`.
pub async fn run_resource<B: Broker>(
    broker: B,
    config: &ExtractConfig,
    resource: &str,
    output_dir: &Path,
    checkpoints: &CheckpointManager,
    cancel: CancellationToken,
) -> anyhow::Result<RunStats> {
    let resource = config.resource(resource)?;
    let extract =
        resource.extract_config(&config.base_dir, config.schema_registry_url.as_deref())?;
    let mut sink = JsonlSink::new(output_dir, resource.processing.target_table.clone())?;

    let stats = run_extraction(broker, &extract, checkpoints, &mut sink, cancel)
        .await
        .with_context(|| format!("Extraction of resource '{}' failed", resource.name))?;
    Ok(stats)
}

/// `run` subcommand.
pub async fn run(args: RunArgs) -> anyhow::Result<RunStats> {
    let mut config = ExtractConfig::from_file(&args.config)?;
    if args.schema_registry_url.is_some() {
        config.schema_registry_url = args.schema_registry_url.clone();
    }
    let resource = config.resource(&args.resource)?;
    let broker = KafkaBroker::new(&resource.consumer_config(&args.broker.bootstrap_servers))?;
    let checkpoints = CheckpointManager::from_storage(&CheckpointStorage::Filesystem {
        dir: args.checkpoint_dir.clone(),
    });

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    info!(
        "Extracting resource '{}' from {} into {}",
        args.resource,
        args.broker.bootstrap_servers,
        args.output_dir.display()
    );
    let result = run_resource(
        broker,
        &config,
        &args.resource,
        &args.output_dir,
        &checkpoints,
        cancel,
    )
    .await;
    watcher.abort();
    result
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl-C, stopping after the current poll");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
    }
}

/// Topics matching `pattern`; empty when the broker cannot be reached.
///
/// An invalid pattern is still an error.
pub async fn list_topics<B: Broker + ?Sized>(
    broker: &B,
    pattern: &str,
) -> anyhow::Result<BTreeSet<String>> {
    compile(pattern).with_context(|| format!("Invalid topic pattern '{pattern}'"))?;
    Ok(discover(broker, pattern).await)
}

/// `topics` subcommand.
pub async fn topics(args: TopicsArgs) -> anyhow::Result<BTreeSet<String>> {
    let broker = KafkaBroker::new(&ConsumerConfig {
        brokers: args.broker.bootstrap_servers.clone(),
        group_id: args.group_id.clone(),
        ..Default::default()
    })?;
    let topics = list_topics(&broker, &args.pattern).await;
    broker.close();
    topics
}

/// Persisted offsets for `resource`, if any run has completed.
pub async fn show_offsets(
    checkpoints: &CheckpointManager,
    resource: &str,
) -> anyhow::Result<Option<OffsetState>> {
    checkpoints
        .load::<OffsetState>(resource)
        .await
        .with_context(|| format!("Failed to read offsets of resource '{resource}'"))
}

/// `offsets` subcommand.
pub async fn offsets(args: OffsetsArgs) -> anyhow::Result<Option<OffsetState>> {
    let checkpoints = CheckpointManager::from_storage(&CheckpointStorage::Filesystem {
        dir: args.checkpoint_dir.clone(),
    });
    show_offsets(&checkpoints, &args.resource).await
}
