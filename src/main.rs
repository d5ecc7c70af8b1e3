//! Command-line interface for kafka-extract
//!
//! # Usage Examples
//!
//! ```bash
//! # Extract new records of a resource; offsets are saved after the output is flushed
//! kafka-extract run --config extract.yml --resource orders --output-dir out
//!
//! # Start over from a point in time (set in the resource's processing.start_from)
//! kafka-extract run --config extract.yml --resource orders_replay
//!
//! # List topics matching a pattern
//! kafka-extract topics --pattern 'orders_.*' --bootstrap-servers broker:9092
//!
//! # Show persisted offsets
//! kafka-extract offsets --resource orders
//! ```
//!
//! ## Offset Format
//! `topic:partition:offset[,...]`, where offset is the last consumed offset
//! (`-1` before anything was read).

use checkpoint::Checkpoint;
use clap::{Parser, Subcommand};
use kafka_extract::{extract, OffsetsArgs, RunArgs, TopicsArgs};

#[derive(Parser)]
#[command(name = "kafka-extract")]
#[command(about = "Incrementally extract Kafka topics into JSONL files")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract everything a resource's topics held when the run started
    Run(RunArgs),

    /// List topics matching a pattern (empty when the broker is unreachable)
    Topics(TopicsArgs),

    /// Print the persisted offsets of a resource
    Offsets(OffsetsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let stats = extract::run(args).await?;
            println!("{stats}");
        }
        Commands::Topics(args) => {
            for topic in extract::topics(args).await? {
                println!("{topic}");
            }
        }
        Commands::Offsets(args) => {
            let resource = args.resource.clone();
            match extract::offsets(args).await? {
                Some(offsets) => println!("{}", offsets.to_cli_string()),
                None => println!("No offsets persisted for resource '{resource}'"),
            }
        }
    }

    Ok(())
}
