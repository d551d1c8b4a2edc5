//! Command-line interface for kafka-group
//!
//! # Usage Examples
//!
//! ## Monitoring
//! ```bash
//! # Lag per partition for a consumer group
//! kafka-group lag --group billing --topic orders
//!
//! # Committed offsets and watermarks side by side
//! kafka-group offsets --group billing --topic orders:0,1
//!
//! # Watermarks only, skipping topics that do not exist
//! kafka-group watermarks --topic orders --topic maybe-missing --lenient
//! ```
//!
//! ## Offset Administration
//! ```bash
//! kafka-group advance --group billing --topic orders
//! kafka-group rewind --group billing --topic orders:3
//! kafka-group set --group billing --offset orders:0=1200 --offset orders:1=980
//! ```
//!
//! ## Tailing
//! ```bash
//! # Print messages as JSON lines until Ctrl-C, then commit
//! kafka-group tail --group debug --topic orders
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use kafka_group::{
    advance_consumer_offsets, get_consumer_offsets_metadata, get_topics_watermarks,
    rewind_consumer_offsets, set_consumer_offsets, topics_offset_distance, BrokerClient,
    ConsumerRunner, OffsetCommitError, RdKafkaClient, SimpleConsumer, SystemProcessTitle,
    TerminationHandle,
};
use kafka_group_cli::output::print_json;
use kafka_group_cli::tail::JsonLinePrinter;
use kafka_group_cli::{
    parse_offset_assignments, ClusterOpts, GroupOpts, LenientOpts, SelectionOpts,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "kafka-group")]
#[command(about = "Consumer group lag, offset administration and topic tailing for Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    cluster: ClusterOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the lag of a consumer group per partition
    Lag {
        #[command(flatten)]
        group: GroupOpts,

        #[command(flatten)]
        selection: SelectionOpts,
    },

    /// Show committed offsets and watermarks of a consumer group
    Offsets {
        #[command(flatten)]
        group: GroupOpts,

        #[command(flatten)]
        selection: SelectionOpts,

        #[command(flatten)]
        lenient: LenientOpts,
    },

    /// Show high and low watermarks
    Watermarks {
        #[command(flatten)]
        selection: SelectionOpts,

        #[command(flatten)]
        lenient: LenientOpts,
    },

    /// Commit the high watermark of every selected partition for a group
    Advance {
        #[command(flatten)]
        group: GroupOpts,

        #[command(flatten)]
        selection: SelectionOpts,
    },

    /// Commit the low watermark of every selected partition for a group
    Rewind {
        #[command(flatten)]
        group: GroupOpts,

        #[command(flatten)]
        selection: SelectionOpts,
    },

    /// Commit explicit offsets for a group
    Set {
        #[command(flatten)]
        group: GroupOpts,

        /// Offset to commit, as TOPIC:PARTITION=OFFSET (can specify multiple)
        #[arg(long = "offset", value_name = "ASSIGNMENT", required = true)]
        offsets: Vec<String>,

        #[command(flatten)]
        lenient: LenientOpts,
    },

    /// Print messages of a topic as JSON lines
    Tail {
        #[command(flatten)]
        group: GroupOpts,

        /// Topic to read
        #[arg(long)]
        topic: String,

        /// Partition to read (can specify multiple; default: all)
        #[arg(long = "partition", value_name = "PARTITION")]
        partitions: Vec<i32>,

        /// Stop after this many messages
        #[arg(long)]
        max_messages: Option<u64>,

        /// Rename the process after the topic and partitions it reads
        #[arg(long)]
        set_process_name: bool,
    },
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
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cluster = cli.cluster;

    match cli.command {
        Commands::Lag { group, selection } => {
            let client = connect(&cluster, &group.group)?;
            let lag = topics_offset_distance(&client, &group.group, &selection.selection()?)
                .await
                .context("Failed to compute consumer lag")?;
            print_json(&lag)?;
            client.close().await?;
        }
        Commands::Offsets {
            group,
            selection,
            lenient,
        } => {
            let client = connect(&cluster, &group.group)?;
            let offsets = get_consumer_offsets_metadata(
                &client,
                &group.group,
                &selection.selection()?,
                lenient.raise_on_error(),
            )
            .await
            .context("Failed to fetch consumer offsets")?;
            print_json(&offsets)?;
            client.close().await?;
        }
        Commands::Watermarks { selection, lenient } => {
            let client = connect(&cluster, "kafka-group-watermarks")?;
            let watermarks = get_topics_watermarks(
                &client,
                &selection.selection()?,
                lenient.raise_on_error(),
            )
            .await
            .context("Failed to fetch watermarks")?;
            print_json(&watermarks)?;
            client.close().await?;
        }
        Commands::Advance { group, selection } => {
            let client = connect(&cluster, &group.group)?;
            let errors = advance_consumer_offsets(&client, &group.group, &selection.selection()?)
                .await
                .context("Failed to advance consumer offsets")?;
            client.close().await?;
            report_commit_errors(&errors)?;
        }
        Commands::Rewind { group, selection } => {
            let client = connect(&cluster, &group.group)?;
            let errors = rewind_consumer_offsets(&client, &group.group, &selection.selection()?)
                .await
                .context("Failed to rewind consumer offsets")?;
            client.close().await?;
            report_commit_errors(&errors)?;
        }
        Commands::Set {
            group,
            offsets,
            lenient,
        } => {
            let new_offsets = parse_offset_assignments(&offsets)?;
            let client = connect(&cluster, &group.group)?;
            let errors = set_consumer_offsets(
                &client,
                &group.group,
                &new_offsets,
                lenient.raise_on_error(),
            )
            .await
            .context("Failed to set consumer offsets")?;
            client.close().await?;
            report_commit_errors(&errors)?;
        }
        Commands::Tail {
            group,
            topic,
            partitions,
            max_messages,
            set_process_name,
        } => {
            let config = cluster.consumer_config(&group.group);
            let partitions = (!partitions.is_empty()).then_some(partitions);
            let consumer = SimpleConsumer::with_rdkafka(&topic, config, partitions)?;
            if set_process_name {
                consumer.set_process_name(&SystemProcessTitle)?;
            }

            let terminator = TerminationHandle::new();
            setup_shutdown_handler(terminator.clone());

            let printer = JsonLinePrinter::new(
                &topic,
                std::io::stdout(),
                max_messages,
                terminator.clone(),
            );
            let mut runner = ConsumerRunner::new(consumer, printer).with_terminator(terminator);
            runner.run().await?;
            info!("Tailed {} messages from {topic}", runner.processed());
        }
    }

    Ok(())
}

fn connect(cluster: &ClusterOpts, group: &str) -> anyhow::Result<RdKafkaClient> {
    let config = cluster.consumer_config(group);
    RdKafkaClient::new(&config).with_context(|| {
        format!(
            "Failed to connect to Kafka at {}",
            config.cluster.bootstrap_servers()
        )
    })
}

fn report_commit_errors(errors: &[OffsetCommitError]) -> anyhow::Result<()> {
    if errors.is_empty() {
        info!("All offsets committed");
        return Ok(());
    }
    print_json(&errors)?;
    anyhow::bail!("{} partition(s) failed to commit", errors.len())
}

/// Terminates the runner on Ctrl-C
fn setup_shutdown_handler(terminator: TerminationHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C)");
                terminator.terminate();
            }
            Err(e) => tracing::warn!("Failed to install Ctrl+C handler: {e}"),
        }
    });
}
