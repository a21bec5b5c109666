//! CLI for the ndstore imaging dataset storage cache.
//!
//! Provides commands for discovering dataset files on disk and inspecting
//! their structure and metadata.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ndstore — Embedded N-dimensional imaging dataset storage cache CLI.
#[derive(Parser)]
#[command(name = "ndstore", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Recursively list dataset files under a directory.
    List {
        /// Directory to search.
        path: PathBuf,

        /// Maximum number of entries to collect.
        #[arg(long, default_value = "1024")]
        max_items: usize,

        /// Maximum length of each collected path, in bytes.
        #[arg(long, default_value = "4096")]
        max_length: usize,
    },

    /// Display a dataset's shape, axes, images, and summary metadata.
    Info {
        /// Path to the dataset file.
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List {
            path,
            max_items,
            max_length,
        } => cmd_list(&path, max_items, max_length),
        Commands::Info { path } => cmd_info(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `ndstore list <path>`.
fn cmd_list(
    path: &PathBuf,
    max_items: usize,
    max_length: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut found = Vec::new();
    let overflow = match ndstore::list_datasets(path, max_items, max_length, &mut found) {
        Ok(()) => None,
        // Partial results are still worth printing; report the cut afterwards.
        Err(ndstore::StorageError::SequenceTooLarge { copied, total }) => Some((copied, total)),
        Err(e) => return Err(e.into()),
    };

    for entry in &found {
        println!("{entry}");
    }
    println!();
    println!("{} dataset file(s) under '{}'", found.len(), path.display());
    if let Some((copied, total)) = overflow {
        println!("(showing {copied} of {total}; raise --max-items to see the rest)");
    }

    Ok(())
}

/// Implements `ndstore info <path>`.
fn cmd_info(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ndstore::DatasetStore::new();
    let handle = store.load(path, "")?;

    let descriptor = store.descriptor(&handle)?;
    println!("Dataset: {}", descriptor.path().display());
    println!("  Name: {}", descriptor.name());
    println!("  Rank: {}", descriptor.rank());
    println!("  Images: {}", descriptor.image_count());
    println!();

    if descriptor.rank() > 0 {
        println!("Dimensions:");
        for (i, axis) in descriptor.dimensions().iter().enumerate() {
            let name = if axis.name.is_empty() { "(unnamed)" } else { &axis.name };
            let meaning = if axis.meaning.is_empty() { "?" } else { &axis.meaning };
            println!("  Axis {i}: \"{name}\" meaning={meaning} size={}", axis.size());
        }
        println!();
    }

    let summary = descriptor.summary_meta();
    if summary.is_empty() {
        println!("Summary metadata: (none)");
    } else {
        println!("Summary metadata:");
        // Pretty-print when the blob happens to be JSON, else show it raw.
        match serde_json::from_str::<serde_json::Value>(summary) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(_) => println!("{summary}"),
        }
    }

    store.shutdown();
    Ok(())
}
