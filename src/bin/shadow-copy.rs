//! # shadow-copy CLI
//!
//! Command-line driver for the shadow-copy library.
//!
//! ## Usage
//! ```bash
//! # Snapshot the current directory into ./.shadow-copy/<timestamp>-<n>
//! shadow-copy create
//!
//! # List existing snapshots, most recent first (index 1 is the latest)
//! shadow-copy history
//!
//! # Show only the latest snapshot path
//! shadow-copy history -n 1 --no-index
//!
//! # Compare the live tree with the latest snapshot
//! shadow-copy diff
//!
//! # Compare two snapshots
//! shadow-copy diff --from 3 --to 2
//!
//! # Keep only the 5 most recent snapshots
//! shadow-copy purge -n 5
//! ```

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use shadow_copy::{
    registry, DiffWalker, FileFilter, ShadowError, SnapshotWalker, DEFAULT_HISTORY_DIR_NAME,
};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Space-efficient point-in-time shadow copies of a directory tree
#[derive(Parser)]
#[command(name = "shadow-copy")]
#[command(version)]
#[command(about = "Create, compare and prune shadow copies of a directory")]
struct Cli {
    /// Use this history directory instead of <DIRECTORY>/.shadow-copy
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new shadow copy of a directory
    Create {
        /// Directory to snapshot (defaults to the current directory)
        directory: Option<PathBuf>,

        /// Prior snapshot used for deduplication: a history index, or "none"
        #[arg(long, default_value = "1")]
        from_index: String,
    },

    /// List existing shadow copies, most recent first
    History {
        /// Directory whose history to list (defaults to the current directory)
        directory: Option<PathBuf>,

        /// Only show the most recent COUNT entries
        #[arg(short = 'n', long = "number", value_name = "COUNT")]
        number: Option<usize>,

        /// Print bare paths without the history index
        #[arg(long)]
        no_index: bool,
    },

    /// Compare a shadow copy against the live tree or another copy
    Diff {
        /// Directory to compare (defaults to the current directory)
        directory: Option<PathBuf>,

        /// History index of the old side
        #[arg(long, default_value_t = 1, value_name = "INDEX")]
        from: i32,

        /// History index of the new side (defaults to the live tree)
        #[arg(long, value_name = "INDEX")]
        to: Option<i32>,
    },

    /// Delete all shadow copies but the most recent ones
    Purge {
        /// Directory whose history to prune (defaults to the current directory)
        directory: Option<PathBuf>,

        /// How many shadow copies to keep
        #[arg(
            short = 'n',
            long = "number",
            value_name = "COUNT",
            default_value_t = registry::DEFAULT_RETENTION
        )]
        keep: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    if let Err(err) = run(cli) {
        eprintln!("{} {}", "[ERROR]".red().bold(), err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let override_history = cli.history_dir;
    match cli.command {
        Commands::Create {
            directory,
            from_index,
        } => cmd_create(
            &source_dir(directory),
            &override_history,
            parse_index(&from_index)?,
        ),
        Commands::History {
            directory,
            number,
            no_index,
        } => cmd_history(&source_dir(directory), &override_history, number, no_index),
        Commands::Diff {
            directory,
            from,
            to,
        } => cmd_diff(&source_dir(directory), &override_history, from, to),
        Commands::Purge { directory, keep } => {
            cmd_purge(&source_dir(directory), &override_history, keep)
        }
    }
}

fn source_dir(directory: Option<PathBuf>) -> PathBuf {
    directory.unwrap_or_else(|| PathBuf::from("."))
}

fn history_dir(override_history: &Option<PathBuf>, source: &Path) -> PathBuf {
    override_history
        .clone()
        .unwrap_or_else(|| source.join(DEFAULT_HISTORY_DIR_NAME))
}

/// A 1-based history index, or "none" for the below-1 sentinel
fn parse_index(text: &str) -> Result<i32> {
    if text == "none" {
        return Ok(-1);
    }
    text.parse()
        .map_err(|_| ShadowError::InvalidIndex(text.to_string()).into())
}

fn cmd_create(source: &Path, override_history: &Option<PathBuf>, from_index: i32) -> Result<()> {
    let history = history_dir(override_history, source);
    let filter = FileFilter::for_history_dir(&history)?;
    let prior = registry::find_by_index(&history, from_index)?;
    let snapshot = registry::create_snapshot_dir(&history, Local::now().naive_local())?;
    SnapshotWalker::new(source.to_path_buf(), snapshot.clone(), prior, &filter).walk()?;
    println!("{}", snapshot.display());
    Ok(())
}

fn cmd_history(
    source: &Path,
    override_history: &Option<PathBuf>,
    number: Option<usize>,
    no_index: bool,
) -> Result<()> {
    let history = registry::history(&history_dir(override_history, source))?;
    let start = match number {
        Some(count) => history.len().saturating_sub(count),
        None => 0,
    };
    let mut out = std::io::stdout().lock();
    for (position, snapshot) in history.iter().enumerate().skip(start) {
        if no_index {
            writeln!(out, "{}", snapshot.display())?;
        } else {
            let index = history.len() - position;
            writeln!(out, "{}: {}", index, snapshot.display())?;
        }
    }
    Ok(())
}

fn cmd_diff(
    source: &Path,
    override_history: &Option<PathBuf>,
    from: i32,
    to: Option<i32>,
) -> Result<()> {
    let history = history_dir(override_history, source);
    let old_root =
        registry::find_by_index(&history, from)?.ok_or(ShadowError::NoPriorSnapshot)?;
    let new_root = match to {
        Some(index) => {
            registry::find_by_index(&history, index)?.ok_or(ShadowError::NoPriorSnapshot)?
        }
        None => source.to_path_buf(),
    };
    let filter = FileFilter::for_history_dir(&history)?;
    let out = std::io::stdout().lock();
    DiffWalker::new(old_root, new_root, &filter, out).walk()?;
    Ok(())
}

fn cmd_purge(source: &Path, override_history: &Option<PathBuf>, keep: usize) -> Result<()> {
    let deleted = registry::purge(&history_dir(override_history, source), keep)?;
    if !deleted.is_empty() {
        eprintln!(
            "{} {} shadow copies removed",
            "[PURGED]".green().bold(),
            deleted.len()
        );
    }
    Ok(())
}
