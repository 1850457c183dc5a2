//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tab activity timeline.
///
/// Inspects and maintains the persisted browsing timeline, sends protocol
/// messages to the engine and replays scripted browsing sessions.
#[derive(Debug, Parser)]
#[command(name = "tabtime", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the persisted session and recorder state.
    Status,

    /// Print the timeline, newest first.
    Timeline {
        /// Output the session as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Merge fragmented entries of the persisted timeline.
    Consolidate,

    /// Empty the timeline and start a new session.
    Clear,

    /// Handle one protocol message against the persisted state.
    Send {
        /// The message as JSON, e.g. '{"action":"getTimelineData"}'.
        message: String,
    },

    /// Drive the engine with a scripted browsing session (JSON lines).
    Replay {
        /// Script file; one `{"at": <ms>, "op": ...}` object per line.
        script: PathBuf,

        /// Output the resulting session as JSON.
        #[arg(long)]
        json: bool,
    },
}
