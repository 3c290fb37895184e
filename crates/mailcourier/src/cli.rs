//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

/// Persistent, rate-limited email dispatch.
#[derive(Debug, Parser)]
#[command(name = "mailcourier", version, about)]
pub struct Cli {
    /// Config file (defaults to the user config directory).
    #[arg(long, short, global = true, env = "MAILCOURIER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the background worker until interrupted.
    Worker,
    /// Store a message and deliver it now.
    Send(MessageArgs),
    /// Store a message for the worker to deliver later.
    Schedule {
        #[command(flatten)]
        message: MessageArgs,
        /// Delivery time (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// List messages that have not been sent yet.
    Pending {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct MessageArgs {
    /// Sender, `addr` or `Name <addr>`.
    #[arg(long)]
    pub from: String,
    /// Recipient address; repeat for several.
    #[arg(long = "to", required = true)]
    pub to: Vec<String>,
    /// Subject line.
    #[arg(long, default_value = "")]
    pub subject: String,
    /// Plain-text body.
    #[arg(long)]
    pub text: Option<String>,
    /// HTML body.
    #[arg(long)]
    pub html: Option<String>,
    /// File to attach; repeat for several.
    #[arg(long = "attach")]
    pub attachments: Vec<PathBuf>,
}
