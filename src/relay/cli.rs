// CLI commands for the message relay

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Message relay CLI
#[derive(Debug, Parser)]
#[command(name = "msgrelay")]
#[command(author, version, about = "Post messages to a recipient and poll for them later")]
pub struct MsgRelayCli {
    /// JSON file holding every mailbox
    ///
    /// Defaults to ~/.msgrelay/messages.json
    #[arg(short = 'f', long, global = true)]
    pub data_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: MsgRelayCommand,
}

/// Message relay subcommands
#[derive(Debug, Subcommand)]
pub enum MsgRelayCommand {
    /// Run the HTTP relay server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },

    /// Send a message to a recipient
    Send {
        /// Who the message is from
        #[arg(short, long)]
        sender: String,

        /// Who the message is for
        #[arg(short, long)]
        recipient: String,

        /// Message content
        message: String,
    },

    /// List a recipient's messages in arrival order
    List {
        /// Recipient name
        recipient: String,

        /// Only show messages newer than this timestamp
        #[arg(long)]
        since: Option<String>,
    },

    /// List a window of a recipient's messages sorted by time
    Range {
        /// Recipient name
        recipient: String,

        /// First offset (inclusive)
        #[arg(long, default_value = "0")]
        start: usize,

        /// Last offset (exclusive)
        #[arg(long, default_value = "10")]
        stop: usize,
    },

    /// Delete messages by ID
    Delete {
        /// Recipient name
        recipient: String,

        /// Message IDs to delete
        ids: Vec<String>,
    },
}

impl MsgRelayCli {
    /// Directory holding relay state when no data file is given
    pub fn state_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".msgrelay")
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path to the message store file
    pub data_file: PathBuf,
}

impl RelayConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(cli: &MsgRelayCli) -> Self {
        let data_file = cli
            .data_file
            .clone()
            .unwrap_or_else(|| MsgRelayCli::state_dir().join("messages.json"));

        Self { data_file }
    }
}
