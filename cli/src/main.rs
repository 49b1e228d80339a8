//! `sdm`: command-line shell over the Secure Data Manager vault.
//!
//! Each invocation is a fresh process. The unlocked session carries over
//! between invocations through the session key file in the data
//! directory, until `sdm lock` removes it.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sdm", version)]
#[command(about = "Password-protected local vault for credentials, message templates and links")]
struct Cli {
    /// Vault data directory (defaults to the platform data dir).
    #[arg(long, env = "SDM_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Unlock the vault with the master password
    Unlock,

    /// Lock the vault and forget the session key
    Lock,

    /// Show whether the vault is locked or unlocked
    Status,

    /// Print the effective configuration
    Config,

    /// List every item of one kind
    List {
        kind: Kind,
        /// Show credential passwords in clear
        #[arg(long)]
        reveal: bool,
    },

    /// Case-insensitive search within one kind
    Search {
        kind: Kind,
        term: String,
        /// Show credential passwords in clear
        #[arg(long)]
        reveal: bool,
    },

    /// Add an item
    Add {
        #[command(subcommand)]
        item: AddItem,
    },

    /// Change fields of an existing item
    Update {
        #[command(subcommand)]
        item: UpdateItem,
    },

    /// Delete an item
    Delete { kind: Kind, id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Credentials,
    Messages,
    Links,
}

#[derive(Subcommand)]
enum AddItem {
    /// Add a site login; the password is prompted for
    Credential {
        #[arg(long)]
        site: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long, default_value = "")]
        user: String,
    },
    /// Add a message template
    Message {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
    },
    /// Add a link
    Link {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum UpdateItem {
    /// Update a site login
    Credential {
        id: String,
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Prompt for a new password (an empty answer keeps the old one)
        #[arg(long)]
        new_pass: bool,
    },
    /// Update a message template
    Message {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Update a link
    Link {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
}

/// Log to stderr, `RUST_LOG` wins over the `warn` default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    commands::run(cli).await
}
