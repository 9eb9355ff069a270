use clap::{Parser, Subcommand};

/// xray-keeper: VLESS key lifecycle for an XRay server
#[derive(Parser)]
#[command(name = "xray-keeper", version, about)]
pub struct Cli {
    /// Record external commands (reload, tc) instead of executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Keep the registry in memory instead of Postgres
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the admin API and background jobs
    Serve {
        /// Port to bind (defaults to KEEPER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage VLESS keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Show the effective XRay settings
    Settings,

    /// Throttle clients seen from more devices than allowed
    Enforce {
        /// Device limit applied to every client (defaults to per-key limits)
        #[arg(long)]
        limit: Option<usize>,
        /// Throttle rate, e.g. `1mbit` (defaults to KEEPER_THROTTLE_BANDWIDTH)
        #[arg(long)]
        bandwidth: Option<String>,
    },

    /// Remove expired keys once and exit
    Reconcile,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new key
    Create {
        #[arg(long)]
        label: Option<String>,
        /// Lifetime: 1d, 7d, 30d or permanent
        #[arg(long, default_value = "30d")]
        expires: String,
        /// Device limit: 1, 3, 5 or unlimited
        #[arg(long, default_value = "3")]
        devices: String,
    },
    /// Revoke a key by id
    Revoke { id: String },
    /// List issued keys
    List,
    /// Compare the XRay config against the registry
    Audit,
}
