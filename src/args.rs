use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "qemuctl")]
#[command(version)]
#[command(about = "Manage domains and virtual networks through the qemud daemon", long_about = None)]
pub(crate) struct Cli {
    /// Connection URI (qemu:///system or qemu:///session). Defaults to
    /// the system instance for root, the session instance otherwise.
    #[arg(short = 'c', long, global = true)]
    pub connect: Option<String>,

    /// Open the read-only endpoint
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Do not autostart the daemon when its socket is unreachable
    #[arg(long, global = true)]
    pub no_autostart: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show the daemon's hypervisor version
    Version,

    /// Show host capability information
    Nodeinfo,

    /// List domains
    List {
        /// List defined (persisted, not running) domains instead
        #[arg(long)]
        defined: bool,

        /// Maximum number of entries to return
        #[arg(long, default_value = "100")]
        max: usize,
    },

    /// Look up a domain by name, id, or UUID
    Lookup {
        /// Domain name
        name: Option<String>,

        /// Numeric domain id
        #[arg(long, conflicts_with_all = ["name", "uuid"])]
        id: Option<u32>,

        /// Domain UUID
        #[arg(long, conflicts_with = "name")]
        uuid: Option<Uuid>,
    },

    /// Create and boot a domain from a configuration document
    Create {
        /// Path to the configuration document
        file: PathBuf,
    },

    /// Persist a domain definition without starting it
    Define {
        /// Path to the configuration document
        file: PathBuf,
    },

    /// Boot a defined domain
    Start { name: String },

    /// Pause a running domain
    Suspend { name: String },

    /// Resume a paused domain
    Resume { name: String },

    /// Hard-stop a running domain
    Destroy { name: String },

    /// Gracefully stop a running domain
    Shutdown { name: String },

    /// Remove a persisted domain definition
    Undefine { name: String },

    /// Show a domain's run state and resource accounting
    Info { name: String },

    /// Print a domain's configuration document
    Dump { name: String },

    /// Virtual network operations
    Net {
        #[command(subcommand)]
        command: NetCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum NetCommands {
    /// List virtual networks
    List {
        /// List defined (inactive) networks instead
        #[arg(long)]
        defined: bool,

        /// Maximum number of entries to return
        #[arg(long, default_value = "100")]
        max: usize,
    },

    /// Look up a network by name or UUID
    Lookup {
        /// Network name
        name: Option<String>,

        /// Network UUID
        #[arg(long, conflicts_with = "name")]
        uuid: Option<Uuid>,
    },

    /// Create and start a network from a configuration document
    Create { file: PathBuf },

    /// Persist a network definition without starting it
    Define { file: PathBuf },

    /// Start a defined network
    Start { name: String },

    /// Stop a running network
    Destroy { name: String },

    /// Remove a persisted network definition
    Undefine { name: String },

    /// Print a network's configuration document
    Dump { name: String },

    /// Print the bridge interface backing a network
    Bridge { name: String },
}
