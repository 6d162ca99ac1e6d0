// src/cli.rs
//! CLI definitions for the anaconda orchestration tool
//!
//! The command implementations are in the `commands` module.

use anaconda::{PayloadKind, SourceType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anaconda")]
#[command(author = "Anaconda Developers")]
#[command(version)]
#[command(about = "Installer payload and subscription orchestration", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = anaconda::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse boot arguments and print them as JSON
    Cmdline {
        /// Read the command line from this file
        #[arg(short, long, default_value = anaconda::cmdline::PROC_CMDLINE, conflicts_with = "args")]
        file: PathBuf,

        /// Parse this string instead of a file
        #[arg(short, long)]
        args: Option<String>,

        /// Only accept options with the inst. prefix
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Boot arguments to overlay on the file
        #[arg(long)]
        cmdline: Option<String>,
    },

    /// Run payload preparation against in-memory backends
    Simulate {
        /// Payload type
        #[arg(short, long, value_enum, default_value_t = KindArg::Dnf)]
        kind: KindArg,

        /// Initial installation source (e.g. CDROM, NFS, URL)
        #[arg(short, long)]
        source: Option<SourceType>,

        /// Make payload setup fail
        #[arg(long)]
        fail_setup: bool,

        /// Make the metadata download fail
        #[arg(long)]
        fail_metadata: bool,

        /// Skip the metadata download when repositories are unchanged
        #[arg(long)]
        only_on_change: bool,

        /// Register with the subscription service first
        #[arg(long)]
        register: bool,
    },
}

/// Payload types the simulator knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Dnf,
    LiveImage,
    RpmOstree,
}

impl From<KindArg> for PayloadKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Dnf => PayloadKind::Dnf,
            KindArg::LiveImage => PayloadKind::LiveImage,
            KindArg::RpmOstree => PayloadKind::RpmOstree,
        }
    }
}
