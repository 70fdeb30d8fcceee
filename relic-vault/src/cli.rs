use clap::{Parser, Subcommand};
use relic_vault::Kind;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "relic")]
#[command(about = "Read files out of disc images and SAF archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display information about a container
    Info {
        /// Mount directory (iso) or executable (swfkit)
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Container kind (defaults to iso for directories, swfkit for files)
        #[arg(short, long)]
        kind: Option<Kind>,
    },

    /// List files with their sizes and known checksums
    List {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        #[arg(short, long)]
        kind: Option<Kind>,
    },

    /// Write a file to stdout
    Cat {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Absolute path inside the container
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(short, long)]
        kind: Option<Kind>,
    },

    /// Read every file and print its SHA-256
    Verify {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        #[arg(short, long)]
        kind: Option<Kind>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Open every configured mount and list the ones that opened
    Mounts {
        /// Path to the configuration file
        #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
        config: PathBuf,
    },
}
