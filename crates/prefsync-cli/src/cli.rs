use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "prefsync",
    about = "Inspect and edit file-backed preference stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the store documents
    #[arg(long, global = true, default_value = ".prefsync")]
    pub root: PathBuf,

    /// Operate on the system tree instead of the user tree
    #[arg(long, global = true)]
    pub system: bool,

    /// TOML file with flush/sync timing; defaults to the environment
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the value of a key
    Get(KeyArgs),
    /// Set a key
    Put(PutArgs),
    /// Remove a key
    Remove(KeyArgs),
    /// List the keys of a node
    Keys(NodeArgs),
    /// List the children of a node
    Children(NodeArgs),
    /// Remove a node and its subtree
    RemoveNode(NodeArgs),
    /// Write back pending changes
    Flush,
    /// Write back pending changes and refresh from disk
    Sync,
    /// Print the effective timing configuration
    Config,
}

#[derive(Args)]
pub struct NodeArgs {
    /// Node path, e.g. `/com.acme/window`
    pub path: String,
}

#[derive(Args)]
pub struct KeyArgs {
    pub path: String,
    pub key: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: String,
    pub key: String,
    pub value: String,
}
