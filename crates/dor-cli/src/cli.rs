use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dor",
    about = "Digital Object Repository operator tool",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Repository configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage directory, overriding the configured one
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest a serialized object
    Ingest(IngestArgs),
    /// Export an object's serialized document
    Export(ExportArgs),
    /// Purge an object and everything indexed about it
    Purge(PurgeArgs),
    /// List the methods an object exposes
    Methods(MethodsArgs),
    /// Run a behavior method on an object
    Disseminate(DisseminateArgs),
    /// Reserve fresh pids
    NextPid(NextPidArgs),
    /// Search object fields
    Find(FindArgs),
    /// Re-register and re-index every stored object
    Rebuild(RebuildArgs),
    /// Replay replication jobs left by failed commits
    Recover(RecoverArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    pub file: PathBuf,
    #[arg(long, default_value = "metslikefedora1")]
    pub document_format: String,
    #[arg(long, default_value = "UTF-8")]
    pub encoding: String,
    /// Assign a pid from the configured namespace
    #[arg(long)]
    pub new_pid: bool,
    #[arg(short, long, default_value = "ingest")]
    pub message: String,
}

#[derive(Args)]
pub struct ExportArgs {
    pub pid: String,
    #[arg(long)]
    pub as_of: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct PurgeArgs {
    pub pid: String,
    #[arg(short, long, default_value = "purge")]
    pub message: String,
}

#[derive(Args)]
pub struct MethodsArgs {
    pub pid: String,
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Args)]
pub struct DisseminateArgs {
    pub pid: String,
    /// Behavior definition pid or disseminator id
    pub bdef: String,
    pub method: String,
    /// Method parameter as NAME=VALUE
    #[arg(short, long = "parm")]
    pub parms: Vec<String>,
    #[arg(long)]
    pub as_of: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct NextPidArgs {
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct FindArgs {
    /// Field equals value, as FIELD=VALUE
    #[arg(long = "eq", conflicts_with = "terms")]
    pub equals: Vec<String>,
    /// Field matches a case-insensitive glob, as FIELD=GLOB
    #[arg(long, conflicts_with = "terms")]
    pub has: Vec<String>,
    /// Glob matched against every field
    #[arg(short, long)]
    pub terms: Option<String>,
    #[arg(long, value_delimiter = ',', default_value = "pid,label")]
    pub fields: Vec<String>,
    #[arg(long, default_value = "50")]
    pub max: usize,
}

#[derive(Args)]
pub struct RebuildArgs {}

#[derive(Args)]
pub struct RecoverArgs {}
