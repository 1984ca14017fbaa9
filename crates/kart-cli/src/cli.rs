use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kart",
    about = "kart: archive builds and promote them onto release tracks",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file
    #[arg(long, global = true, env = "KART_CONFIG", default_value = "kart.toml")]
    pub config: PathBuf,

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
    /// Store, list, remove, and download archived builds
    Archive(ArchiveArgs),
    /// Promote a build onto a release track
    Release(ReleaseArgs),
    /// Show the build currently released on a channel
    Status(StatusArgs),
}

#[derive(Args)]
pub struct ArchiveArgs {
    #[command(subcommand)]
    pub action: ArchiveAction,
}

#[derive(Subcommand)]
pub enum ArchiveAction {
    /// Archive a build directory
    Store(StoreArgs),
    /// List archived builds
    List(ListArgs),
    /// Delete an archived build
    Remove(BuildRef),
    /// Extract an archived build into a directory
    Download(DownloadArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    pub dir: PathBuf,
    pub project: String,
    pub channel: String,
    pub version: String,
    #[arg(long)]
    pub arch: Option<String>,
    #[arg(long)]
    pub ext: Option<String>,
    #[arg(long)]
    pub name_pattern: Option<String>,
    /// Metadata entry, repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

#[derive(Args)]
pub struct ListArgs {
    pub project: String,
    pub channel: String,
    /// Exact-match filter, repeatable
    #[arg(long, value_name = "FIELD=VALUE", value_parser = parse_key_val)]
    pub filter: Vec<(String, String)>,
    /// Sort field, repeatable; later fields break ties
    #[arg(long)]
    pub sort: Vec<String>,
    #[arg(long)]
    pub desc: bool,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct BuildRef {
    pub project: String,
    pub channel: String,
    pub number: u64,
}

#[derive(Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub build: BuildRef,
    pub dest: PathBuf,
}

#[derive(Args)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub build: BuildRef,
    #[arg(long)]
    pub track: String,
    #[arg(long)]
    pub name_pattern: Option<String>,
    /// Copy deadline in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Only write the track's manifest; the archive was already copied
    #[arg(long, conflicts_with_all = ["name_pattern", "timeout"])]
    pub record_only: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    pub project: String,
    pub channel: String,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
