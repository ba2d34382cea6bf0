use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "notary",
    about = "Notary: fingerprint, anchor, and verify content",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

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
    /// Print the SHA-256 fingerprint of files
    Fingerprint(FingerprintArgs),
    /// Verify a fingerprint against a server, or a proof file offline
    Verify(VerifyArgs),
    /// Watch a registration until it settles
    Watch(WatchArgs),
    /// Show the credit balance of an account
    Balance(BalanceArgs),
    /// Start the Notary server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct FingerprintArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// 64-character hex fingerprint
    #[arg(long, conflicts_with = "content")]
    pub fingerprint: Option<String>,
    /// File whose fingerprint is verified
    #[arg(long)]
    pub content: Option<PathBuf>,
    /// Proof artifact; verification then runs offline
    #[arg(long)]
    pub proof: Option<PathBuf>,
    /// Calendar key accepted on the proof (repeatable). Required offline
    /// unless --server is given to supply the calendar key
    #[arg(long = "trusted-key")]
    pub trusted_keys: Vec<String>,
    #[arg(long, env = "NOTARY_SERVER")]
    pub server: Option<String>,
}

#[derive(Args)]
pub struct WatchArgs {
    pub registration: String,
    #[arg(long, env = "NOTARY_SERVER")]
    pub server: String,
    #[arg(long, default_value = "3")]
    pub interval: u64,
    /// Local wait limit in seconds; the server keeps anchoring after it
    #[arg(long, default_value = "300")]
    pub max_wait: u64,
}

#[derive(Args)]
pub struct BalanceArgs {
    #[arg(long, env = "NOTARY_SERVER")]
    pub server: String,
    #[arg(long, env = "NOTARY_TOKEN")]
    pub token: String,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides `bind_addr` from the config file
    #[arg(long)]
    pub bind: Option<String>,
}
