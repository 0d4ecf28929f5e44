use std::path::PathBuf;

use clap::Parser;

/// forwagent-server: serve this machine's SSH and GPG agents to trusted
/// forwagent clients.
#[derive(Parser, Debug)]
#[command(name = "forwagent-server", version, about)]
pub struct Args {
    /// Address to listen on as host:port (default from config, else 127.0.0.1:4711).
    pub address: Option<String>,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error, or a filter directive).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Accept any client while clients.allowed is empty, printing its key.
    #[arg(long)]
    pub trust_first_use: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
