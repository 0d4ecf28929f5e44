use std::path::PathBuf;

use clap::Parser;

/// forwagent: expose a remote machine's SSH and GPG agents as local
/// agent sockets over an authenticated, encrypted tunnel.
#[derive(Parser, Debug)]
#[command(name = "forwagent", version, about)]
pub struct Args {
    /// Server address as host:port (default from config, else 127.0.0.1:4711).
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
}

pub fn parse() -> Args {
    Args::parse()
}
