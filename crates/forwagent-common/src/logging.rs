//! Process-wide `tracing` subscriber setup for the binaries.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Default filter for both binaries.
pub const DEFAULT_DIRECTIVE: &str =
    "forwagent=info,forwagent_server=info,forwagent_tunnel=info,forwagent_platform=info,forwagent_config=info";

/// Pick the filter: `RUST_LOG` wins, then the `--log-level` directive, then
/// [`DEFAULT_DIRECTIVE`]. An unparsable directive falls back to the default.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    level
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber, writing to `log_file` (appending, no
/// colours) when given and to stderr otherwise.
pub fn init(level: Option<&str>, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = env_filter(level);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
