//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Address used when neither the command line nor the config names one.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4711";

/// Root configuration shared by the client and the server binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwagentConfig {
    pub tunnel: TunnelConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Settings common to both ends of the tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// `host:port` the server listens on and the client dials.
    pub address: String,
    /// Upper bound on a complete handshake, in seconds.
    pub handshake_timeout_secs: u64,
}

impl TunnelConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            handshake_timeout_secs: 10,
        }
    }
}

/// Server-only settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Accept any client while `clients.allowed` is empty, printing its key.
    pub trust_on_first_use: bool,
    /// Command run to bring up the local agent when it cannot be reached.
    pub agent_start_command: Vec<String>,
    /// Override for the GPG agent's assuan socket / metadata file.
    pub assuan_socket: Option<PathBuf>,
    /// Override for the local SSH agent socket.
    pub ssh_auth_sock: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            trust_on_first_use: false,
            agent_start_command: vec!["gpg-connect-agent".into(), "/bye".into()],
            assuan_socket: None,
            ssh_auth_sock: None,
        }
    }
}

/// Client-only settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory holding the local agent sockets. Defaults to `~/.gnupg`.
    pub socket_dir: Option<PathBuf>,
}
