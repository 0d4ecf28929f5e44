use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::session::PeerRole;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("path error: {0}")]
    PathError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("cannot access key file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt key file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("public key file {} does not match its private key", path.display())]
    Mismatch { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("peer presented no public key")]
    EmptyKey,

    #[error("unknown {role} key: {}", B64.encode(key))]
    UnknownKey {
        role: PeerRole,
        key: Vec<u8>,
        allow_file: PathBuf,
    },

    #[error("cannot read allowlist {}: {source}", path.display())]
    AllowList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// Operator instructions for trusting a rejected key, if this error is
    /// a rejection. Trust is configured entirely by acting on this text.
    pub fn remediation(&self) -> Option<String> {
        match self {
            AuthError::UnknownKey {
                role,
                key,
                allow_file,
            } => Some(remediation_hint(*role, key, allow_file)),
            _ => None,
        }
    }
}

/// Render the "how to allow this key" text for a peer key.
pub fn remediation_hint(role: PeerRole, key: &[u8], allow_file: &std::path::Path) -> String {
    let encoded = B64.encode(key);
    format!(
        "Unknown {role} key: {encoded}\nTo allow:\n\necho '{encoded}' >> {}\n",
        allow_file.display()
    )
}

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unknown session tag: {0:?}")]
    UnknownSessionTag(String),

    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("bad agent metadata in {}: {reason}", path.display())]
    BootstrapMetadata { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ForwagentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
