//! Byte-stream endpoints of the local agents on the server host.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use forwagent_common::TunnelError;

use crate::launcher::AgentLauncher;

/// Any duplex byte stream a local agent can be reached through.
pub trait AgentIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AgentIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type AgentStream = Box<dyn AgentIo>;

/// The server host's SSH agent, reached through its local socket.
pub struct SshAgentSocket {
    path: Option<PathBuf>,
    launcher: Arc<dyn AgentLauncher>,
}

impl SshAgentSocket {
    pub fn new(path: Option<PathBuf>, launcher: Arc<dyn AgentLauncher>) -> Self {
        Self { path, launcher }
    }

    /// Connect to the agent, asking the launcher to start it and retrying
    /// once if the first attempt fails.
    pub async fn connect(&self) -> Result<AgentStream, TunnelError> {
        match self.try_connect().await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(error = %e, "SSH agent not reachable, trying to start it");
            }
        }

        if let Err(e) = self.launcher.ensure_running().await {
            tracing::warn!(error = %e, "Couldn't start local agent");
        }

        self.try_connect().await.map_err(|e| {
            TunnelError::AgentUnavailable(match &self.path {
                Some(path) => format!("SSH agent at {}: {e}", path.display()),
                None => "no SSH agent socket configured (SSH_AUTH_SOCK unset)".into(),
            })
        })
    }

    async fn try_connect(&self) -> std::io::Result<AgentStream> {
        let Some(path) = &self.path else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no SSH agent socket configured",
            ));
        };

        #[cfg(unix)]
        {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("cannot open agent socket {} on this platform", path.display()),
            ))
        }
    }
}
