//! Connecting to gpg-agent through its assuan socket emulation.
//!
//! Where gpg-agent cannot use a Unix socket it listens on a localhost TCP
//! port and publishes a small file in place of the socket: the decimal port
//! on the first line, followed by a nonce. A client proves it can read that
//! file by sending the nonce as its first bytes. After that the connection
//! is plain assuan, which the tunnel forwards without looking at it.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use forwagent_common::TunnelError;

use crate::agent::AgentStream;
use crate::launcher::AgentLauncher;

/// Port and nonce read from an assuan metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssuanEndpoint {
    pub port: u16,
    pub nonce: Vec<u8>,
}

impl AssuanEndpoint {
    /// Split metadata at the first newline: ASCII port, then raw nonce.
    pub fn parse(data: &[u8], path: &Path) -> Result<Self, TunnelError> {
        let bad = |reason: String| TunnelError::BootstrapMetadata {
            path: path.to_path_buf(),
            reason,
        };

        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| bad("missing newline after port".into()))?;

        let port_text = std::str::from_utf8(&data[..newline])
            .map_err(|_| bad("port is not ASCII".into()))?
            .trim();
        let port: u16 = port_text
            .parse()
            .map_err(|e| bad(format!("invalid port {port_text:?}: {e}")))?;

        let nonce = data[newline + 1..].to_vec();
        if nonce.is_empty() {
            return Err(bad("missing nonce".into()));
        }

        Ok(Self { port, nonce })
    }
}

/// Locates gpg-agent's endpoint and performs its one-shot introduction.
pub struct AssuanBootstrap {
    path: PathBuf,
    launcher: Arc<dyn AgentLauncher>,
}

impl AssuanBootstrap {
    pub fn new(path: PathBuf, launcher: Arc<dyn AgentLauncher>) -> Self {
        Self { path, launcher }
    }

    /// Return a stream to gpg-agent that is ready for assuan traffic.
    pub async fn connect(&self) -> Result<AgentStream, TunnelError> {
        self.locate().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            let meta = tokio::fs::metadata(&self.path).await?;
            if meta.file_type().is_socket() {
                tracing::debug!(path = %self.path.display(), "Using native gpg-agent socket");
                let stream = tokio::net::UnixStream::connect(&self.path)
                    .await
                    .map_err(|e| self.unavailable(e))?;
                return Ok(Box::new(stream));
            }
        }

        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let endpoint = AssuanEndpoint::parse(&data, &self.path)?;

        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, endpoint.port))
            .await
            .map_err(|e| {
                TunnelError::AgentUnavailable(format!(
                    "gpg-agent not listening on port {}: {e}",
                    endpoint.port
                ))
            })?;
        stream.write_all(&endpoint.nonce).await?;
        tracing::debug!(port = endpoint.port, "Connected to gpg-agent");

        Ok(Box::new(stream))
    }

    /// Make sure the metadata file exists, starting the agent at most once.
    async fn locate(&self) -> Result<(), TunnelError> {
        if self.exists().await {
            return Ok(());
        }

        tracing::info!(path = %self.path.display(), "gpg-agent endpoint missing, starting agent");
        if let Err(e) = self.launcher.ensure_running().await {
            tracing::warn!(error = %e, "Couldn't start gpg-agent");
        }

        if self.exists().await {
            Ok(())
        } else {
            Err(TunnelError::AgentUnavailable(format!(
                "{} does not exist",
                self.path.display()
            )))
        }
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn unavailable(&self, e: std::io::Error) -> TunnelError {
        TunnelError::AgentUnavailable(format!("{}: {e}", self.path.display()))
    }
}
