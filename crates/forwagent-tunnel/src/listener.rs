//! Client side: local agent sockets whose connections are tunneled to the
//! server, one authenticated session per local connection.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use forwagent_common::{SessionKind, TunnelError};

use crate::channel::{SecureChannel, SecureStream};
use crate::proxy::splice;

/// Opens tagged sessions to one server.
#[derive(Debug, Clone)]
pub struct Connector {
    address: String,
    channel: SecureChannel,
}

impl Connector {
    pub fn new(address: impl Into<String>, channel: SecureChannel) -> Self {
        Self {
            address: address.into(),
            channel,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect, authenticate, and announce `kind`. The returned stream is
    /// ready for agent traffic. The TCP connect is bounded by the handshake
    /// timeout.
    pub async fn open(&self, kind: SessionKind) -> Result<SecureStream<TcpStream>, TunnelError> {
        let connect = TcpStream::connect(&self.address);
        let stream = tokio::time::timeout(self.channel.timeout(), connect)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", self.address),
                )
            })??;
        stream.set_nodelay(true)?;

        let mut secure = self.channel.initiate(stream).await?;
        secure.write_all(kind.tag()).await?;
        secure.flush().await?;
        Ok(secure)
    }
}

/// Tunnel one accepted local connection until both directions close.
pub async fn handle_local<S>(
    local: S,
    kind: SessionKind,
    connector: &Connector,
) -> Result<(), TunnelError>
where
    S: AsyncRead + AsyncWrite,
{
    let remote = connector.open(kind).await?;
    let stats = splice(local, remote).await?;
    tracing::debug!(
        session = %kind,
        sent = stats.a_to_b,
        received = stats.b_to_a,
        "Local session finished"
    );
    Ok(())
}

#[cfg(unix)]
pub use unix::{serve_local, AgentSocket};

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use tokio::net::{UnixListener, UnixStream};

    use forwagent_common::{SessionKind, TunnelError};

    use super::{handle_local, Connector};

    /// A bound local socket that is removed again when dropped.
    #[derive(Debug)]
    pub struct AgentSocket {
        listener: UnixListener,
        path: PathBuf,
    }

    impl AgentSocket {
        /// Bind at `path`, replacing a stale socket file left by an earlier
        /// run. The socket is only accessible to the current user.
        pub fn bind(path: &Path) -> io::Result<Self> {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                    std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
                }
            }

            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }

            let listener = UnixListener::bind(path)?;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            Ok(Self {
                listener,
                path: path.to_path_buf(),
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub async fn accept(&self) -> io::Result<UnixStream> {
            let (stream, _) = self.listener.accept().await?;
            Ok(stream)
        }
    }

    impl Drop for AgentSocket {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    /// Accept local connections on `socket` forever, tunneling each as a
    /// `kind` session on its own task.
    pub async fn serve_local(socket: AgentSocket, kind: SessionKind, connector: Arc<Connector>) {
        tracing::info!(path = %socket.path().display(), session = %kind, "Listening");
        loop {
            match socket.accept().await {
                Ok(local) => {
                    let connector = connector.clone();
                    tokio::spawn(async move {
                        match handle_local(local, kind, &connector).await {
                            Ok(()) => {}
                            Err(TunnelError::Auth(_)) => {}
                            Err(e) => tracing::warn!(
                                session = %kind,
                                server = %connector.address(),
                                error = %e,
                                "Tunnel session failed"
                            ),
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Local accept error");
                }
            }
        }
    }
}
