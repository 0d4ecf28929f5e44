//! Routing authenticated sessions to the bridge named by their tag.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use forwagent_common::{SessionKind, TunnelError, MAX_TAG_LEN};

use crate::bridge::AgentBridge;

/// Read the session tag: the first record the client sends after the
/// handshake. One read of at most [`MAX_TAG_LEN`] bytes, no delimiter.
pub async fn read_session_tag<S>(stream: &mut S) -> Result<SessionKind, TunnelError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_TAG_LEN];
    let n = stream.read(&mut buf).await?;
    let tag = &buf[..n];
    SessionKind::from_tag(tag)
        .ok_or_else(|| TunnelError::UnknownSessionTag(String::from_utf8_lossy(tag).into_owned()))
}

/// Holds one bridge per session kind.
#[derive(Clone)]
pub struct Dispatcher {
    ssh: Arc<dyn AgentBridge>,
    gpg: Arc<dyn AgentBridge>,
}

impl Dispatcher {
    pub fn new(ssh: Arc<dyn AgentBridge>, gpg: Arc<dyn AgentBridge>) -> Self {
        Self { ssh, gpg }
    }

    fn bridge(&self, kind: SessionKind) -> &Arc<dyn AgentBridge> {
        match kind {
            SessionKind::Ssh => &self.ssh,
            SessionKind::Gpg => &self.gpg,
        }
    }

    /// Read the tag from `stream` and hand the rest of the session to the
    /// matching bridge. An unknown tag closes the session untouched.
    pub async fn dispatch<S>(&self, mut stream: S, peer: &str) -> Result<SessionKind, TunnelError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let kind = read_session_tag(&mut stream).await?;
        tracing::info!(%peer, session = %kind, "Session started");
        self.bridge(kind).serve(Box::new(stream)).await?;
        Ok(kind)
    }
}
