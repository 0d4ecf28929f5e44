//! Server-side bridges from an authenticated session to a local agent.

use async_trait::async_trait;

use forwagent_common::TunnelError;
use forwagent_platform::{AgentStream, AssuanBootstrap, SshAgentSocket};

use crate::proxy::splice;

/// Connects a session's stream to one kind of local agent and forwards
/// bytes until both directions close.
#[async_trait]
pub trait AgentBridge: Send + Sync {
    async fn serve(&self, stream: AgentStream) -> Result<(), TunnelError>;
}

/// Forwards sessions to the host's SSH agent socket.
pub struct SshBridge {
    agent: SshAgentSocket,
}

impl SshBridge {
    pub fn new(agent: SshAgentSocket) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl AgentBridge for SshBridge {
    async fn serve(&self, stream: AgentStream) -> Result<(), TunnelError> {
        let agent = self.agent.connect().await?;
        let stats = splice(stream, agent).await?;
        tracing::debug!(sent = stats.b_to_a, received = stats.a_to_b, "SSH session finished");
        Ok(())
    }
}

/// Forwards sessions to gpg-agent, introducing each connection with the
/// nonce from its assuan socket file.
pub struct GpgBridge {
    bootstrap: AssuanBootstrap,
}

impl GpgBridge {
    pub fn new(bootstrap: AssuanBootstrap) -> Self {
        Self { bootstrap }
    }
}

#[async_trait]
impl AgentBridge for GpgBridge {
    async fn serve(&self, stream: AgentStream) -> Result<(), TunnelError> {
        let agent = self.bootstrap.connect().await?;
        let stats = splice(stream, agent).await?;
        tracing::debug!(sent = stats.b_to_a, received = stats.a_to_b, "GPG session finished");
        Ok(())
    }
}
