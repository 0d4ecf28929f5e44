//! Bringing up the local agent on demand.

use async_trait::async_trait;

use forwagent_common::TunnelError;

/// Makes sure the local agent is running before a connection is retried.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn ensure_running(&self) -> Result<(), TunnelError>;
}

/// Runs an external command (by default `gpg-connect-agent /bye`), which
/// starts gpg-agent as a side effect, and waits for it to exit.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Build from a `[program, args...]` list. `None` if the list is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl AgentLauncher for CommandLauncher {
    async fn ensure_running(&self) -> Result<(), TunnelError> {
        tracing::info!(program = %self.program, "Starting local agent");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| {
                TunnelError::AgentUnavailable(format!("could not run {}: {e}", self.program))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(TunnelError::AgentUnavailable(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}

/// A launcher that never starts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLauncher;

#[async_trait]
impl AgentLauncher for NoLauncher {
    async fn ensure_running(&self) -> Result<(), TunnelError> {
        Ok(())
    }
}
