//! Configuration validation.

use forwagent_common::ConfigError;

use crate::schema::ForwagentConfig;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ForwagentConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    if config.tunnel.address.trim().is_empty() {
        errors.push("tunnel.address must not be empty".into());
    } else if !config.tunnel.address.contains(':') {
        errors.push(format!(
            "tunnel.address = {:?} must be host:port",
            config.tunnel.address
        ));
    }

    if config.tunnel.handshake_timeout_secs == 0 {
        errors.push("tunnel.handshake_timeout_secs must be greater than 0".into());
    }

    if config
        .server
        .agent_start_command
        .first()
        .map_or(true, |program| program.trim().is_empty())
    {
        errors.push("server.agent_start_command must name a program".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
