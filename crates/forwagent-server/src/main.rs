mod cli;

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use forwagent_common::{ConfigError, ForwagentError, PeerRole};
use forwagent_config::{ForwagentConfig, RuntimePaths};
use forwagent_platform::{
    AgentLauncher, AllowListAuthenticator, AssuanBootstrap, Authenticator, CommandLauncher,
    Identity, NoLauncher, SshAgentSocket, TrustOnFirstUse,
};
use forwagent_tunnel::{Dispatcher, GpgBridge, SecureChannel, SshBridge};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let log_file = args.log_file.as_deref();
    if let Err(e) = forwagent_common::logging::init(args.log_level.as_deref(), log_file) {
        eprintln!("forwagent-server: cannot open log file: {e}");
        std::process::exit(1);
    }

    tracing::info!("forwagent-server v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "forwagent-server failed");
        eprintln!("forwagent-server: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run(args: cli::Args) -> forwagent_common::Result<()> {
    let conf_dir = forwagent_config::default_conf_dir()?;
    let config = load_config(&args, &conf_dir)?;
    let paths = RuntimePaths::resolve(&config, conf_dir)?;
    let address = args
        .address
        .clone()
        .unwrap_or_else(|| config.tunnel.address.clone());

    let identity = Arc::new(Identity::load_or_create(&paths, PeerRole::Server)?);
    println!("Server public key: {}", identity.public_key_base64());
    tracing::info!(fingerprint = %identity.fingerprint(), "Identity loaded");

    let trust_first_use = args.trust_first_use || config.server.trust_on_first_use;
    let authenticator: Arc<dyn Authenticator> = if trust_first_use {
        tracing::warn!("Trust on first use enabled: clients are admitted while clients.allowed is empty");
        Arc::new(TrustOnFirstUse::new(&paths, PeerRole::Client))
    } else {
        Arc::new(AllowListAuthenticator::new(&paths, PeerRole::Client))
    };
    let channel = SecureChannel::new(identity, authenticator, config.tunnel.handshake_timeout());
    let dispatcher = Arc::new(build_dispatcher(&config, &paths));

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ForwagentError::Bind {
            addr: address.clone(),
            source,
        })?;
    println!("Listening on {address}");
    tracing::info!(%address, "forwagent-server listening");

    tokio::select! {
        _ = forwagent_tunnel::serve(listener, channel, dispatcher) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, no longer accepting connections");
        }
    }
    Ok(())
}

fn load_config(args: &cli::Args, conf_dir: &Path) -> Result<ForwagentConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            tracing::info!("Using config override: {}", path.display());
            forwagent_config::load_from_path(path)
        }
        None => forwagent_config::load_from_dir(conf_dir),
    }
}

fn build_dispatcher(config: &ForwagentConfig, paths: &RuntimePaths) -> Dispatcher {
    let launcher: Arc<dyn AgentLauncher> =
        match CommandLauncher::from_command(&config.server.agent_start_command) {
            Some(launcher) => Arc::new(launcher),
            None => Arc::new(NoLauncher),
        };

    match &paths.ssh_auth_sock {
        Some(path) => tracing::info!(path = %path.display(), "SSH agent socket"),
        None => tracing::warn!("SSH_AUTH_SOCK is not set; SSH sessions will fail"),
    }
    tracing::info!(path = %paths.assuan_socket.display(), "GPG agent endpoint");

    let ssh = SshBridge::new(SshAgentSocket::new(
        paths.ssh_auth_sock.clone(),
        launcher.clone(),
    ));
    let gpg = GpgBridge::new(AssuanBootstrap::new(paths.assuan_socket.clone(), launcher));
    Dispatcher::new(Arc::new(ssh), Arc::new(gpg))
}
