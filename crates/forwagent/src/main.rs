mod cli;

use std::sync::Arc;

use forwagent_common::{ForwagentError, PeerRole, SessionKind};
use forwagent_config::{ForwagentConfig, RuntimePaths};
use forwagent_platform::{AllowListAuthenticator, Identity};
use forwagent_tunnel::{Connector, SecureChannel};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let log_file = args.log_file.as_deref();
    if let Err(e) = forwagent_common::logging::init(args.log_level.as_deref(), log_file) {
        eprintln!("forwagent: cannot open log file: {e}");
        std::process::exit(1);
    }

    tracing::info!("forwagent v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "forwagent failed");
        eprintln!("forwagent: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run(args: cli::Args) -> forwagent_common::Result<()> {
    let conf_dir = forwagent_config::default_conf_dir()?;
    let config = load_config(&args, &conf_dir)?;
    let paths = RuntimePaths::resolve(&config, conf_dir)?;
    let address = args.address.unwrap_or_else(|| config.tunnel.address.clone());

    let identity = Arc::new(Identity::load_or_create(&paths, PeerRole::Client)?);
    println!("Client public key: {}", identity.public_key_base64());
    println!("Forwarding agents from {address}");
    tracing::info!(fingerprint = %identity.fingerprint(), server = %address, "Identity loaded");

    let authenticator = Arc::new(AllowListAuthenticator::new(&paths, PeerRole::Server));
    let channel = SecureChannel::new(identity, authenticator, config.tunnel.handshake_timeout());
    let connector = Arc::new(Connector::new(address, channel));

    serve_sockets(&paths, connector).await
}

fn load_config(
    args: &cli::Args,
    conf_dir: &std::path::Path,
) -> Result<ForwagentConfig, forwagent_common::ConfigError> {
    match &args.config {
        Some(path) => {
            tracing::info!("Using config override: {}", path.display());
            forwagent_config::load_from_path(path)
        }
        None => forwagent_config::load_from_dir(conf_dir),
    }
}

/// Bind both local agent sockets and tunnel their connections until Ctrl-C.
/// The socket files are removed when the listeners are dropped.
#[cfg(unix)]
async fn serve_sockets(
    paths: &RuntimePaths,
    connector: Arc<Connector>,
) -> forwagent_common::Result<()> {
    use forwagent_tunnel::{serve_local, AgentSocket};

    let bind = |kind: SessionKind| {
        let path = paths.socket_path(kind);
        AgentSocket::bind(&path).map_err(|source| ForwagentError::Bind {
            addr: path.display().to_string(),
            source,
        })
    };
    let gpg = bind(SessionKind::Gpg)?;
    let ssh = bind(SessionKind::Ssh)?;
    println!("GPG agent socket: {}", gpg.path().display());
    println!("SSH agent socket: {}", ssh.path().display());

    tokio::select! {
        _ = serve_local(gpg, SessionKind::Gpg, connector.clone()) => {}
        _ = serve_local(ssh, SessionKind::Ssh, connector) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, removing agent sockets");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn serve_sockets(
    paths: &RuntimePaths,
    _connector: Arc<Connector>,
) -> forwagent_common::Result<()> {
    Err(ForwagentError::Bind {
        addr: paths.socket_path(SessionKind::Gpg).display().to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "local agent sockets require Unix domain sockets",
        ),
    })
}
