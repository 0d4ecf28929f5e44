//! Resolution of every filesystem location the tunnel touches.

use std::path::{Path, PathBuf};

use forwagent_common::{ConfigError, PeerRole, SessionKind};

use crate::schema::ForwagentConfig;

const CONF_DIR_NAME: &str = ".forwagent";

/// Name of the optional config file inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `~/.forwagent`, holding key pairs, allowlists and `config.toml`.
pub fn default_conf_dir() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(CONF_DIR_NAME))
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .ok_or_else(|| ConfigError::PathError("could not determine home directory".into()))
}

/// Concrete paths, computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Key pairs, allowlists and `config.toml`.
    pub conf_dir: PathBuf,
    /// Where the client creates its local agent sockets.
    pub socket_dir: PathBuf,
    /// GPG agent endpoint: assuan metadata file or, on Unix, a socket.
    pub assuan_socket: PathBuf,
    /// Local SSH agent socket on the server, if one is known.
    pub ssh_auth_sock: Option<PathBuf>,
}

impl RuntimePaths {
    /// Resolve against the current user's home directory and environment.
    pub fn resolve(config: &ForwagentConfig, conf_dir: PathBuf) -> Result<Self, ConfigError> {
        let home = home_dir()?;
        let ssh_auth_sock = std::env::var_os("SSH_AUTH_SOCK").map(PathBuf::from);
        Ok(Self::from_parts(
            config,
            conf_dir,
            &home,
            default_assuan_socket(&home),
            ssh_auth_sock,
        ))
    }

    /// Resolve from explicit inputs; config overrides win over the defaults.
    pub fn from_parts(
        config: &ForwagentConfig,
        conf_dir: PathBuf,
        home: &Path,
        default_assuan: PathBuf,
        ssh_auth_sock_env: Option<PathBuf>,
    ) -> Self {
        Self {
            conf_dir,
            socket_dir: config
                .client
                .socket_dir
                .clone()
                .unwrap_or_else(|| home.join(".gnupg")),
            assuan_socket: config.server.assuan_socket.clone().unwrap_or(default_assuan),
            ssh_auth_sock: config.server.ssh_auth_sock.clone().or(ssh_auth_sock_env),
        }
    }

    /// Everything under a single directory.
    pub fn rooted(root: &Path) -> Self {
        Self {
            conf_dir: root.join(CONF_DIR_NAME),
            socket_dir: root.join("sockets"),
            assuan_socket: root.join("gnupg").join("S.gpg-agent"),
            ssh_auth_sock: None,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.conf_dir.join(CONFIG_FILE_NAME)
    }

    pub fn private_key_file(&self, role: PeerRole) -> PathBuf {
        self.conf_dir.join(format!("{}.priv", role.name()))
    }

    pub fn public_key_file(&self, role: PeerRole) -> PathBuf {
        self.conf_dir.join(format!("{}.pub", role.name()))
    }

    /// Allowlist of trusted peers that hold `role`.
    pub fn allow_file(&self, role: PeerRole) -> PathBuf {
        self.conf_dir.join(role.allow_file_name())
    }

    pub fn socket_path(&self, kind: SessionKind) -> PathBuf {
        self.socket_dir.join(kind.socket_name())
    }

    /// Create the configuration directory, owner-only on Unix.
    pub fn ensure_conf_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.conf_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.conf_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

/// Where gpg-agent publishes its endpoint.
///
/// - Windows: `%APPDATA%\gnupg\S.gpg-agent` (assuan port + nonce file)
/// - elsewhere: `~/.gnupg/S.gpg-agent`
fn default_assuan_socket(home: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return app_data.join("gnupg").join("S.gpg-agent");
        }
    }
    home.join(".gnupg").join("S.gpg-agent")
}
