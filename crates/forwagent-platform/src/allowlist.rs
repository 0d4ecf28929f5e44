//! Persisted sets of trusted peer keys (`clients.allowed`, `servers.allowed`).

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use forwagent_common::AuthError;

/// Trusted public keys, compared by exact byte equality.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    keys: HashSet<Vec<u8>>,
}

impl AllowList {
    /// Read an allowlist file: one base64 key per line.
    ///
    /// A missing file is an empty list, which rejects every peer.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content, path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(AuthError::AllowList {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse allowlist text. Blank lines and `#` comments are skipped;
    /// lines that are not valid base64 are logged and ignored.
    pub fn parse(content: &str, origin: &Path) -> Self {
        let mut keys = HashSet::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match B64.decode(line) {
                Ok(key) if !key.is_empty() => {
                    keys.insert(key);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        file = %origin.display(),
                        line = idx + 1,
                        error = %e,
                        "Ignoring malformed allowlist entry"
                    );
                }
            }
        }
        Self { keys }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
