use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use forwagent_common::{IdentityError, PeerRole};
use forwagent_config::RuntimePaths;

/// Length of a public key on the wire and on disk: compressed SEC1 P-256.
pub const PUBLIC_KEY_LEN: usize = 33;
/// Length of a fixed-size (r || s) ECDSA P-256 signature.
pub const SIGNATURE_LEN: usize = 64;
const PRIVATE_KEY_LEN: usize = 32;

/// A static key pair identifying one end of the tunnel.
///
/// The private scalar never leaves this type except to be written to the
/// owner-only `<role>.priv` file; `Debug` shows the public half only.
pub struct Identity {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Identity {
    /// Load `<role>.priv` / `<role>.pub` from the configuration directory,
    /// or generate and save a new pair when no private key exists yet.
    ///
    /// An unreadable or unparsable private key is an error, never a reason
    /// to silently mint a new identity.
    pub fn load_or_create(paths: &RuntimePaths, role: PeerRole) -> Result<Self, IdentityError> {
        let priv_path = paths.private_key_file(role);
        let pub_path = paths.public_key_file(role);

        match std::fs::read(&priv_path) {
            Ok(bytes) => {
                let identity = Self::from_private_bytes(&bytes).map_err(|reason| {
                    IdentityError::Corrupt {
                        path: priv_path.clone(),
                        reason,
                    }
                })?;
                identity.check_public_file(&pub_path)?;
                Ok(identity)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(role = %role, "No {role} key pair found, generating one");
                let identity = Self::generate();
                paths.ensure_conf_dir().map_err(|source| IdentityError::Io {
                    path: paths.conf_dir.clone(),
                    source,
                })?;
                identity.save(&priv_path, &pub_path)?;
                Ok(identity)
            }
            Err(source) => Err(IdentityError::Io {
                path: priv_path,
                source,
            }),
        }
    }

    /// A fresh random identity.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Rebuild an identity from its raw 32-byte private scalar.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(format!(
                "expected {PRIVATE_KEY_LEN} bytes, found {}",
                bytes.len()
            ));
        }
        let signing_key = SigningKey::from_slice(bytes).map_err(|e| e.to_string())?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Compressed SEC1 public key; the form stored in allowlists.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn public_key_base64(&self) -> String {
        B64.encode(&self.public_key)
    }

    /// First 8 bytes of SHA-256(public key), colon-separated hex.
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(&self.public_key);
        let hex_parts: Vec<String> = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
        hex_parts.join(":")
    }

    /// ECDSA-P256-SHA256 signature over `message`, as fixed-size r || s.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let sig: Signature = self.signing_key.sign(message);
        sig.to_bytes().to_vec()
    }
}

/// Check a fixed-size signature made by [`Identity::sign`] against a
/// compressed SEC1 public key. Malformed keys or signatures verify as false.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &sig).is_ok()
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl Identity {
    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Self {
            signing_key,
            public_key,
        }
    }

    fn check_public_file(&self, pub_path: &Path) -> Result<(), IdentityError> {
        match std::fs::read(pub_path) {
            Ok(stored) if stored == self.public_key => Ok(()),
            Ok(_) => Err(IdentityError::Mismatch {
                path: pub_path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %pub_path.display(), "Restoring missing public key file");
                write_key_file(pub_path, &self.public_key)
            }
            Err(source) => Err(IdentityError::Io {
                path: pub_path.to_path_buf(),
                source,
            }),
        }
    }

    fn save(&self, priv_path: &Path, pub_path: &Path) -> Result<(), IdentityError> {
        write_key_file(priv_path, &self.signing_key.to_bytes())?;
        write_key_file(pub_path, &self.public_key)
    }
}

/// Write raw key bytes, readable by the owner only on Unix.
fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    let io_err = |source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    };

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true).mode(0o600);
        let mut f = opts.open(path).map_err(io_err)?;
        f.write_all(bytes).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, bytes).map_err(io_err)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_sign_verify() {
        let identity = Identity::generate();
        let sig = identity.sign(b"test data");
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify_signature(identity.public_key(), b"test data", &sig));
    }

    #[test]
    fn verify_wrong_data_fails() {
        let identity = Identity::generate();
        let sig = identity.sign(b"correct data");
        assert!(!verify_signature(identity.public_key(), b"wrong data", &sig));
    }

    #[test]
    fn verify_with_other_key_fails() {
        let signer = Identity::generate();
        let other = Identity::generate();
        let sig = signer.sign(b"data");
        assert!(!verify_signature(other.public_key(), b"data", &sig));
    }

    #[test]
    fn verify_rejects_garbage() {
        let identity = Identity::generate();
        assert!(!verify_signature(&[0u8; 5], b"data", &identity.sign(b"data")));
        assert!(!verify_signature(identity.public_key(), b"data", &[0u8; 3]));
    }

    #[test]
    fn public_key_is_compressed_sec1() {
        let identity = Identity::generate();
        assert_eq!(identity.public_key().len(), PUBLIC_KEY_LEN);
        assert!(matches!(identity.public_key()[0], 0x02 | 0x03));
    }

    #[test]
    fn create_then_reload_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());

        let first = Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        assert!(paths.private_key_file(PeerRole::Client).exists());
        assert_eq!(
            std::fs::read(paths.public_key_file(PeerRole::Client)).unwrap(),
            first.public_key()
        );

        let second = Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.fingerprint(), second.fingerprint());

        let sig = first.sign(b"persist test");
        assert!(verify_signature(second.public_key(), b"persist test", &sig));
    }

    #[test]
    fn roles_get_distinct_identities() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let client = Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        let server = Identity::load_or_create(&paths, PeerRole::Server).unwrap();
        assert_ne!(client.public_key(), server.public_key());
    }

    #[test]
    fn corrupt_private_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        paths.ensure_conf_dir().unwrap();
        std::fs::write(paths.private_key_file(PeerRole::Server), b"not a key").unwrap();

        let err = Identity::load_or_create(&paths, PeerRole::Server).unwrap_err();
        assert!(matches!(err, IdentityError::Corrupt { .. }));
        assert!(err.to_string().contains("server.priv"));
    }

    #[test]
    fn mismatched_public_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        std::fs::write(
            paths.public_key_file(PeerRole::Client),
            Identity::generate().public_key(),
        )
        .unwrap();

        let err = Identity::load_or_create(&paths, PeerRole::Client).unwrap_err();
        assert!(matches!(err, IdentityError::Mismatch { .. }));
    }

    #[test]
    fn missing_public_key_is_restored() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let first = Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        std::fs::remove_file(paths.public_key_file(PeerRole::Client)).unwrap();

        let second = Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert!(paths.public_key_file(PeerRole::Client).exists());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        Identity::load_or_create(&paths, PeerRole::Client).unwrap();
        let mode = std::fs::metadata(paths.private_key_file(PeerRole::Client))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_output_hides_private_key() {
        let identity = Identity::generate();
        let debug = format!("{identity:?}");
        assert!(debug.contains(&identity.public_key_base64()));
        assert!(!debug.contains("signing_key"));
    }

    #[test]
    fn fingerprint_format() {
        let identity = Identity::generate();
        let fingerprint = identity.fingerprint();
        let parts: Vec<&str> = fingerprint.split(':').collect();
        assert_eq!(parts.len(), 8);
        for part in &parts {
            assert_eq!(part.len(), 2);
            assert!(part.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
