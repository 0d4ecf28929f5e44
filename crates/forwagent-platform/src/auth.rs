//! Peer authentication policies.
//!
//! The secure channel hands every peer's static public key to an
//! [`Authenticator`] once the peer has proven possession of it. Policies
//! read the allowlist from disk on every decision, so an operator who
//! appends a key sees it take effect on the next connection.

use std::path::PathBuf;

use forwagent_common::{remediation_hint, AuthError, PeerRole};
use forwagent_config::RuntimePaths;

use crate::allowlist::AllowList;

/// Decides whether a peer's static public key is trusted.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, peer_key: &[u8]) -> Result<(), AuthError>;
}

/// Accept exactly the keys listed in the allowlist for the peer's role.
#[derive(Debug, Clone)]
pub struct AllowListAuthenticator {
    peer_role: PeerRole,
    allow_file: PathBuf,
}

impl AllowListAuthenticator {
    /// Trust peers of `peer_role` listed in its allowlist under `paths`.
    pub fn new(paths: &RuntimePaths, peer_role: PeerRole) -> Self {
        Self {
            peer_role,
            allow_file: paths.allow_file(peer_role),
        }
    }

    fn load(&self) -> Result<AllowList, AuthError> {
        AllowList::load(&self.allow_file)
    }

    fn check(&self, list: &AllowList, peer_key: &[u8]) -> Result<(), AuthError> {
        if peer_key.is_empty() {
            return Err(AuthError::EmptyKey);
        }
        if list.contains(peer_key) {
            return Ok(());
        }
        Err(AuthError::UnknownKey {
            role: self.peer_role,
            key: peer_key.to_vec(),
            allow_file: self.allow_file.clone(),
        })
    }
}

impl Authenticator for AllowListAuthenticator {
    fn authenticate(&self, peer_key: &[u8]) -> Result<(), AuthError> {
        let list = self.load()?;
        self.check(&list, peer_key)
    }
}

/// Bootstrap mode for a fresh server: while no client is configured, any
/// peer is let in and its key printed so the operator can pin it. Once the
/// allowlist has an entry this behaves exactly like the strict policy.
#[derive(Debug, Clone)]
pub struct TrustOnFirstUse {
    strict: AllowListAuthenticator,
}

impl TrustOnFirstUse {
    pub fn new(paths: &RuntimePaths, peer_role: PeerRole) -> Self {
        Self {
            strict: AllowListAuthenticator::new(paths, peer_role),
        }
    }
}

impl Authenticator for TrustOnFirstUse {
    fn authenticate(&self, peer_key: &[u8]) -> Result<(), AuthError> {
        let list = self.strict.load()?;
        if !list.is_empty() {
            return self.strict.check(&list, peer_key);
        }

        if peer_key.is_empty() {
            tracing::warn!("Accepting anonymous peer: allowlist is empty (trust on first use)");
        } else {
            tracing::warn!(
                role = %self.strict.peer_role,
                "Accepting unlisted peer: allowlist is empty (trust on first use)"
            );
            println!("Trust on first use: accepting peer while the allowlist is empty.");
            println!(
                "{}",
                remediation_hint(self.strict.peer_role, peer_key, &self.strict.allow_file)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine;

    use super::*;

    fn write_allowed(paths: &RuntimePaths, role: PeerRole, keys: &[&[u8]]) {
        paths.ensure_conf_dir().unwrap();
        let content: String = keys.iter().map(|k| format!("{}\n", B64.encode(k))).collect();
        std::fs::write(paths.allow_file(role), content).unwrap();
    }

    #[test]
    fn listed_key_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        write_allowed(&paths, PeerRole::Client, &[&[1u8; 33]]);

        let auth = AllowListAuthenticator::new(&paths, PeerRole::Client);
        assert!(auth.authenticate(&[1u8; 33]).is_ok());
    }

    #[test]
    fn unlisted_key_is_rejected_with_hint() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        write_allowed(&paths, PeerRole::Client, &[&[1u8; 33]]);

        let auth = AllowListAuthenticator::new(&paths, PeerRole::Client);
        let err = auth.authenticate(&[2u8; 33]).unwrap_err();
        let hint = err.remediation().unwrap();
        assert!(hint.contains(&B64.encode([2u8; 33])));
        assert!(hint.contains("clients.allowed"));
    }

    #[test]
    fn single_byte_difference_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let allowed = [5u8; 33];
        write_allowed(&paths, PeerRole::Server, &[&allowed]);

        let mut presented = allowed;
        presented[0] ^= 0x80;
        let auth = AllowListAuthenticator::new(&paths, PeerRole::Server);
        assert!(matches!(
            auth.authenticate(&presented),
            Err(AuthError::UnknownKey { .. })
        ));
    }

    #[test]
    fn empty_allowlist_rejects_everyone() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let auth = AllowListAuthenticator::new(&paths, PeerRole::Server);
        assert!(auth.authenticate(&[1u8; 33]).is_err());
    }

    #[test]
    fn strict_policy_rejects_empty_key() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let auth = AllowListAuthenticator::new(&paths, PeerRole::Client);
        assert!(matches!(auth.authenticate(&[]), Err(AuthError::EmptyKey)));
    }

    #[test]
    fn allowlist_edits_apply_to_next_decision() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let auth = AllowListAuthenticator::new(&paths, PeerRole::Client);
        assert!(auth.authenticate(&[8u8; 33]).is_err());

        write_allowed(&paths, PeerRole::Client, &[&[8u8; 33]]);
        assert!(auth.authenticate(&[8u8; 33]).is_ok());
    }

    #[test]
    fn first_use_accepts_while_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        let auth = TrustOnFirstUse::new(&paths, PeerRole::Client);
        assert!(auth.authenticate(&[3u8; 33]).is_ok());
        assert!(auth.authenticate(&[]).is_ok());
    }

    #[test]
    fn first_use_turns_strict_once_configured() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::rooted(tmp.path());
        write_allowed(&paths, PeerRole::Client, &[&[3u8; 33]]);

        let auth = TrustOnFirstUse::new(&paths, PeerRole::Client);
        assert!(auth.authenticate(&[3u8; 33]).is_ok());
        assert!(auth.authenticate(&[4u8; 33]).is_err());
        assert!(matches!(auth.authenticate(&[]), Err(AuthError::EmptyKey)));
    }
}
