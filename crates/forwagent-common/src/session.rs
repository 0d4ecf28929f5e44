//! Session kinds carried on the wire and the two tunnel roles.

use std::fmt;

/// Upper bound on the session tag read performed by the server.
pub const MAX_TAG_LEN: usize = 16;

/// Which downstream agent a tunneled session is for.
///
/// Sent as the very first plaintext bytes on an established channel, as a
/// bare ASCII token with no length prefix and no terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Ssh,
    Gpg,
}

impl SessionKind {
    pub const ALL: [SessionKind; 2] = [SessionKind::Gpg, SessionKind::Ssh];

    /// The wire token for this kind.
    pub fn tag(self) -> &'static [u8] {
        match self {
            SessionKind::Ssh => b"SSH",
            SessionKind::Gpg => b"GPG",
        }
    }

    /// Match a received token case-sensitively. Anything else is `None`.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"SSH" => Some(SessionKind::Ssh),
            b"GPG" => Some(SessionKind::Gpg),
            _ => None,
        }
    }

    /// File name of the client-side local socket that carries this kind.
    pub fn socket_name(self) -> &'static str {
        match self {
            SessionKind::Ssh => "S.gpg-agent.ssh",
            SessionKind::Gpg => "S.gpg-agent",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Ssh => f.write_str("SSH"),
            SessionKind::Gpg => f.write_str("GPG"),
        }
    }
}

/// The two ends of a tunnel. Each role owns one identity key pair and
/// trusts peers of the opposite role through an allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    Client,
    Server,
}

impl PeerRole {
    /// Stem used for this role's key pair files (`client.priv`, ...).
    pub fn name(self) -> &'static str {
        match self {
            PeerRole::Client => "client",
            PeerRole::Server => "server",
        }
    }

    /// File listing the trusted keys of peers holding this role.
    pub fn allow_file_name(self) -> &'static str {
        match self {
            PeerRole::Client => "clients.allowed",
            PeerRole::Server => "servers.allowed",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_case_sensitively() {
        assert_eq!(SessionKind::from_tag(b"SSH"), Some(SessionKind::Ssh));
        assert_eq!(SessionKind::from_tag(b"GPG"), Some(SessionKind::Gpg));
        assert_eq!(SessionKind::from_tag(b"ssh"), None);
        assert_eq!(SessionKind::from_tag(b"FOO"), None);
        assert_eq!(SessionKind::from_tag(b"SSH\n"), None);
        assert_eq!(SessionKind::from_tag(b""), None);
    }

    #[test]
    fn tag_round_trips_for_every_kind() {
        for kind in SessionKind::ALL {
            assert_eq!(SessionKind::from_tag(kind.tag()), Some(kind));
            assert!(kind.tag().len() <= MAX_TAG_LEN);
        }
    }

    #[test]
    fn roles_name_their_files() {
        assert_eq!(PeerRole::Client.allow_file_name(), "clients.allowed");
        assert_eq!(PeerRole::Server.name(), "server");
    }
}
