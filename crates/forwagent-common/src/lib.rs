//! Types shared by the forwagent client, server and tunnel crates.

pub mod errors;
pub mod logging;
pub mod session;

pub use errors::{
    remediation_hint, AuthError, ConfigError, ForwagentError, IdentityError, TunnelError,
};
pub use session::{PeerRole, SessionKind, MAX_TAG_LEN};

pub type Result<T> = std::result::Result<T, ForwagentError>;
