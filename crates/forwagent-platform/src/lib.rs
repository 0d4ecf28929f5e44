//! Host-side collaborators of the tunnel: identity keys, peer allowlists,
//! authentication policies, and the local agents the server forwards to.

pub mod agent;
pub mod allowlist;
pub mod assuan;
pub mod auth;
pub mod identity;
pub mod launcher;

pub use agent::{AgentIo, AgentStream, SshAgentSocket};
pub use allowlist::AllowList;
pub use assuan::{AssuanBootstrap, AssuanEndpoint};
pub use auth::{AllowListAuthenticator, Authenticator, TrustOnFirstUse};
pub use identity::{verify_signature, Identity, PUBLIC_KEY_LEN, SIGNATURE_LEN};
pub use launcher::{AgentLauncher, CommandLauncher, NoLauncher};
