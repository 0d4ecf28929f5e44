//! The forwagent tunnel: authenticated, encrypted channels between a client
//! and a server, tagged with the agent they carry, and spliced onto local
//! agent sockets at both ends.
//!
//! Client side, one session per local connection:
//! local socket accept -> [`Connector::open`] (handshake + tag) -> [`splice`].
//!
//! Server side:
//! TCP accept -> [`SecureChannel::respond`] -> [`Dispatcher::dispatch`]
//! (read tag, pick bridge) -> [`AgentBridge::serve`] -> [`splice`].

pub mod bridge;
pub mod channel;
pub mod dispatcher;
pub mod listener;
pub mod proxy;
pub mod server;


pub use bridge::{AgentBridge, GpgBridge, SshBridge};
pub use channel::{ChannelState, SecureChannel, SecureStream};
pub use dispatcher::{read_session_tag, Dispatcher};
pub use listener::{handle_local, Connector};
#[cfg(unix)]
pub use listener::{serve_local, AgentSocket};
pub use proxy::{splice, SpliceStats};
pub use server::serve;
