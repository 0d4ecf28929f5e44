//! Mutually authenticated, encrypted channels over any byte stream.

pub mod codec;
mod handshake;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use forwagent_common::TunnelError;
use forwagent_platform::{Authenticator, Identity};

use handshake::Side;
pub(crate) use stream::is_truncated;
pub use stream::SecureStream;

/// Lifecycle of a channel: `Idle -> Handshaking -> Authenticated ->
/// Streaming -> Closed`. A failed handshake goes straight to `Closed`.
/// `SecureChannel` logs the steps up to `Streaming`; a returned
/// [`SecureStream`] reports the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Handshaking,
    Authenticated,
    Streaming,
    Closed,
}

/// The state of one channel while it is being established.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    side: Side,
    state: ChannelState,
    #[cfg(test)]
    trail: Vec<ChannelState>,
}

impl Lifecycle {
    fn new(side: Side) -> Self {
        Self {
            side,
            state: ChannelState::Idle,
            #[cfg(test)]
            trail: vec![ChannelState::Idle],
        }
    }

    pub(crate) fn advance(&mut self, next: ChannelState) {
        tracing::debug!(side = ?self.side, from = ?self.state, to = ?next, "Channel state");
        self.state = next;
        #[cfg(test)]
        self.trail.push(next);
    }
}

/// Our identity plus the policy applied to peers, shared by every session
/// opened or accepted by one process.
#[derive(Clone)]
pub struct SecureChannel {
    identity: Arc<Identity>,
    authenticator: Arc<dyn Authenticator>,
    timeout: Duration,
}

impl SecureChannel {
    pub fn new(
        identity: Arc<Identity>,
        authenticator: Arc<dyn Authenticator>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            authenticator,
            timeout,
        }
    }

    /// Run the handshake as the connecting side (the client).
    pub async fn initiate<T>(&self, io: T) -> Result<SecureStream<T>, TunnelError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.establish(io, Side::Initiator).await
    }

    /// Run the handshake as the accepting side (the server).
    pub async fn respond<T>(&self, io: T) -> Result<SecureStream<T>, TunnelError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.establish(io, Side::Responder).await
    }

    async fn establish<T>(&self, io: T, side: Side) -> Result<SecureStream<T>, TunnelError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.establish_tracked(io, &mut Lifecycle::new(side)).await
    }

    async fn establish_tracked<T>(
        &self,
        io: T,
        lifecycle: &mut Lifecycle,
    ) -> Result<SecureStream<T>, TunnelError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        lifecycle.advance(ChannelState::Handshaking);
        let side = lifecycle.side;
        let handshake = handshake::run(
            io,
            side,
            &self.identity,
            self.authenticator.as_ref(),
            lifecycle,
        );
        let result = match tokio::time::timeout(self.timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(TunnelError::HandshakeTimeout),
        };

        match result {
            Ok((framed, peer_key)) => {
                lifecycle.advance(ChannelState::Streaming);
                Ok(SecureStream::new(framed, peer_key))
            }
            Err(e) => {
                lifecycle.advance(ChannelState::Closed);
                Err(e)
            }
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use forwagent_common::{AuthError, PeerRole};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Trusts exactly one key.
    struct Pinned(Vec<u8>);

    impl Authenticator for Pinned {
        fn authenticate(&self, peer_key: &[u8]) -> Result<(), AuthError> {
            if peer_key == self.0.as_slice() {
                Ok(())
            } else {
                Err(AuthError::UnknownKey {
                    role: PeerRole::Client,
                    key: peer_key.to_vec(),
                    allow_file: PathBuf::from("clients.allowed"),
                })
            }
        }
    }

    fn channel(identity: &Arc<Identity>, trusts: &Identity) -> SecureChannel {
        SecureChannel::new(
            identity.clone(),
            Arc::new(Pinned(trusts.public_key().to_vec())),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn handshake_authenticates_both_sides() {
        let client_id = Arc::new(Identity::generate());
        let server_id = Arc::new(Identity::generate());
        let client = channel(&client_id, &server_id);
        let server = channel(&server_id, &client_id);

        let (a, b) = duplex(64 * 1024);
        let (client_stream, server_stream) = tokio::join!(client.initiate(a), server.respond(b));
        let mut client_stream = client_stream.unwrap();
        let mut server_stream = server_stream.unwrap();

        assert_eq!(client_stream.peer_key(), server_id.public_key());
        assert_eq!(server_stream.peer_key(), client_id.public_key());
        assert_eq!(client_stream.state(), ChannelState::Streaming);

        client_stream.write_all(b"ping").await.unwrap();
        client_stream.shutdown().await.unwrap();
        let mut received = Vec::new();
        server_stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping");

        server_stream.write_all(b"pong").await.unwrap();
        server_stream.shutdown().await.unwrap();
        assert_eq!(server_stream.state(), ChannelState::Closed);
        let mut received = Vec::new();
        client_stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"pong");
        assert_eq!(client_stream.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn unknown_client_is_rejected_before_streaming() {
        let client_id = Arc::new(Identity::generate());
        let server_id = Arc::new(Identity::generate());
        let stranger = Identity::generate();
        let client = channel(&client_id, &server_id);
        let server = channel(&server_id, &stranger);

        let (a, b) = duplex(64 * 1024);
        let (client_result, server_result) = tokio::join!(
            client.initiate(a),
            async move { server.respond(b).await.map(|_| ()) }
        );

        assert!(matches!(
            server_result,
            Err(TunnelError::Auth(AuthError::UnknownKey { .. }))
        ));
        assert!(client_result.is_err());
    }

    #[tokio::test]
    async fn unknown_server_is_rejected_by_client() {
        let client_id = Arc::new(Identity::generate());
        let server_id = Arc::new(Identity::generate());
        let stranger = Identity::generate();
        let client = channel(&client_id, &stranger);
        let server = channel(&server_id, &client_id);

        let (a, b) = duplex(64 * 1024);
        let (client_result, server_result) = tokio::join!(
            async move { client.initiate(a).await.map(|_| ()) },
            server.respond(b)
        );

        assert!(matches!(
            client_result,
            Err(TunnelError::Auth(AuthError::UnknownKey { .. }))
        ));
        assert!(server_result.is_err());
    }

    #[tokio::test]
    async fn lifecycle_passes_through_every_state() {
        let client_id = Arc::new(Identity::generate());
        let server_id = Arc::new(Identity::generate());
        let client = channel(&client_id, &server_id);
        let server = channel(&server_id, &client_id);

        let (a, b) = duplex(64 * 1024);
        let mut client_life = Lifecycle::new(Side::Initiator);
        let mut server_life = Lifecycle::new(Side::Responder);
        let (client_stream, server_stream) = tokio::join!(
            client.establish_tracked(a, &mut client_life),
            server.establish_tracked(b, &mut server_life)
        );
        assert!(client_stream.is_ok());
        assert!(server_stream.is_ok());

        let expected = [
            ChannelState::Idle,
            ChannelState::Handshaking,
            ChannelState::Authenticated,
            ChannelState::Streaming,
        ];
        assert_eq!(client_life.trail, expected);
        assert_eq!(server_life.trail, expected);
    }

    #[tokio::test]
    async fn rejected_handshake_closes_without_authenticating() {
        let client_id = Arc::new(Identity::generate());
        let server_id = Arc::new(Identity::generate());
        let stranger = Identity::generate();
        let client = channel(&client_id, &server_id);
        let server = channel(&server_id, &stranger);

        let (a, b) = duplex(64 * 1024);
        let mut client_life = Lifecycle::new(Side::Initiator);
        let mut server_life = Lifecycle::new(Side::Responder);
        let (client_result, server_result) = tokio::join!(
            async { client.establish_tracked(a, &mut client_life).await.map(|_| ()) },
            async { server.establish_tracked(b, &mut server_life).await.map(|_| ()) }
        );
        assert!(client_result.is_err());
        assert!(server_result.is_err());

        let expected = [
            ChannelState::Idle,
            ChannelState::Handshaking,
            ChannelState::Closed,
        ];
        assert_eq!(client_life.trail, expected);
        assert_eq!(server_life.trail, expected);
    }

    #[tokio::test]
    async fn timed_out_handshake_ends_closed() {
        let server_id = Arc::new(Identity::generate());
        let server = SecureChannel::new(
            server_id,
            Arc::new(Pinned(Vec::new())),
            Duration::from_millis(50),
        );

        let (_a, b) = duplex(1024);
        let mut life = Lifecycle::new(Side::Responder);
        assert!(server.establish_tracked(b, &mut life).await.is_err());
        assert_eq!(life.state, ChannelState::Closed);
        assert!(!life.trail.contains(&ChannelState::Authenticated));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let server_id = Arc::new(Identity::generate());
        let server = SecureChannel::new(
            server_id.clone(),
            Arc::new(Pinned(Vec::new())),
            Duration::from_millis(50),
        );

        let (_a, b) = duplex(1024);
        let err = server.respond(b).await.err().unwrap();
        assert!(matches!(err, TunnelError::HandshakeTimeout));
    }

    #[tokio::test]
    async fn garbage_hello_is_a_handshake_error() {
        let server_id = Arc::new(Identity::generate());
        let server = channel(&server_id, &server_id);

        let (mut a, b) = duplex(1024);
        a.write_all(&[0, 4, b'H', b'T', b'T', b'P']).await.unwrap();
        let err = server.respond(b).await.err().unwrap();
        assert!(matches!(err, TunnelError::Handshake(_)));
    }
}
