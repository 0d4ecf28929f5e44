//! Mutual-authentication handshake.
//!
//! 1. initiator -> responder: magic || ephemeral P-256 point
//! 2. responder -> initiator: magic || ephemeral P-256 point
//! 3. both: transcript hash over the two points, ECDH, directional keys
//! 4. responder -> initiator (encrypted): static key || signature
//! 5. initiator verifies and authenticates the responder, then replies
//!    with its own static key || signature
//! 6. responder verifies and authenticates the initiator, then sends an
//!    accept record
//!
//! Signatures cover the transcript hash and a role label, binding each
//! long-term identity to this exchange's ephemeral keys.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use forwagent_common::TunnelError;
use forwagent_platform::{verify_signature, Authenticator, Identity};

use super::codec::{Record, RecordCodec};
use super::{ChannelState, Lifecycle};

const MAGIC: &[u8; 4] = b"FWA1";
const PROLOGUE: &[u8] = b"forwagent-handshake-v1";
const EPHEMERAL_LEN: usize = 65;
const MAX_HANDSHAKE_FRAME: usize = 256;
const INITIATOR_LABEL: &[u8] = b"forwagent initiator";
const RESPONDER_LABEL: &[u8] = b"forwagent responder";
const ACCEPT: u8 = 0x01;
const I2R_INFO: &[u8] = b"forwagent i2r";
const R2I_INFO: &[u8] = b"forwagent r2i";

/// Which side of the handshake we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Initiator,
    Responder,
}

/// Keys and transcript produced by the ephemeral exchange.
struct SessionKeys {
    transcript: [u8; 32],
    initiator_to_responder: [u8; 32],
    responder_to_initiator: [u8; 32],
}

impl SessionKeys {
    fn codec(&self, side: Side) -> RecordCodec {
        match side {
            Side::Initiator => {
                RecordCodec::new(self.initiator_to_responder, self.responder_to_initiator)
            }
            Side::Responder => {
                RecordCodec::new(self.responder_to_initiator, self.initiator_to_responder)
            }
        }
    }
}

/// Run the handshake as `side` and return the authenticated record stream
/// together with the peer's static public key.
pub(crate) async fn run<T>(
    mut io: T,
    side: Side,
    identity: &Identity,
    authenticator: &dyn Authenticator,
    lifecycle: &mut Lifecycle,
) -> Result<(Framed<T, RecordCodec>, Vec<u8>), TunnelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let keys = exchange_ephemeral(&mut io, side).await?;
    tracing::trace!(?side, "Ephemeral keys exchanged");
    let mut framed = Framed::new(io, keys.codec(side));

    let peer_key = match side {
        Side::Responder => {
            send_identity(&mut framed, identity, RESPONDER_LABEL, &keys.transcript).await?;
            let peer_key =
                recv_identity(&mut framed, INITIATOR_LABEL, &keys.transcript).await?;
            check_peer(authenticator, &peer_key)?;
            framed
                .send(Record::Data(Bytes::from_static(&[ACCEPT])))
                .await?;
            peer_key
        }
        Side::Initiator => {
            let peer_key =
                recv_identity(&mut framed, RESPONDER_LABEL, &keys.transcript).await?;
            check_peer(authenticator, &peer_key)?;
            send_identity(&mut framed, identity, INITIATOR_LABEL, &keys.transcript).await?;
            match framed.next().await {
                Some(Ok(Record::Data(data))) if data[..] == [ACCEPT] => {}
                Some(Ok(_)) => return Err(handshake("unexpected accept record")),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(handshake(
                        "server closed the connection; is our key in its clients.allowed?",
                    ))
                }
            }
            peer_key
        }
    };

    lifecycle.advance(ChannelState::Authenticated);
    Ok((framed, peer_key))
}

async fn exchange_ephemeral<T>(io: &mut T, side: Side) -> Result<SessionKeys, TunnelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let secret = EphemeralSecret::random(&mut rand::rngs::OsRng);
    let ours = secret.public_key().to_encoded_point(false);
    let mut hello = Vec::with_capacity(MAGIC.len() + EPHEMERAL_LEN);
    hello.extend_from_slice(MAGIC);
    hello.extend_from_slice(ours.as_bytes());

    let theirs = match side {
        Side::Initiator => {
            write_frame(io, &hello).await?;
            read_frame(io).await?
        }
        Side::Responder => {
            let theirs = read_frame(io).await?;
            write_frame(io, &hello).await?;
            theirs
        }
    };

    let peer_point = theirs
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| handshake("peer is not speaking the forwagent protocol"))?;
    let peer_public = PublicKey::from_sec1_bytes(peer_point)
        .map_err(|_| handshake("invalid ephemeral key"))?;
    let shared = secret.diffie_hellman(&peer_public);

    let (e_i, e_r) = match side {
        Side::Initiator => (ours.as_bytes(), peer_point),
        Side::Responder => (peer_point, ours.as_bytes()),
    };
    let transcript: [u8; 32] = Sha256::new()
        .chain_update(PROLOGUE)
        .chain_update(e_i)
        .chain_update(e_r)
        .finalize()
        .into();

    let hkdf = shared.extract::<Sha256>(Some(transcript.as_slice()));
    let mut keys = SessionKeys {
        transcript,
        initiator_to_responder: [0u8; 32],
        responder_to_initiator: [0u8; 32],
    };
    hkdf.expand(I2R_INFO, &mut keys.initiator_to_responder)
        .map_err(|_| handshake("key derivation failed"))?;
    hkdf.expand(R2I_INFO, &mut keys.responder_to_initiator)
        .map_err(|_| handshake("key derivation failed"))?;
    Ok(keys)
}

async fn send_identity<T>(
    framed: &mut Framed<T, RecordCodec>,
    identity: &Identity,
    label: &[u8],
    transcript: &[u8; 32],
) -> Result<(), TunnelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let public = identity.public_key();
    let signature = identity.sign(&signed_message(label, transcript));
    let mut record = Vec::with_capacity(1 + public.len() + signature.len());
    record.push(public.len() as u8);
    record.extend_from_slice(public);
    record.extend_from_slice(&signature);
    framed.send(Record::Data(Bytes::from(record))).await?;
    Ok(())
}

async fn recv_identity<T>(
    framed: &mut Framed<T, RecordCodec>,
    label: &[u8],
    transcript: &[u8; 32],
) -> Result<Vec<u8>, TunnelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let record = match framed.next().await {
        Some(Ok(Record::Data(data))) => data,
        Some(Ok(Record::Close)) => return Err(handshake("peer closed during handshake")),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(handshake("connection closed during handshake")),
    };

    let (&key_len, rest) = record
        .split_first()
        .ok_or_else(|| handshake("empty identity record"))?;
    let key_len = key_len as usize;
    if rest.len() <= key_len {
        return Err(handshake("truncated identity record"));
    }
    let (peer_key, signature) = rest.split_at(key_len);

    if !verify_signature(peer_key, &signed_message(label, transcript), signature) {
        return Err(handshake("peer signature does not verify"));
    }
    Ok(peer_key.to_vec())
}

/// Ask the authenticator about a verified peer key, printing the operator
/// remediation text if the key is not trusted.
fn check_peer(authenticator: &dyn Authenticator, peer_key: &[u8]) -> Result<(), TunnelError> {
    authenticator.authenticate(peer_key).map_err(|e| {
        if let Some(hint) = e.remediation() {
            println!("{hint}");
        }
        tracing::warn!(error = %e, "Peer rejected");
        TunnelError::from(e)
    })
}

fn signed_message(label: &[u8], transcript: &[u8; 32]) -> Vec<u8> {
    [label, transcript.as_slice()].concat()
}

async fn write_frame<T>(io: &mut T, body: &[u8]) -> Result<(), TunnelError>
where
    T: AsyncWrite + Unpin,
{
    io.write_u16(body.len() as u16).await?;
    io.write_all(body).await?;
    io.flush().await?;
    Ok(())
}

async fn read_frame<T>(io: &mut T) -> Result<Vec<u8>, TunnelError>
where
    T: AsyncRead + Unpin,
{
    let len = io.read_u16().await? as usize;
    if len > MAX_HANDSHAKE_FRAME {
        return Err(handshake("oversized handshake message"));
    }
    let mut body = vec![0u8; len];
    io.read_exact(&mut body).await?;
    Ok(body)
}

fn handshake(reason: &str) -> TunnelError {
    TunnelError::Handshake(reason.into())
}
