//! Encrypted record framing for an established channel.
//!
//! Each record is a big-endian `u16` ciphertext length followed by an
//! AES-256-GCM ciphertext. Nonces are a per-direction counter, so records
//! cannot be replayed, dropped or reordered without failing authentication.
//! An empty plaintext is the close marker: the sender will write no more.

use std::io;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest plaintext carried by one record.
pub const MAX_RECORD_PLAINTEXT: usize = 16 * 1024;

const TAG_LEN: usize = 16;
const LEN_PREFIX: usize = 2;

/// A decrypted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data(Bytes),
    /// The peer half-closed its sending direction.
    Close,
}

/// One AES-256-GCM key plus its nonce counter.
struct DirectionalCipher {
    cipher: Aes256Gcm,
    counter: u64,
}

impl DirectionalCipher {
    fn new(key_bytes: [u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
            counter: 0,
        }
    }

    fn next_nonce(&mut self) -> io::Result<[u8; 12]> {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| invalid("record counter exhausted"))?;
        Ok(nonce)
    }
}

/// Seals outgoing and opens incoming records with independent keys.
pub struct RecordCodec {
    seal: DirectionalCipher,
    open: DirectionalCipher,
}

impl RecordCodec {
    pub fn new(seal_key: [u8; 32], open_key: [u8; 32]) -> Self {
        Self {
            seal: DirectionalCipher::new(seal_key),
            open: DirectionalCipher::new(open_key),
        }
    }

    fn seal_one(&mut self, plaintext: &[u8], dst: &mut BytesMut) -> io::Result<()> {
        let nonce = self.seal.next_nonce()?;
        let ct = self
            .seal
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| invalid("record encryption failed"))?;
        let len = u16::try_from(ct.len()).map_err(|_| invalid("record too large"))?;
        dst.reserve(LEN_PREFIX + ct.len());
        dst.put_u16(len);
        dst.extend_from_slice(&ct);
        Ok(())
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Record, dst: &mut BytesMut) -> io::Result<()> {
        match item {
            Record::Close => self.seal_one(&[], dst),
            Record::Data(data) => {
                // Empty data would read back as a close marker.
                for chunk in data.chunks(MAX_RECORD_PLAINTEXT) {
                    self.seal_one(chunk, dst)?;
                }
                Ok(())
            }
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Record>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if !(TAG_LEN..=MAX_RECORD_PLAINTEXT + TAG_LEN).contains(&len) {
            return Err(invalid("record length out of range"));
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let ct = src.split_to(len);
        let nonce = self.open.next_nonce()?;
        let plaintext = self
            .open
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ct.as_ref())
            .map_err(|_| invalid("record failed authentication"))?;

        if plaintext.is_empty() {
            Ok(Some(Record::Close))
        } else {
            Ok(Some(Record::Data(Bytes::from(plaintext))))
        }
    }
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
