//! The duplex byte stream exposed once a channel is authenticated.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::Framed;

use super::codec::{Record, RecordCodec, MAX_RECORD_PLAINTEXT};
use super::ChannelState;

/// An authenticated, encrypted duplex stream over `T`.
///
/// Reads yield decrypted payload bytes; EOF is reported only after the
/// peer's authenticated close marker. A transport EOF without it is a
/// truncation, reported as an `UnexpectedEof` error. `shutdown` sends the
/// close marker and then half-closes the transport.
pub struct SecureStream<T> {
    framed: Framed<T, RecordCodec>,
    peer_key: Vec<u8>,
    pending: Bytes,
    read_closed: bool,
    close_sent: bool,
}

impl<T> SecureStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(framed: Framed<T, RecordCodec>, peer_key: Vec<u8>) -> Self {
        Self {
            framed,
            peer_key,
            pending: Bytes::new(),
            read_closed: false,
            close_sent: false,
        }
    }

    /// The authenticated static public key of the peer.
    pub fn peer_key(&self) -> &[u8] {
        &self.peer_key
    }

    pub fn state(&self) -> ChannelState {
        if self.read_closed && self.close_sent {
            ChannelState::Closed
        } else {
            ChannelState::Streaming
        }
    }

}

/// The transport ended without the peer's authenticated close record.
#[derive(Debug, thiserror::Error)]
#[error("secure channel ended without a close record")]
pub(crate) struct Truncated;

/// Whether `err` reports a [`SecureStream`] cut off before its close record.
pub(crate) fn is_truncated(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Truncated>())
}

impl<T> AsyncRead for SecureStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.read_closed {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.framed).poll_next(cx)) {
                Some(Ok(Record::Data(data))) => this.pending = data,
                Some(Ok(Record::Close)) => this.read_closed = true,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => {
                    this.read_closed = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        Truncated,
                    )));
                }
            }
        }
    }
}

impl<T> AsyncWrite for SecureStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.close_sent {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after shutdown",
            )));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(Sink::<Record>::poll_ready(Pin::new(&mut this.framed), cx))?;
        let n = buf.len().min(MAX_RECORD_PLAINTEXT);
        Sink::<Record>::start_send(
            Pin::new(&mut this.framed),
            Record::Data(Bytes::copy_from_slice(&buf[..n])),
        )?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Sink::<Record>::poll_flush(Pin::new(&mut self.get_mut().framed), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.close_sent {
            ready!(Sink::<Record>::poll_ready(Pin::new(&mut this.framed), cx))?;
            Sink::<Record>::start_send(Pin::new(&mut this.framed), Record::Close)?;
            this.close_sent = true;
        }
        Sink::<Record>::poll_close(Pin::new(&mut this.framed), cx)
    }
}
