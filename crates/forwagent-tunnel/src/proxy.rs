//! Bidirectional byte copying between two streams.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::channel::is_truncated;

/// Bytes moved in each direction by [`splice`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpliceStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Copy bytes both ways between `a` and `b` until both directions finish.
///
/// When one side reaches EOF the other side's write half is shut down and
/// the opposite direction keeps flowing. A peer hanging up mid-copy
/// (reset, broken pipe) ends the splice quietly. Any other I/O error,
/// including a secure channel cut off before its close record, is
/// returned and both streams are dropped.
pub async fn splice<A, B>(a: A, b: B) -> io::Result<SpliceStats>
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let forward = pump(&mut a_read, &mut b_write);
    let backward = pump(&mut b_read, &mut a_write);
    tokio::pin!(forward, backward);

    let mut stats = SpliceStats::default();
    let (mut forward_done, mut backward_done) = (false, false);

    while !(forward_done && backward_done) {
        let result = tokio::select! {
            r = &mut forward, if !forward_done => {
                forward_done = true;
                r.map(|n| stats.a_to_b = n)
            }
            r = &mut backward, if !backward_done => {
                backward_done = true;
                r.map(|n| stats.b_to_a = n)
            }
        };

        if let Err(e) = result {
            if is_disconnect(&e) {
                tracing::debug!(error = %e, "Peer hung up during splice");
                return Ok(stats);
            }
            return Err(e);
        }
    }

    Ok(stats)
}

async fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = tokio::io::copy(reader, writer).await?;
    writer.shutdown().await?;
    Ok(n)
}

fn is_disconnect(e: &io::Error) -> bool {
    if is_truncated(e) {
        return false;
    }
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt};
    use tokio_util::codec::Framed;

    use super::*;
    use crate::channel::codec::RecordCodec;
    use crate::channel::SecureStream;

    #[tokio::test]
    async fn copies_both_ways() {
        let (mut left, a) = duplex(1024);
        let (b, mut right) = duplex(1024);
        let task = tokio::spawn(splice(a, b));

        left.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        right.write_all(b"response!").await.unwrap();
        let mut buf = [0u8; 9];
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response!");

        left.shutdown().await.unwrap();
        right.shutdown().await.unwrap();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats, SpliceStats { a_to_b: 7, b_to_a: 9 });
    }

    #[tokio::test]
    async fn half_close_keeps_the_other_direction_open() {
        let (mut left, a) = duplex(1024);
        let (b, mut right) = duplex(1024);
        let task = tokio::spawn(splice(a, b));

        left.write_all(b"last words").await.unwrap();
        left.shutdown().await.unwrap();

        // The far side sees EOF after the data...
        let mut got = Vec::new();
        right.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"last words");

        // ...and can still answer.
        right.write_all(b"reply").await.unwrap();
        right.shutdown().await.unwrap();
        let mut reply = Vec::new();
        left.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"reply");

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.a_to_b, 10);
        assert_eq!(stats.b_to_a, 5);
    }

    #[test]
    fn plain_transport_errors_are_hang_ups() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn truncated_secure_stream_fails_the_splice() {
        let (_local, a) = duplex(1024);
        let (b, remote) = duplex(1024);
        let codec = RecordCodec::new([1u8; 32], [2u8; 32]);
        let secure = SecureStream::new(Framed::new(b, codec), Vec::new());
        let task = tokio::spawn(splice(a, secure));

        // The remote end vanishes without sending its close record.
        drop(remote);

        let err = task.await.unwrap().unwrap_err();
        assert!(is_truncated(&err));
        assert!(!is_disconnect(&err));
    }

    #[tokio::test]
    async fn dropped_peer_ends_the_splice() {
        let (left, a) = duplex(1024);
        let (b, right) = duplex(1024);
        let task = tokio::spawn(splice(a, b));

        drop(left);
        drop(right);
        assert!(task.await.unwrap().is_ok());
    }
}
