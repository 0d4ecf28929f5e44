//! The server's accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use forwagent_common::TunnelError;

use crate::channel::SecureChannel;
use crate::dispatcher::Dispatcher;

/// Accept connections forever, running each session on its own task.
///
/// A failing session (bad handshake, unknown key, unknown tag, missing
/// agent) is logged and dropped; it never stops the loop or touches other
/// sessions.
pub async fn serve(listener: TcpListener, channel: SecureChannel, dispatcher: Arc<Dispatcher>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let channel = channel.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, addr, &channel, &dispatcher).await {
                        Ok(()) => tracing::debug!(peer = %addr, "Session closed"),
                        // Rejections were already reported by the handshake.
                        Err(TunnelError::Auth(_)) => {}
                        Err(e) => tracing::warn!(peer = %addr, error = %e, "Session failed"),
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    channel: &SecureChannel,
    dispatcher: &Dispatcher,
) -> Result<(), TunnelError> {
    stream.set_nodelay(true)?;
    tracing::debug!(peer = %addr, "Connection accepted");

    let secure = channel.respond(stream).await?;
    dispatcher.dispatch(secure, &addr.to_string()).await?;
    Ok(())
}
