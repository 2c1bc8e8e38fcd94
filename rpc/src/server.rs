//! Serving side of the framed protocol.

use crate::message::{self, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

/// Handles calls addressed to a remote service, e.g. `RouterRPC.Connect`.
///
/// An `Err` is sent back to the caller as the call's remote error message.
#[async_trait]
pub trait Service: Send + Sync {
    async fn handle(&self, method: &str, args: Value) -> Result<Value, String>;
}

/// Accept connections on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    service: Arc<dyn Service>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Serving RPC on {}", listener.local_addr()?);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                stream.set_nodelay(true)?;
                debug!("Accepted RPC connection from {peer}");
                tokio::spawn(serve_connection(stream, Arc::clone(&service), shutdown.child_token()));
            }
        }
    }
    Ok(())
}

/// Serve a single connection. Requests are handled concurrently; responses
/// are written back in completion order.
pub async fn serve_connection<S>(stream: S, service: Arc<dyn Service>, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
    let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
    let (replies, mut outbound) = mpsc::unbounded_channel::<Bytes>();

    let connection = shutdown.child_token();
    let writing = connection.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writing.cancelled() => break,
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = writer.send(frame).await {
                            debug!("RPC reply write failed: {e}");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        writing.cancel();
    });

    loop {
        tokio::select! {
            _ = connection.cancelled() => break,
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    let request = match message::decode::<Request>(&frame) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!("Dropping connection after malformed request frame: {e}");
                            break;
                        }
                    };
                    let service = Arc::clone(&service);
                    let replies = replies.clone();
                    tokio::spawn(async move {
                        let response = match service.handle(&request.method, request.args).await {
                            Ok(reply) => Response::ok(request.seq, reply),
                            Err(error) => Response::err(request.seq, error),
                        };
                        match message::encode(&response) {
                            Ok(frame) => {
                                let _ = replies.send(frame);
                            }
                            Err(e) => error!("Failed to encode reply to {}: {e}", request.method),
                        }
                    });
                }
                Some(Err(e)) => {
                    debug!("RPC connection read failed: {e}");
                    break;
                }
                None => break,
            },
        }
    }
    connection.cancel();
}
