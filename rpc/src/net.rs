//! Socket transport: one multiplexed connection per client, framed with a
//! 4-byte length prefix.

use crate::client::{Client, ClientHandle, Connector};
use crate::endpoint::{Endpoint, Network};
use crate::error::{remote_error, shutdown_error, Error, ErrorKind};
use crate::message::{self, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

type Pending = DashMap<u64, oneshot::Sender<Response>>;

/// Dials TCP or unix-socket endpoints and wraps them in a [`NetClient`].
#[derive(Debug, Clone)]
pub struct NetConnector {
    dial_timeout: Duration,
    call_timeout: Duration,
}

impl NetConnector {
    pub fn new(dial_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            dial_timeout,
            call_timeout,
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<NetClient, Error> {
        match endpoint.network {
            Network::Tcp => {
                let stream = TcpStream::connect(&endpoint.address).await?;
                stream.set_nodelay(true)?;
                Ok(NetClient::spawn(stream, self.call_timeout))
            }
            #[cfg(unix)]
            Network::Unix => {
                let stream = tokio::net::UnixStream::connect(&endpoint.address).await?;
                Ok(NetClient::spawn(stream, self.call_timeout))
            }
            #[cfg(not(unix))]
            Network::Unix => Err(Error::new(
                ErrorKind::Dial,
                "unix sockets are not supported on this platform",
            )),
        }
    }
}

impl Default for NetConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(1))
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn dial(&self, endpoint: &Endpoint) -> Result<ClientHandle, Error> {
        match tokio::time::timeout(self.dial_timeout, self.connect(endpoint)).await {
            Ok(Ok(client)) => Ok(Arc::new(client)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::new(
                ErrorKind::Dial,
                &format!("dial {endpoint} timed out after {:?}", self.dial_timeout),
            )),
        }
    }
}

/// Client half of a framed connection.
///
/// A writer task drains outbound frames and a reader task routes responses to
/// the waiting caller by sequence number. Either task failing cancels the
/// connection; dropping the client does the same.
pub struct NetClient {
    seq: AtomicU64,
    pending: Arc<Pending>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: CancellationToken,
    call_timeout: Duration,
}

impl NetClient {
    pub fn spawn<S>(stream: S, call_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        let (outbound, queue) = mpsc::unbounded_channel();
        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        tokio::spawn(write_loop(writer, queue, shutdown.clone()));
        tokio::spawn(read_loop(reader, Arc::clone(&pending), shutdown.clone()));

        Self {
            seq: AtomicU64::new(1),
            pending,
            outbound,
            shutdown,
            call_timeout,
        }
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Client for NetClient {
    async fn call(&self, method: &str, args: Value) -> Result<Value, Error> {
        if self.shutdown.is_cancelled() {
            return Err(shutdown_error());
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let frame = message::encode(&Request {
            seq,
            method: method.to_string(),
            args,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        // The reader clears `pending` only after cancelling, so checking again
        // here guarantees nobody is left waiting on a dead connection.
        if self.shutdown.is_cancelled() || self.outbound.send(frame).is_err() {
            self.pending.remove(&seq);
            return Err(shutdown_error());
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => match response.error {
                Some(message) => Err(remote_error(&message)),
                None => Ok(response.reply),
            },
            Ok(Err(_)) => Err(shutdown_error()),
            Err(_) => {
                self.pending.remove(&seq);
                Err(Error::new(
                    ErrorKind::Timeout,
                    &format!("{method} timed out after {:?}", self.call_timeout),
                ))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn closed(&self) {
        self.shutdown.cancelled().await
    }
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, LengthDelimitedCodec>,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.send(frame).await {
                        warn!("Connection write failed: {e}");
                        break;
                    }
                }
                None => break,
            },
        }
    }
    shutdown.cancel();
}

async fn read_loop<R>(
    mut reader: FramedRead<R, LengthDelimitedCodec>,
    pending: Arc<Pending>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = reader.next() => match frame {
                Some(Ok(frame)) => match message::decode::<Response>(&frame) {
                    Ok(response) => {
                        if let Some((_, waiter)) = pending.remove(&response.seq) {
                            // The caller may have timed out already.
                            let _ = waiter.send(response);
                        }
                    }
                    Err(e) => warn!("Discarding malformed response frame: {e}"),
                },
                Some(Err(e)) => {
                    debug!("Connection read failed: {e}");
                    break;
                }
                None => {
                    debug!("Connection closed by peer");
                    break;
                }
            },
        }
    }
    shutdown.cancel();
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::service_fn;
    use crate::server::{serve, Service};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn start_server(service: Arc<dyn Service>) -> (Endpoint, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::tcp(listener.local_addr().unwrap().to_string());
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, service, shutdown.clone()));
        (endpoint, shutdown)
    }

    fn echo_service() -> Arc<dyn Service> {
        service_fn(|method, args| match method {
            "Test.Echo" => Ok(args),
            other => Err(format!("unknown method {other}")),
        })
    }

    struct SlowService;

    #[async_trait]
    impl Service for SlowService {
        async fn handle(&self, _method: &str, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_call_round_trips_over_tcp() {
        let (endpoint, shutdown) = start_server(echo_service()).await;
        let client = NetConnector::default().dial(&endpoint).await.unwrap();

        let reply = client
            .call("Test.Echo", json!({"userId": 42, "server": 5}))
            .await
            .unwrap();

        assert_eq!(reply, json!({"userId": 42, "server": 5}));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_remote_error_is_returned_to_caller() {
        let (endpoint, shutdown) = start_server(echo_service()).await;
        let client = NetConnector::default().dial(&endpoint).await.unwrap();

        let err = client.call("Test.Missing", Value::Null).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Remote("unknown method Test.Missing".to_string())
        );
        assert!(!client.is_closed());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_matched_by_seq() {
        let (endpoint, shutdown) = start_server(echo_service()).await;
        let client = NetConnector::default().dial(&endpoint).await.unwrap();

        let calls = (0..32).map(|n| {
            let client = Arc::clone(&client);
            async move { client.call("Test.Echo", json!(n)).await }
        });
        let replies = futures_util::future::join_all(calls).await;

        for (n, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.unwrap(), json!(n));
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let (endpoint, shutdown) = start_server(Arc::new(SlowService)).await;
        let connector = NetConnector::new(Duration::from_secs(1), Duration::from_millis(50));
        let client = connector.dial(&endpoint).await.unwrap();

        let err = client.call("Test.Slow", Value::Null).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Timeout);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_client_observes_server_shutdown() {
        let (endpoint, shutdown) = start_server(echo_service()).await;
        let client = NetConnector::default().dial(&endpoint).await.unwrap();
        assert!(client.call("Test.Echo", json!(1)).await.is_ok());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), client.closed())
            .await
            .expect("client should notice the closed connection");

        assert!(client.is_closed());
        let err = client.call("Test.Echo", json!(2)).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Shutdown);
    }

    #[tokio::test]
    async fn test_dial_refused_is_dial_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::tcp(listener.local_addr().unwrap().to_string());
        drop(listener);

        let err = NetConnector::default().dial(&endpoint).await.err().unwrap();

        assert_eq!(err.error_kind, ErrorKind::Dial);
    }
}
