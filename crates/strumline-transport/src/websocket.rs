//! WebSocket transport over `tokio-tungstenite`.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{Connection, ConnectionId, Transport, TransportError, parse_forwarded_for};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type Socket = WebSocketStream<TcpStream>;

/// Listens for WebSocket clients on a TCP address.
pub struct WebSocketTransport {
    listener: TcpListener,
    trust_forwarded_for: bool,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "listening for WebSocket clients");
        Ok(Self {
            listener,
            trust_forwarded_for: false,
        })
    }

    /// Use the left-most `X-Forwarded-For` entry as the client address.
    ///
    /// Only enable this behind a reverse proxy that overwrites the header.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The address a connection is charged to.
    fn client_ip(&self, peer: SocketAddr, forwarded: Option<&str>) -> IpAddr {
        forwarded
            .filter(|_| self.trust_forwarded_for)
            .and_then(parse_forwarded_for)
            .unwrap_or_else(|| peer.ip())
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;

        let mut forwarded = None;
        let socket = tokio_tungstenite::accept_hdr_async(
            tcp,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                forwarded = req
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                Ok(resp)
            },
        )
        .await
        .map_err(|e| TransportError::Upgrade(e.to_string()))?;

        let client_ip = self.client_ip(peer, forwarded.as_deref());
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, %client_ip, "client upgraded");

        let (sink, stream) = socket.split();
        Ok(WebSocketConnection {
            id,
            client_ip,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// One upgraded client socket.
///
/// The socket is split so a task parked in [`recv`](Connection::recv)
/// never holds up outbound frames.
pub struct WebSocketConnection {
    id: ConnectionId,
    client_ip: IpAddr,
    sink: Mutex<SplitSink<Socket, Message>>,
    stream: Mutex<SplitStream<Socket>>,
}

impl WebSocketConnection {
    async fn write(&self, message: Message) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.write(Message::Binary(data.to_vec().into())).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        while let Some(frame) = stream.next().await {
            match frame.map_err(|e| TransportError::Receive(e.to_string()))? {
                Message::Binary(data) => return Ok(Some(data.into())),
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Close(_) => return Ok(None),
                // control frames
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Closed(e.to_string()))
    }

    async fn close_with(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.write(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn client_ip(&self) -> IpAddr {
        self.client_ip
    }
}
