//! Reconnecting WebSocket transport for the node control plane.
//!
//! Connection failures never surface as errors. The socket emits `Closed`,
//! waits a fixed delay, and dials again with the same arguments until
//! cancelled. Sends while disconnected are dropped; callers replay their
//! state when `Open` fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::SOCKET_EVENT_CAPACITY;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle and traffic notifications from the transport.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A connection is established.
    Open,
    /// One text frame from the node.
    Message(String),
    /// The connection dropped; a reconnect is scheduled.
    Closed,
}

pub struct ReconnectingSocket {
    events: broadcast::Sender<SocketEvent>,
    outgoing_tx: mpsc::UnboundedSender<String>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    connected: Arc<AtomicBool>,
    started: AtomicBool,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl ReconnectingSocket {
    pub fn new(reconnect_delay: Duration, cancel: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(SOCKET_EVENT_CAPACITY);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            events,
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            reconnect_delay,
            cancel,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Starts dialing `url` with the given handshake headers. The background
    /// task owns the connection for the life of the socket; repeated calls
    /// are no-ops.
    pub fn connect(&self, url: String, headers: Vec<(String, String)>) {
        if self.started.swap(true, Ordering::SeqCst) {
            log::debug!("[NodeSocket] Already connecting, ignoring connect()");
            return;
        }
        let Some(outgoing_rx) = self.outgoing_rx.lock().take() else {
            return;
        };
        tokio::spawn(run_loop(
            url,
            headers,
            outgoing_rx,
            self.events.clone(),
            Arc::clone(&self.connected),
            self.reconnect_delay,
            self.cancel.clone(),
        ));
    }

    /// Queues one text frame for delivery. A no-op while disconnected.
    pub fn send(&self, text: String) {
        if !self.connected.load(Ordering::SeqCst) {
            log::debug!("[NodeSocket] Not connected, dropping outgoing frame");
            return;
        }
        let _ = self.outgoing_tx.send(text);
    }
}

async fn run_loop(
    url: String,
    headers: Vec<(String, String)>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<SocketEvent>,
    connected: Arc<AtomicBool>,
    delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        log::info!("[NodeSocket] Connecting to {url}");
        match open_connection(&url, &headers).await {
            Ok(stream) => {
                // Frames queued while disconnected are stale; flush them
                // before Open handlers start replaying state.
                while outgoing.try_recv().is_ok() {}
                connected.store(true, Ordering::SeqCst);
                log::info!("[NodeSocket] Connected");
                let _ = events.send(SocketEvent::Open);
                drive(stream, &mut outgoing, &events, &cancel).await;
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(SocketEvent::Closed);
            }
            Err(e) => {
                log::warn!("[NodeSocket] Connection attempt failed: {e}");
            }
        }
        if cancel.is_cancelled() {
            log::info!("[NodeSocket] Shut down");
            return;
        }
        log::info!("[NodeSocket] Reconnecting in {delay:?}");
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("[NodeSocket] Shut down");
                return;
            }
            _ = sleep(delay) => {}
        }
    }
}

/// Runs one established connection until it closes, errors, or is cancelled.
async fn drive(
    stream: WsStream,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    events: &broadcast::Sender<SocketEvent>,
    cancel: &CancellationToken,
) {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            queued = outgoing.recv() => {
                let Some(text) = queued else { return };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    log::warn!("[NodeSocket] Send failed: {e}");
                    return;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("[NodeSocket] Read failed: {e}");
                    return;
                }
            }
        }
    }
}

async fn open_connection(
    url: &str,
    headers: &[(String, String)],
) -> Result<WsStream, ConnectError> {
    let mut request = url.into_client_request()?;
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConnectError::Header(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ConnectError::Header(name.clone()))?;
        request.headers_mut().insert(header_name, header_value);
    }
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

#[derive(Debug, Error)]
enum ConnectError {
    #[error(transparent)]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid handshake header '{0}'")]
    Header(String),
}
