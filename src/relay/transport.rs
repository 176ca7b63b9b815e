use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use url::Url;

use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "formcoach::transport";

pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        }
    }
}

/// Lifecycle and data events raised by a socket, delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Close { code: u16, reason: String },
    Error(String),
}

pub type SocketEvents = mpsc::UnboundedSender<SocketEvent>;

/// Handle to one relay connection.
pub trait RelaySocket: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queues a text frame. Fails unless the socket is open.
    fn send_text(&self, text: String) -> Result<()>;

    fn close(&self, code: u16, reason: &str);
}

/// Opens relay sockets. `open` returns immediately; the outcome arrives on
/// `events` as `Open` or `Error` followed by `Close`.
pub trait RelayConnector: Send + Sync {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Box<dyn RelaySocket>>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl RelayConnector for WebSocketConnector {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Box<dyn RelaySocket>> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid relay URL {url}"))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            bail!("Relay URL must use ws:// or wss://, got {url}");
        }

        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(
            parsed.to_string(),
            state.clone(),
            outgoing_rx,
            events,
        ));

        Ok(Box::new(WebSocketHandle {
            state,
            outgoing: outgoing_tx,
        }))
    }
}

struct WebSocketHandle {
    state: Arc<AtomicU8>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl RelaySocket for WebSocketHandle {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: String) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            bail!("socket is {}", state.as_str());
        }
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| anyhow!("socket task has exited"))
    }

    fn close(&self, code: u16, reason: &str) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.state
            .store(ReadyState::Closing as u8, Ordering::SeqCst);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        let _ = self.outgoing.send(Message::Close(Some(frame)));
    }
}

async fn run_socket(
    url: String,
    state: Arc<AtomicU8>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: SocketEvents,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            log_warn!("WebSocket connect to {} failed: {}", url, err);
            state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            let _ = events.send(SocketEvent::Error(err.to_string()));
            let _ = events.send(SocketEvent::Close {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            });
            return;
        }
    };

    // close() may have run while the handshake was in flight.
    let _ = state.compare_exchange(
        ReadyState::Connecting as u8,
        ReadyState::Open as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
    log_debug!("WebSocket open: {}", url);
    let _ = events.send(SocketEvent::Open);

    let (mut sink, mut source) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            outbound = outgoing.recv() => match outbound {
                Some(message) => {
                    if let Err(err) = sink.send(message).await {
                        let _ = events.send(SocketEvent::Error(err.to_string()));
                        break (CLOSE_ABNORMAL, err.to_string());
                    }
                }
                None => {
                    // Handle dropped without an explicit close.
                    let _ = sink.send(Message::Close(None)).await;
                    break (CLOSE_NORMAL, String::new());
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = events.send(SocketEvent::Error(err.to_string()));
                    break (CLOSE_ABNORMAL, err.to_string());
                }
                None => break (CLOSE_ABNORMAL, String::new()),
            }
        }
    };

    state.store(ReadyState::Closed as u8, Ordering::SeqCst);
    log_debug!("WebSocket closed: {} ({})", code, reason);
    let _ = events.send(SocketEvent::Close { code, reason });
}
