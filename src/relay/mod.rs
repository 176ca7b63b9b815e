pub mod client;
pub mod connection;
pub mod messages;
pub mod monitor;
pub mod observer;
pub mod simulation;
pub mod ticker;
pub mod transport;

pub use client::{ClientSnapshot, SessionRelayClient, SIMULATION_TICK};
pub use connection::{ConnectionStatus, ReconnectDecision, RelayConnectionState};
pub use messages::{FeedbackSignal, InboundMessage, OutboundMessage, SystemCommand};
pub use observer::{LoggingObserver, NoopObserver, SessionObserver};
pub use transport::{
    ReadyState, RelayConnector, RelaySocket, SocketEvent, SocketEvents, WebSocketConnector,
    CLOSE_ABNORMAL, CLOSE_NORMAL,
};
