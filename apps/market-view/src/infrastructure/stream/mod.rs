//! Market Stream Transport
//!
//! WebSocket session management, heartbeat, reconnect backoff and frame
//! decoding for the upstream broadcaster.

mod codec;
mod heartbeat;
mod lifecycle;
mod manager;
mod messages;
mod reconnect;

pub use codec::{DecodeError, JsonCodec};
pub use heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
pub use lifecycle::ConnectionLifecycle;
pub use manager::{
    TransportConfig, TransportError, TransportEvent, TransportEventKind, TransportManager,
};
pub use messages::{MarketDataFrame, StreamEvent};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
