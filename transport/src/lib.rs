//! # Caption Client Transport
//!
//! The socket side of the caption client:
//!
//! - [`TransportChannel`]: one persistent connection with automatic,
//!   backed-off reconnection and multicast inbound frames
//! - [`Correlator`]: one-shot request/response pairs keyed by correlation id,
//!   with deadlines and at-most-once settlement
//! - [`Connector`]: how connections are opened ([`WebSocketConnector`] in
//!   production)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use caption_client_transport::{
//!     ChannelConfig, Correlator, CorrelatorConfig, MessageType, TransportChannel,
//!     WebSocketConnector,
//! };
//!
//! let channel = TransportChannel::new(
//!     Arc::new(WebSocketConnector::new("wss://example.com/socket")),
//!     ChannelConfig::default(),
//! );
//! channel.connect().await?;
//!
//! let correlator = Correlator::new(channel.clone(), CorrelatorConfig::default());
//! let response = correlator
//!     .request(MessageType::GetBookings, serde_json::json!({}))
//!     .await?;
//! ```

pub mod channel;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod reconnect;

pub use channel::{ChannelConfig, ConnectionState, InboundFrames, TransportChannel};
pub use connector::{Connection, Connector, FrameSink, FrameStream, WebSocketConnector};
pub use correlator::{Correlator, CorrelatorConfig, Outcome, PendingInfo, Response};
pub use error::{BusinessError, RequestError, TransportError};
pub use frame::{CorrelationId, Frame, MessageType};
pub use reconnect::ReconnectPolicy;
