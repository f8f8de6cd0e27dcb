//! Signaling core for a two-party real-time call.
//!
//! The crate is built from three layers. [`executor::SerializedExecutor`] is
//! a single logical thread of execution: every piece of channel and room
//! state is only ever touched from tasks running on it.
//! [`channel::SignalChannel`] owns one WebSocket connection to the room
//! server, its state machine and the queue of messages buffered before
//! registration. [`room::RoomSignalingClient`] speaks the JSON envelope
//! protocol on top of the channel, negotiates the local role (initiator or
//! joiner) and translates inbound envelopes into the typed
//! [`events::SignalingEvents`] callbacks consumed by the media layer.

pub mod channel;
pub mod error;
pub mod events;
pub mod executor;
pub mod http;
pub mod protocol;
pub mod room;
pub mod types;

pub use channel::{ChannelState, SignalChannel};
pub use error::SignalingError;
pub use events::{ChannelEvents, SignalingEvents};
pub use executor::SerializedExecutor;
pub use room::{RoomSignalingClient, RoomState};
pub use types::{
    IceCandidate, IceServer, Role, RoomConnectionParameters, SdpType, SessionDescription,
    SignalingParameters,
};
