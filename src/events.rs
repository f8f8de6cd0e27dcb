use async_trait::async_trait;

use crate::types::{IceCandidate, SessionDescription, SignalingParameters};

/// Lifecycle and frame callbacks from a
/// [`SignalChannel`](crate::channel::SignalChannel) to its owner. All methods
/// are invoked from tasks on the channel's executor, in event order.
#[async_trait]
pub trait ChannelEvents: Send + Sync {
    /// The WebSocket handshake completed and the channel is Connected.
    async fn on_channel_open(&self);

    /// A text frame arrived while the channel was Connected or Registered.
    async fn on_channel_message(&self, message: String);

    /// The socket closed without the channel having errored first.
    async fn on_channel_close(&self);

    /// First (and only) error report for this channel.
    async fn on_channel_error(&self, description: String);
}

/// Typed session-negotiation events consumed by the media layer and the
/// application. All callbacks are invoked from tasks on the room's executor,
/// in signaling order.
#[async_trait]
pub trait SignalingEvents: Send + Sync {
    /// Room membership is established; `params` is the read-only session
    /// snapshot (client id, ICE servers, URLs).
    async fn on_connected_to_room(&self, params: SignalingParameters);

    /// The peer `from` asks for an offer.
    async fn on_offer_request(&self, from: String);

    /// The peer `from` sent an offer and expects an answer.
    async fn on_answer_request(&self, sdp: SessionDescription, from: String);

    /// The peer's answer description arrived.
    async fn on_remote_description(&self, sdp: SessionDescription);

    async fn on_remote_ice_candidate(&self, candidate: IceCandidate);

    async fn on_remote_ice_candidates_removed(&self, candidates: Vec<IceCandidate>);

    /// The peer left or the channel closed.
    async fn on_channel_closed(&self);

    /// First (and only) error report for this room session.
    async fn on_channel_error(&self, description: String);
}
