//! Room-level signaling over a [`SignalChannel`].
//!
//! A [`RoomSignalingClient`] negotiates membership in a two-party room,
//! learns its role (initiator or joiner) from the server's
//! `created`/`joined` response, and translates the envelope protocol into
//! the typed [`SignalingEvents`] callbacks the media layer consumes.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::Mutex;

use crate::channel::{ChannelState, SignalChannel};
use crate::error::SignalingError;
use crate::events::{ChannelEvents, SignalingEvents};
use crate::executor::SerializedExecutor;
use crate::http;
use crate::protocol::{self, InboundSignal};
use crate::types::{
    IceCandidate, Role, RoomConnectionParameters, SessionDescription, SignalingParameters,
    default_ice_servers,
};

/// Room connection lifecycle. Error is sticky: after the first reported
/// error all further room errors are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    New,
    Connected,
    Closed,
    Error,
}

/// Client for one two-party signaling room session.
///
/// Public methods are fire-and-forget: each queues a task on the session's
/// executor and returns immediately. Results arrive on the
/// [`SignalingEvents`] callbacks, in executor order. Each instance owns its
/// own executor, channel and state; nothing is shared across sessions.
pub struct RoomSignalingClient {
    inner: Arc<RoomInner>,
}

struct RoomInner {
    executor: Arc<SerializedExecutor>,
    events: Arc<dyn SignalingEvents>,
    params: RoomConnectionParameters,
    state: Mutex<RoomState>,
    role: Mutex<Option<Role>>,
    /// The remote peer currently negotiating with us.
    peer_id: Mutex<Option<String>>,
    channel: Mutex<Option<Arc<SignalChannel>>>,
    signaling: Mutex<Option<SignalingParameters>>,
}

impl RoomSignalingClient {
    pub fn new(events: Arc<dyn SignalingEvents>, params: RoomConnectionParameters) -> Self {
        let executor = Arc::new(SerializedExecutor::new());
        executor.request_start();
        Self {
            inner: Arc::new(RoomInner {
                executor,
                events,
                params,
                state: Mutex::new(RoomState::New),
                role: Mutex::new(None),
                peer_id: Mutex::new(None),
                channel: Mutex::new(None),
                signaling: Mutex::new(None),
            }),
        }
    }

    /// Validates the room URL and starts the asynchronous room setup. From
    /// here on progress and failures are reported through
    /// [`SignalingEvents`].
    pub fn connect_to_room(&self) -> Result<(), SignalingError> {
        self.inner.params.validate()?;
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(async move { inner.connect_to_room_internal().await });
        Ok(())
    }

    /// Sends `left` best-effort, closes the channel with a bounded wait and
    /// stops the executor.
    pub fn disconnect_from_room(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.submit(async move {
            inner.disconnect_internal().await;
            inner.executor.request_stop();
        });
    }

    /// Sends the local offer description to `to`.
    pub fn send_offer_sdp(&self, sdp: SessionDescription, to: String) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.submit(async move {
            debug!(target: "Room", "offerResponse to {to}");
            inner
                .send_over_channel(protocol::description_message(&sdp, &to))
                .await;
        });
    }

    /// Sends the local answer description to the peer that requested it.
    pub fn send_answer_sdp(&self, sdp: SessionDescription) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.submit(async move {
            let to = inner.peer_id.lock().await.clone().unwrap_or_default();
            if to.is_empty() {
                warn!(target: "Room", "answerResponse with no known peer");
            }
            debug!(target: "Room", "answerResponse to {to}");
            inner
                .send_over_channel(protocol::description_message(&sdp, &to))
                .await;
        });
    }

    /// Sends a locally gathered candidate to the peer. In loopback mode an
    /// initiator's candidates never hit the wire; they are fed straight back
    /// as remote candidates, simulating a peer on the same device.
    pub fn send_local_ice_candidate(&self, candidate: IceCandidate) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(async move { inner.send_local_candidate(candidate).await });
    }

    /// Sends a batch of withdrawn candidates. A joiner sends the batch over
    /// the channel; an initiator uses the legacy HTTP POST path (and, in
    /// loopback mode, also mirrors the batch back locally).
    pub fn send_local_ice_candidate_removals(&self, candidates: Vec<IceCandidate>) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(async move { inner.send_candidate_removals(candidates).await });
    }
}

impl RoomInner {
    async fn connect_to_room_internal(self: Arc<Self>) {
        let url = self.params.connection_url();
        info!(target: "Room", "Connect to room {} via {url}", self.params.room_id);
        *self.state.lock().await = RoomState::New;

        let events = Arc::clone(&self) as Arc<dyn ChannelEvents>;
        let channel = SignalChannel::new(Arc::clone(&self.executor), events);
        *self.channel.lock().await = Some(Arc::clone(&channel));
        channel.connect(&url).await;
    }

    async fn disconnect_internal(&self) {
        let mut state = self.state.lock().await;
        debug!(target: "Room", "Disconnect. Room state: {:?}", *state);
        let was_connected = *state == RoomState::Connected;
        *state = RoomState::Closed;
        drop(state);

        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            if was_connected {
                info!(target: "Room", "Closing room.");
                channel.send(protocol::left_message()).await;
            }
            channel.disconnect(true).await;
        }
    }

    async fn channel(&self) -> Option<Arc<SignalChannel>> {
        self.channel.lock().await.clone()
    }

    async fn send_over_channel(&self, message: String) {
        match self.channel().await {
            Some(channel) => channel.send(message).await,
            None => {
                self.report_error("Signaling channel is not open".to_string())
                    .await
            }
        }
    }

    async fn send_local_candidate(&self, candidate: IceCandidate) {
        let role = *self.role.lock().await;
        if role == Some(Role::Initiator) && self.params.loopback {
            // Self-test: short-circuit straight back into the local session.
            self.events.on_remote_ice_candidate(candidate).await;
            return;
        }
        let to = self.peer_id.lock().await.clone().unwrap_or_default();
        self.send_over_channel(protocol::candidate_message(&candidate, &to))
            .await;
    }

    async fn send_candidate_removals(self: Arc<Self>, candidates: Vec<IceCandidate>) {
        let message = protocol::removal_message(&candidates);
        if *self.role.lock().await != Some(Role::Initiator) {
            self.send_over_channel(message).await;
            return;
        }

        if *self.state.lock().await != RoomState::Connected {
            self.report_error("Sending ICE candidate removals in non connected state".to_string())
                .await;
            return;
        }
        let message_url = match self.signaling.lock().await.as_ref() {
            Some(parameters) => parameters.message_url.clone(),
            None => {
                self.report_error("No signaling parameters for removal POST".to_string())
                    .await;
                return;
            }
        };
        // Legacy path: removals from the initiator go over HTTP, not the
        // socket. The round-trip must not stall the executor.
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            if let Err(e) = http::post_signaling_message(&message_url, message).await {
                inner.report_error_from_task(format!("Removal POST error: {e}"));
            }
        });
        if self.params.loopback {
            self.events
                .on_remote_ice_candidates_removed(candidates)
                .await;
        }
    }

    async fn route_message(&self, message: String) {
        let parsed = match protocol::parse_envelope(&message) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report_error(format!("WebSocket message error: {e}"))
                    .await;
                return;
            }
        };

        // Keep-alive; nothing to acknowledge at this layer.
        if matches!(parsed, InboundSignal::Ping) {
            return;
        }

        let Some(channel) = self.channel().await else {
            return;
        };
        // created/joined are the only signals allowed to perform the
        // Registered transition; everything else requires it already done.
        if matches!(
            parsed,
            InboundSignal::Created { .. } | InboundSignal::Joined { .. }
        ) {
            channel.mark_registered().await;
        }
        if channel.state().await != ChannelState::Registered {
            error!(target: "Room", "Got WebSocket message in non registered state.");
            return;
        }

        match parsed {
            InboundSignal::Created { client_id } => {
                info!(target: "Room", "Room created, acting as initiator. Client id: {client_id}");
                *self.role.lock().await = Some(Role::Initiator);
            }
            InboundSignal::Joined { client_id } => {
                info!(target: "Room", "Joined room, acting as joiner. Client id: {client_id}");
                *self.role.lock().await = Some(Role::Joiner);
            }
            InboundSignal::NewJoined => {
                info!(target: "Room", "A new user joined the room");
            }
            InboundSignal::OfferRequest { from } => {
                *self.peer_id.lock().await = Some(from.clone());
                self.events.on_offer_request(from).await;
            }
            InboundSignal::AnswerRequest { from, sdp } => {
                if *self.role.lock().await == Some(Role::Initiator) {
                    self.report_error(format!(
                        "Received answer request for call initiator: {message}"
                    ))
                    .await;
                } else {
                    *self.peer_id.lock().await = Some(from.clone());
                    self.events.on_answer_request(sdp, from).await;
                }
            }
            InboundSignal::RemoteDescription(sdp) => {
                self.events.on_remote_description(sdp).await;
            }
            InboundSignal::Candidate(candidate) => {
                self.events.on_remote_ice_candidate(candidate).await;
            }
            InboundSignal::RemoveCandidates(candidates) => {
                self.events
                    .on_remote_ice_candidates_removed(candidates)
                    .await;
            }
            InboundSignal::Left => {
                self.events.on_channel_closed().await;
            }
            InboundSignal::Ping => {}
        }
    }

    /// First error wins: one Error transition and one
    /// [`SignalingEvents::on_channel_error`] callback per session.
    async fn report_error(&self, description: String) {
        error!(target: "Room", "{description}");
        let mut state = self.state.lock().await;
        if *state != RoomState::Error {
            *state = RoomState::Error;
            drop(state);
            self.events.on_channel_error(description).await;
        }
    }

    /// Error report from outside the executor, bounced onto it.
    fn report_error_from_task(self: &Arc<Self>, description: String) {
        let inner = Arc::clone(self);
        self.executor
            .submit(async move { inner.report_error(description).await });
    }
}

#[async_trait]
impl ChannelEvents for RoomInner {
    async fn on_channel_open(&self) {
        {
            let state = self.state.lock().await;
            if *state != RoomState::New {
                warn!(target: "Room", "channel opened in room state {:?}", *state);
                return;
            }
        }
        let Some(channel) = self.channel().await else {
            return;
        };

        let client_id = synthesize_client_id();
        let parameters = SignalingParameters {
            ice_servers: default_ice_servers(),
            client_id: client_id.clone(),
            ws_url: self.params.connection_url(),
            message_url: self.params.message_url(&client_id),
        };
        channel
            .register_room(&self.params.room_id, &client_id)
            .await;
        *self.signaling.lock().await = Some(parameters.clone());
        self.events.on_connected_to_room(parameters).await;
        *self.state.lock().await = RoomState::Connected;
    }

    async fn on_channel_message(&self, message: String) {
        self.route_message(message).await;
    }

    async fn on_channel_close(&self) {
        self.events.on_channel_closed().await;
    }

    async fn on_channel_error(&self, description: String) {
        self.report_error(format!("WebSocket error: {description}"))
            .await;
    }
}

/// Provisional numeric id used to register; the server's `created`/`joined`
/// response assigns the real one.
fn synthesize_client_id() -> String {
    rand::rng().random_range(10_000_000u32..100_000_000).to_string()
}
