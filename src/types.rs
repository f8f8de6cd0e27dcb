use crate::error::SignalingError;

/// Which side of the offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// An opaque session description produced or consumed by the media engine.
/// The signaling layer only transports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub description: String,
}

impl SessionDescription {
    pub fn offer(description: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            description: description.into(),
        }
    }

    pub fn answer(description: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            description: description.into(),
        }
    }
}

/// An opaque network candidate. `sdp_mid` and `sdp_m_line_index` identify the
/// media description the candidate belongs to; `sdp` is the candidate line
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub sdp_mid: String,
    pub sdp_m_line_index: i32,
    pub sdp: String,
}

/// A STUN or TURN server descriptor handed to the media engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl IceServer {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: String::new(),
            password: String::new(),
        }
    }

    pub fn with_credentials(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// The relay/reflection servers handed out with every room session.
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer::new("stun:23.21.150.121"),
        IceServer::new("stun:stun.l.google.com:19302"),
        IceServer::with_credentials("turn:numb.viagenie.ca", "louis@mozilla.com", "webrtcdemo"),
    ]
}

/// Snapshot of the negotiated session context, assembled once when the
/// channel opens and delivered read-only through
/// [`SignalingEvents::on_connected_to_room`](crate::events::SignalingEvents::on_connected_to_room).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingParameters {
    pub ice_servers: Vec<IceServer>,
    pub client_id: String,
    /// The WebSocket endpoint the channel is connected to.
    pub ws_url: String,
    /// HTTP endpoint for the legacy candidate-removal POST path.
    pub message_url: String,
}

/// What the application supplies to start a room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConnectionParameters {
    pub room_url: String,
    pub room_id: String,
    /// Self-test mode: the client talks to itself and the initiator's local
    /// candidates are looped straight back instead of hitting the wire.
    pub loopback: bool,
}

impl RoomConnectionParameters {
    /// A room URL is accepted only with a ws:// or wss:// scheme,
    /// case-insensitive. Anything else is rejected before any connection
    /// attempt is made.
    pub fn validate(&self) -> Result<(), SignalingError> {
        let lower = self.room_url.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(())
        } else {
            Err(SignalingError::InvalidRoomUrl(self.room_url.clone()))
        }
    }

    /// The signaling endpoint lives under the `/signaling` path of the room
    /// server.
    pub fn connection_url(&self) -> String {
        format!("{}/signaling", self.room_url.trim_end_matches('/'))
    }

    /// The per-client message URL for the legacy HTTP POST path, on the
    /// room server's HTTP side.
    pub fn message_url(&self, client_id: &str) -> String {
        format!(
            "{}/message/{}/{}",
            self.http_base(),
            self.room_id,
            client_id
        )
    }

    fn http_base(&self) -> String {
        let url = self.room_url.trim_end_matches('/');
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("wss://") {
            format!("https://{}", &url["wss://".len()..])
        } else if lower.starts_with("ws://") {
            format!("http://{}", &url["ws://".len()..])
        } else {
            url.to_string()
        }
    }
}

/// Which side of the session this client is, assigned exactly once per room
/// session from the server's `created`/`joined` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Joiner,
}
