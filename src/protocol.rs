//! The JSON envelope protocol spoken over the signaling channel.
//!
//! Every frame is a JSON object carrying a `signal` tag. The tag set is
//! closed: an unknown or missing tag is a [`ProtocolError`], never a silent
//! default.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::types::{IceCandidate, SdpType, SessionDescription};

/// The known `signal` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Join,
    Created,
    Joined,
    NewJoined,
    OfferRequest,
    OfferResponse,
    AnswerRequest,
    AnswerResponse,
    Finalize,
    Candidate,
    RemoveCandidates,
    Left,
    Ping,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Join => "join",
            Signal::Created => "created",
            Signal::Joined => "joined",
            Signal::NewJoined => "newJoined",
            Signal::OfferRequest => "offerRequest",
            Signal::OfferResponse => "offerResponse",
            Signal::AnswerRequest => "answerRequest",
            Signal::AnswerResponse => "answerResponse",
            Signal::Finalize => "finalize",
            Signal::Candidate => "candidate",
            Signal::RemoveCandidates => "remove-candidates",
            Signal::Left => "left",
            Signal::Ping => "ping",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "join" => Signal::Join,
            "created" => Signal::Created,
            "joined" => Signal::Joined,
            "newJoined" => Signal::NewJoined,
            "offerRequest" => Signal::OfferRequest,
            "offerResponse" => Signal::OfferResponse,
            "answerRequest" => Signal::AnswerRequest,
            "answerResponse" => Signal::AnswerResponse,
            "finalize" => Signal::Finalize,
            "candidate" => Signal::Candidate,
            "remove-candidates" => Signal::RemoveCandidates,
            "left" => Signal::Left,
            "ping" => Signal::Ping,
            _ => return None,
        })
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed signaling JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signaling message has no signal tag")]
    MissingSignal,
    #[error("unexpected signal '{0}'")]
    UnknownSignal(String),
    #[error("signal '{signal}' is missing field '{field}'")]
    MissingField {
        signal: &'static str,
        field: &'static str,
    },
}

/// A fully parsed inbound envelope, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundSignal {
    /// This client created the room and acts as the initiator. Carries the
    /// server-assigned local client id.
    Created { client_id: String },
    /// This client joined an existing room and acts as the joiner.
    Joined { client_id: String },
    /// Another user entered the room. Informational only.
    NewJoined,
    /// The peer asks us for an offer.
    OfferRequest { from: String },
    /// The peer sent us an offer and expects an answer.
    AnswerRequest {
        from: String,
        sdp: SessionDescription,
    },
    /// The peer's answer, finalizing the exchange.
    RemoteDescription(SessionDescription),
    Candidate(IceCandidate),
    RemoveCandidates(Vec<IceCandidate>),
    Left,
    Ping,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    signal: Option<String>,
    content: Option<String>,
    to: Option<String>,
    from: Option<String>,
    candidates: Option<Vec<RemovalCandidate>>,
}

/// Wire form of a candidate inside a removal batch.
#[derive(Debug, Serialize, Deserialize)]
struct RemovalCandidate {
    label: i32,
    id: String,
    candidate: String,
}

impl From<RemovalCandidate> for IceCandidate {
    fn from(wire: RemovalCandidate) -> Self {
        IceCandidate {
            sdp_mid: wire.id,
            sdp_m_line_index: wire.label,
            sdp: wire.candidate,
        }
    }
}

impl From<&IceCandidate> for RemovalCandidate {
    fn from(candidate: &IceCandidate) -> Self {
        RemovalCandidate {
            label: candidate.sdp_m_line_index,
            id: candidate.sdp_mid.clone(),
            candidate: candidate.sdp.clone(),
        }
    }
}

/// Wire form of the nested JSON carried in a `candidate` envelope's
/// `content` field.
#[derive(Debug, Deserialize)]
struct ContentCandidate {
    #[serde(rename = "sdpMid")]
    sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    sdp_m_line_index: i32,
    candidate: String,
}

fn require(
    field: Option<String>,
    signal: &'static str,
    name: &'static str,
) -> Result<String, ProtocolError> {
    field.ok_or(ProtocolError::MissingField {
        signal,
        field: name,
    })
}

/// Parses one inbound text frame into a typed signal.
pub fn parse_envelope(raw: &str) -> Result<InboundSignal, ProtocolError> {
    let envelope: RawEnvelope = serde_json::from_str(raw)?;
    let tag = envelope.signal.as_deref().ok_or(ProtocolError::MissingSignal)?;
    let signal =
        Signal::from_tag(tag).ok_or_else(|| ProtocolError::UnknownSignal(tag.to_string()))?;

    match signal {
        Signal::Created => Ok(InboundSignal::Created {
            client_id: require(envelope.to, "created", "to")?,
        }),
        Signal::Joined => Ok(InboundSignal::Joined {
            client_id: require(envelope.to, "joined", "to")?,
        }),
        Signal::NewJoined => Ok(InboundSignal::NewJoined),
        Signal::OfferRequest => Ok(InboundSignal::OfferRequest {
            from: require(envelope.from, "offerRequest", "from")?,
        }),
        Signal::AnswerRequest => Ok(InboundSignal::AnswerRequest {
            from: require(envelope.from, "answerRequest", "from")?,
            sdp: SessionDescription::offer(require(envelope.content, "answerRequest", "content")?),
        }),
        Signal::Finalize => Ok(InboundSignal::RemoteDescription(SessionDescription::answer(
            require(envelope.content, "finalize", "content")?,
        ))),
        Signal::Candidate => {
            let content = require(envelope.content, "candidate", "content")?;
            let wire: ContentCandidate = serde_json::from_str(&content)?;
            Ok(InboundSignal::Candidate(IceCandidate {
                sdp_mid: wire.sdp_mid,
                sdp_m_line_index: wire.sdp_m_line_index,
                sdp: wire.candidate,
            }))
        }
        Signal::RemoveCandidates => {
            let entries = envelope.candidates.ok_or(ProtocolError::MissingField {
                signal: "remove-candidates",
                field: "candidates",
            })?;
            Ok(InboundSignal::RemoveCandidates(
                entries.into_iter().map(IceCandidate::from).collect(),
            ))
        }
        Signal::Left => Ok(InboundSignal::Left),
        Signal::Ping => Ok(InboundSignal::Ping),
        // Outbound-only tags are never expected from the server.
        Signal::Join | Signal::OfferResponse | Signal::AnswerResponse => {
            Err(ProtocolError::UnknownSignal(tag.to_string()))
        }
    }
}

/// The registration envelope, carrying the room id and the fixed topology
/// tag.
pub fn join_message(room_id: &str) -> String {
    json!({
        "signal": "join",
        "content": room_id,
        "to": null,
        "custom": {"type": "MESH"},
    })
    .to_string()
}

/// Best-effort goodbye sent before closing the channel.
pub fn left_message() -> String {
    json!({"signal": "left"}).to_string()
}

/// Wraps a local session description for the peer. The tag follows the
/// description kind: offers travel as `offerResponse`, answers as
/// `answerResponse`.
pub fn description_message(sdp: &SessionDescription, to: &str) -> String {
    let signal = match sdp.kind {
        SdpType::Offer => Signal::OfferResponse,
        SdpType::Answer => Signal::AnswerResponse,
    };
    json!({
        "signal": signal.as_str(),
        "to": to,
        "from": "",
        "content": sdp.description,
    })
    .to_string()
}

/// Wraps a single local candidate for the peer.
pub fn candidate_message(candidate: &IceCandidate, to: &str) -> String {
    json!({
        "signal": "candidate",
        "candidate": candidate.sdp,
        "to": to,
        "from": "",
    })
    .to_string()
}

/// A candidate-removal batch. Note the legacy `type` key instead of
/// `signal`.
pub fn removal_message(candidates: &[IceCandidate]) -> String {
    let entries: Vec<RemovalCandidate> = candidates.iter().map(RemovalCandidate::from).collect();
    json!({
        "type": "remove-candidates",
        "candidates": entries,
    })
    .to_string()
}
