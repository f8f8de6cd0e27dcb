#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use roomlink::{
    ChannelEvents, IceCandidate, SerializedExecutor, SessionDescription, SignalingEvents,
    SignalingParameters,
};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs `task` on `executor` and waits for its result.
pub async fn run_on<F, T>(executor: &Arc<SerializedExecutor>, task: F) -> T
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    executor.submit(async move {
        let _ = tx.send(task.await);
    });
    timeout(EVENT_TIMEOUT, rx)
        .await
        .expect("executor task timed out")
        .expect("executor task dropped")
}

pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Asserts that nothing arrives on `rx` for a short quiet period.
pub async fn assert_no_event<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(event) = timeout(QUIET_PERIOD, rx.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

#[derive(Debug)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
    Error(String),
}

/// [`ChannelEvents`] sink that forwards every callback to a channel the test
/// can drain.
pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelRecorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ChannelEvents for ChannelRecorder {
    async fn on_channel_open(&self) {
        let _ = self.tx.send(ChannelEvent::Open);
    }

    async fn on_channel_message(&self, message: String) {
        let _ = self.tx.send(ChannelEvent::Message(message));
    }

    async fn on_channel_close(&self) {
        let _ = self.tx.send(ChannelEvent::Close);
    }

    async fn on_channel_error(&self, description: String) {
        let _ = self.tx.send(ChannelEvent::Error(description));
    }
}

#[derive(Debug)]
pub enum RoomEvent {
    Connected(SignalingParameters),
    OfferRequest(String),
    AnswerRequest(SessionDescription, String),
    RemoteDescription(SessionDescription),
    Candidate(IceCandidate),
    CandidatesRemoved(Vec<IceCandidate>),
    Closed,
    Error(String),
}

/// [`SignalingEvents`] sink that forwards every callback to a channel the
/// test can drain.
pub struct RoomRecorder {
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomRecorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RoomEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl SignalingEvents for RoomRecorder {
    async fn on_connected_to_room(&self, params: SignalingParameters) {
        let _ = self.tx.send(RoomEvent::Connected(params));
    }

    async fn on_offer_request(&self, from: String) {
        let _ = self.tx.send(RoomEvent::OfferRequest(from));
    }

    async fn on_answer_request(&self, sdp: SessionDescription, from: String) {
        let _ = self.tx.send(RoomEvent::AnswerRequest(sdp, from));
    }

    async fn on_remote_description(&self, sdp: SessionDescription) {
        let _ = self.tx.send(RoomEvent::RemoteDescription(sdp));
    }

    async fn on_remote_ice_candidate(&self, candidate: IceCandidate) {
        let _ = self.tx.send(RoomEvent::Candidate(candidate));
    }

    async fn on_remote_ice_candidates_removed(&self, candidates: Vec<IceCandidate>) {
        let _ = self.tx.send(RoomEvent::CandidatesRemoved(candidates));
    }

    async fn on_channel_closed(&self) {
        let _ = self.tx.send(RoomEvent::Closed);
    }

    async fn on_channel_error(&self, description: String) {
        let _ = self.tx.send(RoomEvent::Error(description));
    }
}

/// In-process WebSocket peer standing in for the room server. Accepts one
/// connection, records every text frame it receives and sends whatever the
/// test pushes through `outbound`. Dropping `outbound` closes the
/// connection from the server side.
pub struct TestServer {
    pub url: String,
    pub frames: mpsc::UnboundedReceiver<String>,
    pub outbound: mpsc::UnboundedSender<String>,
}

pub async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = frames_tx.send(text.as_str().to_owned());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                },
                payload = outbound_rx.recv() => match payload {
                    Some(payload) => {
                        if socket.send(Message::text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = socket.close(None).await;
                        break;
                    }
                },
            }
        }
    });

    TestServer {
        url: format!("ws://{addr}"),
        frames,
        outbound,
    }
}

impl TestServer {
    pub async fn next_frame(&mut self) -> serde_json::Value {
        let raw = timeout(EVENT_TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("server connection closed");
        serde_json::from_str(&raw).expect("frame is not JSON")
    }

    pub async fn assert_no_frame(&mut self) {
        if let Ok(Some(frame)) = timeout(QUIET_PERIOD, self.frames.recv()).await {
            panic!("unexpected frame: {frame}");
        }
    }

    pub fn push(&self, payload: impl Into<String>) {
        self.outbound.send(payload.into()).expect("server task gone");
    }
}
