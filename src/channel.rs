//! The WebSocket channel to the room server.
//!
//! All public methods must be called from tasks on the owning
//! [`SerializedExecutor`]; events from the socket's own tasks are
//! re-dispatched onto the executor before they touch any state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};

use crate::events::ChannelEvents;
use crate::executor::SerializedExecutor;
use crate::protocol;

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// Bound on how long `disconnect(wait_for_close: true)` waits for the
/// socket's close event.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(1000);
/// The server drops quiet connections, so the channel pings once a minute.
const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Connection lifecycle of a [`SignalChannel`]. Closed and Error are
/// terminal; Error is sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    New,
    Connected,
    Registered,
    Closed,
    Error,
}

/// One socket connection's lifecycle, with ordered, state-gated message
/// delivery in both directions. Messages sent before registration are
/// buffered and flushed, in order, when the channel becomes Registered.
pub struct SignalChannel {
    executor: Arc<SerializedExecutor>,
    events: Arc<dyn ChannelEvents>,
    state: Mutex<ChannelState>,
    send_queue: Mutex<VecDeque<String>>,
    ws_sink: Mutex<Option<WsSink>>,
    // Close flag observable from the socket's own tasks, independent of the
    // executor queue; disconnect(wait_for_close) waits on it with a bound.
    close_tx: watch::Sender<bool>,
    shutdown: Notify,
}

impl SignalChannel {
    pub fn new(executor: Arc<SerializedExecutor>, events: Arc<dyn ChannelEvents>) -> Arc<Self> {
        let (close_tx, _) = watch::channel(false);
        Arc::new(Self {
            executor,
            events,
            state: Mutex::new(ChannelState::New),
            send_queue: Mutex::new(VecDeque::new()),
            ws_sink: Mutex::new(None),
            close_tx,
            shutdown: Notify::new(),
        })
    }

    pub async fn state(&self) -> ChannelState {
        self.executor.assert_on_executor();
        *self.state.lock().await
    }

    /// Launches the WebSocket handshake for `url`. Valid only from New; in
    /// any other state this is a logged no-op that returns true. Returns
    /// false only when construction fails before the handshake is attempted;
    /// handshake success is signaled later through
    /// [`ChannelEvents::on_channel_open`].
    pub async fn connect(self: &Arc<Self>, url: &str) -> bool {
        self.executor.assert_on_executor();
        {
            let state = self.state.lock().await;
            if *state != ChannelState::New {
                warn!(target: "Channel", "connect() in state {:?}, ignoring", *state);
                return true;
            }
        }
        info!(target: "Channel", "Connecting to {url}");

        // The room server typically runs with a self-signed certificate, so
        // certificate validation is disabled. Known weakness.
        let tls = match native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
        {
            Ok(tls) => tls,
            Err(e) => {
                self.report_error(format!("WebSocket TLS setup error: {e}"));
                return false;
            }
        };

        let url = url.to_string();
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            match connect_async_tls_with_config(
                url.as_str(),
                None,
                false,
                Some(Connector::NativeTls(tls)),
            )
            .await
            {
                Ok((socket, _response)) => {
                    debug!(target: "Channel", "WebSocket connection opened to {url}");
                    let (sink, stream) = socket.split();
                    let executor = Arc::clone(&channel.executor);
                    let opened = Arc::clone(&channel);
                    executor.submit(async move { opened.on_socket_open(sink).await });
                    tokio::spawn(Arc::clone(&channel).read_pump(stream));
                }
                Err(e) => channel.report_error(format!("WebSocket connection error: {e}")),
            }
        });
        true
    }

    /// Sends the join envelope for `room_id` and switches to Registered,
    /// flushing everything buffered by [`send`](Self::send) in FIFO order.
    /// No-op outside Connected.
    pub async fn register_room(self: &Arc<Self>, room_id: &str, client_id: &str) {
        self.executor.assert_on_executor();
        {
            let state = self.state.lock().await;
            if *state != ChannelState::Connected {
                warn!(target: "Channel", "register_room() in state {:?}", *state);
                return;
            }
        }
        info!(target: "Channel", "Registering for room {room_id} as client {client_id}");
        if !self.transmit(&protocol::join_message(room_id)).await {
            return;
        }
        *self.state.lock().await = ChannelState::Registered;
        self.drain_queue().await;
    }

    /// The Registered transition driven by the server's `created`/`joined`
    /// response. Idempotent when already Registered.
    pub async fn mark_registered(self: &Arc<Self>) {
        self.executor.assert_on_executor();
        let mut state = self.state.lock().await;
        match *state {
            ChannelState::Connected => {
                *state = ChannelState::Registered;
                drop(state);
                self.drain_queue().await;
            }
            ChannelState::Registered => {}
            other => warn!(target: "Channel", "mark_registered() in state {other:?}"),
        }
    }

    /// State-gated send: buffered before registration, transmitted
    /// immediately once Registered, dropped after Closed/Error.
    pub async fn send(self: &Arc<Self>, message: String) {
        self.executor.assert_on_executor();
        let state = *self.state.lock().await;
        match state {
            ChannelState::New | ChannelState::Connected => {
                debug!(target: "Channel", "WS ACC: {message}");
                self.send_queue.lock().await.push_back(message);
            }
            ChannelState::Registered => {
                self.transmit(&message).await;
            }
            ChannelState::Closed | ChannelState::Error => {
                error!(target: "Channel", "send() in state {state:?}, dropping: {message}");
            }
        }
    }

    /// Tears the channel down. Registered first demotes to Connected; only
    /// an errored channel actually closes the socket, every other state
    /// leaves the transport alone. With `wait_for_close` the call waits,
    /// bounded by [`CLOSE_TIMEOUT`], for the socket's close event so the
    /// transport cannot fire into an executor that is about to be torn
    /// down.
    pub async fn disconnect(self: &Arc<Self>, wait_for_close: bool) {
        self.executor.assert_on_executor();
        let mut state = self.state.lock().await;
        debug!(target: "Channel", "Disconnecting in state {:?}", *state);
        if *state == ChannelState::Registered {
            *state = ChannelState::Connected;
        }
        if *state != ChannelState::Error {
            return;
        }
        *state = ChannelState::Closed;
        drop(state);

        self.shutdown.notify_waiters();
        if let Some(mut sink) = self.ws_sink.lock().await.take() {
            let _ = sink.close().await;
        }
        if wait_for_close {
            let mut closed = self.close_tx.subscribe();
            let _ = timeout(CLOSE_TIMEOUT, closed.wait_for(|closed| *closed)).await;
        }
        debug!(target: "Channel", "Disconnect done");
    }

    /// First error wins: exactly one Error transition and one
    /// [`ChannelEvents::on_channel_error`] callback per channel. Later
    /// reports are swallowed, as are reports against an already Closed
    /// channel: transport noise from a teardown the application asked for
    /// is not an error. Safe to call from any task.
    pub fn report_error(self: &Arc<Self>, description: String) {
        error!(target: "Channel", "{description}");
        let channel = Arc::clone(self);
        self.executor.submit(async move {
            let mut state = channel.state.lock().await;
            if !matches!(*state, ChannelState::Closed | ChannelState::Error) {
                *state = ChannelState::Error;
                drop(state);
                channel.events.on_channel_error(description).await;
            }
        });
    }

    async fn on_socket_open(self: Arc<Self>, sink: WsSink) {
        let mut state = self.state.lock().await;
        if *state != ChannelState::New {
            // An error report or teardown won the race against the handshake.
            debug!(target: "Channel", "socket opened in state {:?}, dropping it", *state);
            return;
        }
        *self.ws_sink.lock().await = Some(sink);
        *state = ChannelState::Connected;
        drop(state);
        self.spawn_keepalive();
        self.events.on_channel_open().await;
    }

    async fn on_socket_message(&self, message: String) {
        let state = *self.state.lock().await;
        if state == ChannelState::Connected || state == ChannelState::Registered {
            self.events.on_channel_message(message).await;
        } else {
            debug!(target: "Channel", "dropping inbound message in state {state:?}");
        }
    }

    async fn on_socket_closed(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, ChannelState::Closed | ChannelState::Error) {
            return;
        }
        *state = ChannelState::Closed;
        drop(state);
        self.events.on_channel_close().await;
    }

    async fn transmit(self: &Arc<Self>, payload: &str) -> bool {
        debug!(target: "Channel", "C->WSS: {payload}");
        let mut guard = self.ws_sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            self.report_error("WebSocket is not open".to_string());
            return false;
        };
        match sink.send(Message::text(payload.to_owned())).await {
            Ok(()) => true,
            Err(e) => {
                self.report_error(format!("WebSocket send error: {e}"));
                false
            }
        }
    }

    async fn drain_queue(self: &Arc<Self>) {
        loop {
            let Some(message) = self.send_queue.lock().await.pop_front() else {
                break;
            };
            if !self.transmit(&message).await {
                break;
            }
        }
    }

    async fn read_pump(self: Arc<Self>, mut stream: WsStream) {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_owned();
                    debug!(target: "Channel", "WSS->C: {text}");
                    let channel = Arc::clone(&self);
                    self.executor
                        .submit(async move { channel.on_socket_message(text).await });
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(target: "Channel", "close frame received");
                    break;
                }
                Some(Ok(_)) => {} // ping/pong/binary: nothing to do here
                Some(Err(e)) => {
                    self.report_error(format!("WebSocket error: {e}"));
                    break;
                }
                None => {
                    debug!(target: "Channel", "WebSocket stream ended");
                    break;
                }
            }
        }
        // Flip the close flag before queuing the state change: the flag must
        // be observable even if the executor never drains again.
        let _ = self.close_tx.send(true);
        self.shutdown.notify_waiters();
        let channel = Arc::clone(&self);
        self.executor
            .submit(async move { channel.on_socket_closed().await });
    }

    fn spawn_keepalive(self: &Arc<Self>) {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(PING_INTERVAL) => {
                        let mut guard = channel.ws_sink.lock().await;
                        let Some(sink) = guard.as_mut() else { break };
                        if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                            debug!(target: "Channel", "keepalive ping failed: {e}");
                            break;
                        }
                    }
                    _ = channel.shutdown.notified() => break,
                }
            }
        });
    }
}
