//! One gateway connection and its state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use cord_proto::{
    CloseCode, Event, GatewayPayload, Identify, IdentifyProperties, Intents, OpCode,
    ReconnectPolicy, Resume,
};

use crate::error::GatewayError;
use crate::events::ShardEvent;
use crate::heartbeat::{start_heartbeat_task, HeartbeatHandle};
use crate::manager::IdentifyGate;
use crate::reconnect::ReconnectConfig;
use crate::send_limit::SendLimiter;
use crate::state::{AtomicShardState, ShardState};

/// How long to wait for `HELLO` after the socket opens.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Gateway protocol version to speak.
///
/// v10 is the default; v6 is kept as a legacy compatibility mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayVersion {
    /// Deprecated upstream, still accepted.
    V6,
    /// Current, intents required.
    #[default]
    V10,
}

impl GatewayVersion {
    /// Numeric version for the connection query string.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::V6 => 6,
            Self::V10 => 10,
        }
    }
}

/// Configuration shared by every shard of one bot.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot token.
    pub token: String,
    /// Event categories to subscribe to.
    pub intents: Intents,
    /// Member count above which guilds are sent as large.
    pub large_threshold: Option<u32>,
    /// Gateway protocol version.
    pub version: GatewayVersion,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// Minimum spacing between `IDENTIFY`s across the fleet.
    pub identify_spacing: Duration,
}

impl GatewayConfig {
    /// Configuration with platform defaults for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: Intents::non_privileged(),
            large_threshold: None,
            version: GatewayVersion::default(),
            reconnect: ReconnectConfig::default(),
            identify_spacing: Duration::from_secs(5),
        }
    }

    /// Override the intents bitmask.
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    /// Override the large-guild threshold.
    #[must_use]
    pub const fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Select a gateway protocol version.
    #[must_use]
    pub const fn with_version(mut self, version: GatewayVersion) -> Self {
        self.version = version;
        self
    }

    /// Override the reconnect backoff policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the identify spacing (tests only; the server enforces
    /// five seconds).
    #[must_use]
    pub const fn with_identify_spacing(mut self, spacing: Duration) -> Self {
        self.identify_spacing = spacing;
        self
    }
}

/// Commands a shard accepts from its owner.
#[derive(Debug)]
pub enum ShardCommand {
    /// Send a frame, subject to the command budget.
    Send(GatewayPayload),
    /// Close the socket with code 1000 and stop.
    Disconnect,
    /// Drop the socket without a close frame and stop.
    Kill,
}

/// Last seen dispatch sequence for one session.
///
/// Zero means no dispatch has been seen yet. `observe` keeps the value
/// non-decreasing even if the server misbehaves.
#[derive(Debug, Default)]
pub struct SequenceTracker(AtomicU64);

impl SequenceTracker {
    /// Create a tracker with no sequence seen.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Record a dispatch sequence.
    pub fn observe(&self, sequence: u64) {
        self.0.fetch_max(sequence, Ordering::SeqCst);
    }

    /// The last sequence, if any dispatch has been seen.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Forget the sequence (on re-identify).
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Why a live connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Server or network closed the socket; carries the close code when
    /// one was received.
    Closed(Option<u16>),
    /// Transport error on read or write.
    Transport(String),
    /// A payload could not be interpreted.
    Protocol(String),
    /// Two heartbeats went unacked; socket was closed with 4000.
    HeartbeatTimeout,
    /// Server sent `RECONNECT`.
    ReconnectRequested,
    /// Server sent `INVALID_SESSION`.
    InvalidSession {
        /// Whether the session may still be resumed.
        resumable: bool,
    },
    /// Caller asked for a graceful disconnect.
    Disconnected,
    /// Caller asked for an abrupt stop.
    Killed,
}

/// One gateway connection: socket, session, sequence, and heartbeat.
pub struct Shard {
    id: u64,
    total: u64,
    config: GatewayConfig,
    gateway_url: String,
    state: Arc<AtomicShardState>,
    sequence: Arc<SequenceTracker>,
    session_id: Mutex<Option<String>>,
    send_limiter: SendLimiter,
    gate: Arc<IdentifyGate>,
    events: mpsc::Sender<ShardEvent>,
    commands: mpsc::Receiver<ShardCommand>,
}

impl Shard {
    /// Create a shard. It does nothing until [`Shard::run`] is driven.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: u64,
        total: u64,
        config: GatewayConfig,
        gateway_url: impl Into<String>,
        state: Arc<AtomicShardState>,
        gate: Arc<IdentifyGate>,
        events: mpsc::Sender<ShardEvent>,
        commands: mpsc::Receiver<ShardCommand>,
    ) -> Self {
        Self {
            id,
            total,
            config,
            gateway_url: gateway_url.into(),
            state,
            sequence: Arc::new(SequenceTracker::new()),
            session_id: Mutex::new(None),
            send_limiter: SendLimiter::default(),
            gate,
            events,
            commands,
        }
    }

    /// The connection URL with version and encoding query parameters.
    fn connect_url(&self) -> String {
        format!(
            "{}/?v={}&encoding=json",
            self.gateway_url.trim_end_matches('/'),
            self.config.version.as_u8()
        )
    }

    /// Drive the shard until it is killed, disconnected, or fails
    /// fatally.
    pub async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            self.state.store(ShardState::Connecting);
            let url = self.connect_url();
            debug!(shard = self.id, %url, "connecting to gateway");

            let stream = match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _)) => stream,
                Err(err) => {
                    attempt += 1;
                    if self.config.reconnect.is_exhausted(attempt) {
                        self.fail(GatewayError::Transport(err.to_string())).await;
                        return;
                    }
                    let delay = self.config.reconnect.next_delay(attempt);
                    warn!(shard = self.id, %err, ?delay, "gateway connect failed, backing off");
                    self.state.store(ShardState::Reconnecting);
                    sleep(delay).await;
                    continue;
                }
            };
            attempt = 0;

            let (mut write, mut read) = stream.split();

            // First frame must be HELLO.
            let hello = match self.await_hello(&mut read).await {
                Ok(hello) => hello,
                Err(err) => {
                    warn!(shard = self.id, %err, "handshake failed, reconnecting");
                    self.state.store(ShardState::Reconnecting);
                    sleep(self.config.reconnect.next_delay(1)).await;
                    continue;
                }
            };
            let interval = Duration::from_millis(hello.heartbeat_interval);

            let (beat_tx, beat_rx) = mpsc::channel(8);
            let heartbeat = start_heartbeat_task(interval, Arc::clone(&self.sequence), beat_tx);

            if let Err(err) = self.open_session(&mut write).await {
                heartbeat.stop();
                warn!(shard = self.id, %err, "handshake send failed, reconnecting");
                self.state.store(ShardState::Reconnecting);
                sleep(self.config.reconnect.next_delay(1)).await;
                continue;
            }

            let end = self
                .run_connection(&mut read, &mut write, beat_rx, &heartbeat)
                .await;
            heartbeat.stop();

            match self.decide(end).await {
                Some(()) => continue,
                None => return,
            }
        }
    }

    /// Apply the reconnect decision table. `Some(())` means reconnect,
    /// `None` means the shard is done.
    async fn decide(&mut self, end: ConnectionEnd) -> Option<()> {
        match end {
            ConnectionEnd::Closed(code) => {
                let close_code = code.map(CloseCode::from_u16);
                let policy = close_code.map_or(ReconnectPolicy::Resume, CloseCode::policy);
                self.emit(ShardEvent::Disconnected {
                    shard_id: self.id,
                    code,
                    reconnecting: policy != ReconnectPolicy::Fatal,
                })
                .await;

                match policy {
                    ReconnectPolicy::Resume => {
                        info!(shard = self.id, ?code, "gateway closed, resuming");
                        self.state.store(ShardState::Reconnecting);
                        Some(())
                    }
                    ReconnectPolicy::Reidentify => {
                        info!(shard = self.id, ?code, "gateway closed, re-identifying");
                        self.drop_session();
                        self.state.store(ShardState::Reconnecting);
                        Some(())
                    }
                    ReconnectPolicy::Fatal => {
                        let error = match close_code {
                            Some(CloseCode::AuthenticationFailed) => GatewayError::Authentication,
                            Some(CloseCode::ShardingRequired) => GatewayError::ShardingRequired,
                            _ => GatewayError::Close {
                                code: code.unwrap_or_default(),
                            },
                        };
                        self.fail(error).await;
                        None
                    }
                }
            }
            ConnectionEnd::Transport(reason) => {
                debug!(shard = self.id, %reason, "transport dropped, resuming");
                self.emit(ShardEvent::Disconnected {
                    shard_id: self.id,
                    code: None,
                    reconnecting: true,
                })
                .await;
                self.state.store(ShardState::Reconnecting);
                Some(())
            }
            ConnectionEnd::Protocol(reason) => {
                // A malformed payload poisons the session; start fresh.
                warn!(shard = self.id, %reason, "protocol error, re-identifying");
                self.emit(ShardEvent::Disconnected {
                    shard_id: self.id,
                    code: None,
                    reconnecting: true,
                })
                .await;
                self.drop_session();
                self.state.store(ShardState::Reconnecting);
                Some(())
            }
            ConnectionEnd::HeartbeatTimeout => {
                warn!(shard = self.id, "heartbeat acks stopped, resuming");
                self.emit(ShardEvent::Disconnected {
                    shard_id: self.id,
                    code: Some(4000),
                    reconnecting: true,
                })
                .await;
                self.state.store(ShardState::Reconnecting);
                Some(())
            }
            ConnectionEnd::ReconnectRequested => {
                info!(shard = self.id, "server requested reconnect, resuming");
                self.state.store(ShardState::Reconnecting);
                Some(())
            }
            ConnectionEnd::InvalidSession { resumable } => {
                if resumable {
                    info!(shard = self.id, "invalid session (resumable), resuming");
                } else {
                    // The server wants a fresh session; stagger the
                    // identify as it instructs.
                    let delay = Duration::from_millis(1_000 + (rand::random::<u64>() % 4_000));
                    info!(shard = self.id, ?delay, "invalid session, re-identifying");
                    self.drop_session();
                    sleep(delay).await;
                }
                self.state.store(ShardState::Reconnecting);
                Some(())
            }
            ConnectionEnd::Disconnected | ConnectionEnd::Killed => {
                self.state.store(ShardState::Disconnected);
                self.emit(ShardEvent::Disconnected {
                    shard_id: self.id,
                    code: None,
                    reconnecting: false,
                })
                .await;
                None
            }
        }
    }

    async fn await_hello(&self, read: &mut WsRead) -> Result<cord_proto::Hello, GatewayError> {
        let deadline = timeout(HELLO_TIMEOUT, read.next());
        let frame = deadline
            .await
            .map_err(|_| GatewayError::Timeout)?
            .ok_or_else(|| GatewayError::Transport("socket closed before HELLO".into()))?
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let text = match frame {
            Message::Text(text) => text,
            other => {
                return Err(GatewayError::Protocol(format!(
                    "expected HELLO text frame, got {other:?}"
                )))
            }
        };

        let payload = GatewayPayload::from_json(&text)?;
        if payload.op != OpCode::Hello {
            return Err(GatewayError::Protocol(format!(
                "expected HELLO, got op {}",
                payload.op
            )));
        }
        Ok(payload.hello()?)
    }

    /// Send `RESUME` when a session is kept, `IDENTIFY` otherwise.
    async fn open_session(&self, write: &mut WsWrite) -> Result<(), GatewayError> {
        let kept = self.session_id.lock().clone();
        let frame = match (kept, self.sequence.get()) {
            (Some(session_id), Some(seq)) => {
                self.state.store(ShardState::Resuming);
                info!(shard = self.id, seq, "resuming session");
                GatewayPayload::resume(&Resume {
                    token: self.config.token.clone(),
                    session_id,
                    seq,
                })?
            }
            _ => {
                self.state.store(ShardState::Identifying);
                // The server allows one IDENTIFY per five seconds per
                // bot; the gate serializes the whole fleet.
                self.gate.acquire().await;
                info!(shard = self.id, total = self.total, "identifying");
                GatewayPayload::identify(&Identify {
                    token: self.config.token.clone(),
                    properties: IdentifyProperties::default(),
                    intents: self.config.intents,
                    shard: [self.id, self.total],
                    large_threshold: self.config.large_threshold,
                    compress: false,
                })?
            }
        };

        let json = frame.to_json()?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// The live event loop: socket frames in, heartbeats and commands
    /// out.
    async fn run_connection(
        &mut self,
        read: &mut WsRead,
        write: &mut WsWrite,
        mut beat_rx: mpsc::Receiver<GatewayPayload>,
        heartbeat: &HeartbeatHandle,
    ) -> ConnectionEnd {
        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_frame(&text, write, heartbeat).await {
                                Ok(None) => {}
                                Ok(Some(end)) => return end,
                                Err(err) => return ConnectionEnd::Protocol(err.to_string()),
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            return ConnectionEnd::Closed(code);
                        }
                        Some(Ok(_)) => {} // ping/pong/binary: ignored
                        Some(Err(err)) => return ConnectionEnd::Transport(err.to_string()),
                        None => return ConnectionEnd::Closed(None),
                    }
                }

                beat = beat_rx.recv() => {
                    match beat {
                        Some(frame) => {
                            // Heartbeats bypass the command budget.
                            if let Err(err) = self.send_frame(write, &frame).await {
                                return ConnectionEnd::Transport(err.to_string());
                            }
                        }
                        None => {
                            // The heartbeat task stopped itself: two
                            // beats unacked. Close with 4000 and resume.
                            let _ = write
                                .send(Message::Close(Some(CloseFrame {
                                    code: WsCloseCode::from(4000),
                                    reason: "heartbeat ack timeout".into(),
                                })))
                                .await;
                            return ConnectionEnd::HeartbeatTimeout;
                        }
                    }
                }

                command = self.commands.recv() => {
                    match command {
                        Some(ShardCommand::Send(frame)) => {
                            self.send_limiter.acquire().await;
                            if let Err(err) = self.send_frame(write, &frame).await {
                                return ConnectionEnd::Transport(err.to_string());
                            }
                        }
                        Some(ShardCommand::Disconnect) | None => {
                            let _ = write
                                .send(Message::Close(Some(CloseFrame {
                                    code: WsCloseCode::Normal,
                                    reason: "".into(),
                                })))
                                .await;
                            return ConnectionEnd::Disconnected;
                        }
                        Some(ShardCommand::Kill) => return ConnectionEnd::Killed,
                    }
                }
            }
        }
    }

    async fn send_frame(
        &self,
        write: &mut WsWrite,
        frame: &GatewayPayload,
    ) -> Result<(), GatewayError> {
        let json = frame.to_json()?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// Handle one text frame. `Ok(Some(end))` ends the connection.
    async fn handle_frame(
        &self,
        text: &str,
        write: &mut WsWrite,
        heartbeat: &HeartbeatHandle,
    ) -> Result<Option<ConnectionEnd>, GatewayError> {
        let payload = GatewayPayload::from_json(text)?;

        match payload.op {
            OpCode::Dispatch => {
                let seq = payload
                    .s
                    .ok_or(cord_proto::ProtoError::MissingField("s"))?;
                self.sequence.observe(seq);

                let name = payload
                    .t
                    .as_deref()
                    .ok_or(cord_proto::ProtoError::MissingField("t"))?;
                let event = Event::parse(name, payload.d)?;

                match &event {
                    Event::Ready(ready) => {
                        *self.session_id.lock() = Some(ready.session_id.clone());
                        self.state.store(ShardState::Ready);
                        info!(
                            shard = self.id,
                            session = %ready.session_id,
                            guilds = ready.guilds.len(),
                            "shard ready"
                        );
                        self.emit(ShardEvent::Ready {
                            shard_id: self.id,
                            ready: ready.clone(),
                        })
                        .await;
                    }
                    Event::Resumed => {
                        self.state.store(ShardState::Ready);
                        info!(shard = self.id, "session resumed");
                        self.emit(ShardEvent::Resumed { shard_id: self.id }).await;
                    }
                    _ => {}
                }

                self.emit(ShardEvent::Dispatch {
                    shard_id: self.id,
                    seq,
                    event,
                })
                .await;
                Ok(None)
            }
            OpCode::Heartbeat => {
                // Server asked for an immediate beat.
                let frame = GatewayPayload::heartbeat(self.sequence.get());
                self.send_frame(write, &frame).await?;
                Ok(None)
            }
            OpCode::HeartbeatAck => {
                heartbeat.ack_received();
                Ok(None)
            }
            OpCode::Reconnect => Ok(Some(ConnectionEnd::ReconnectRequested)),
            OpCode::InvalidSession => Ok(Some(ConnectionEnd::InvalidSession {
                resumable: payload.invalid_session_resumable(),
            })),
            OpCode::Hello => Ok(None), // interval changes are not renegotiated mid-stream
            other => {
                trace!(shard = self.id, op = %other, "ignoring frame");
                Ok(None)
            }
        }
    }

    fn drop_session(&self) {
        *self.session_id.lock() = None;
        self.sequence.reset();
    }

    async fn fail(&self, error: GatewayError) {
        warn!(shard = self.id, %error, "shard failed fatally");
        self.state.store(ShardState::Dead);
        self.emit(ShardEvent::Fatal {
            shard_id: self.id,
            error,
        })
        .await;
    }

    async fn emit(&self, event: ShardEvent) {
        if self.events.send(event).await.is_err() {
            debug!(shard = self.id, "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gateway_version_numbers() {
        assert_eq!(GatewayVersion::V6.as_u8(), 6);
        assert_eq!(GatewayVersion::V10.as_u8(), 10);
        assert_eq!(GatewayVersion::default(), GatewayVersion::V10);
    }

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::new("tok");
        assert_eq!(config.identify_spacing, Duration::from_secs(5));
        assert_eq!(config.version, GatewayVersion::V10);
        assert!(config.large_threshold.is_none());
    }

    #[test]
    fn test_sequence_tracker_starts_empty() {
        let tracker = SequenceTracker::new();
        assert_eq!(tracker.get(), None);
    }

    #[test]
    fn test_sequence_tracker_observes_and_resets() {
        let tracker = SequenceTracker::new();
        tracker.observe(5);
        assert_eq!(tracker.get(), Some(5));

        tracker.observe(9);
        assert_eq!(tracker.get(), Some(9));

        // Out-of-order server frames never move the sequence backwards.
        tracker.observe(3);
        assert_eq!(tracker.get(), Some(9));

        tracker.reset();
        assert_eq!(tracker.get(), None);
    }

    proptest! {
        #[test]
        fn sequence_equals_max_of_observed(seqs in proptest::collection::vec(1u64..1_000_000, 1..64)) {
            let tracker = SequenceTracker::new();
            for seq in &seqs {
                tracker.observe(*seq);
            }
            prop_assert_eq!(tracker.get(), seqs.iter().copied().max());
        }

        #[test]
        fn sequence_is_nondecreasing(seqs in proptest::collection::vec(1u64..1_000_000, 1..64)) {
            let tracker = SequenceTracker::new();
            let mut last = 0;
            for seq in &seqs {
                tracker.observe(*seq);
                let current = tracker.get().unwrap();
                prop_assert!(current >= last);
                last = current;
            }
        }
    }
}
