//! Host client
//!
//! Glues the transport, the frame demultiplexer, the payload codec, and the
//! store together. The transport is abstract: anything that can connect to an
//! address, push bytes, and report lifecycle events through the host loop
//! calling [`HostClient::on_connected`], [`HostClient::on_message`], and
//! [`HostClient::on_disconnected`].
//!
//! Reconnection is a single-shot timer: every disconnect or failed connect
//! schedules exactly one retry [`RECONNECT_TIME`] later, fired by
//! [`HostClient::poll`]. There is never more than one pending timer, and
//! [`HostClient::shutdown`] clears it.
//!
//! The store is never cleared on disconnect. Entities simply go stale until
//! the publishers announce themselves again after reconnect.

use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};

use crate::decoder::decode_payload;
use crate::encoder::encode_payload;
use crate::error::{FrameError, Result, TransportError};
use crate::framing::{FrameIter, FrameKind};
use crate::state::{Event, Path};
use crate::store::Store;
use crate::value::{Metric, Payload};

/// Delay between a disconnect and the reconnect attempt.
pub const RECONNECT_TIME: Duration = Duration::from_secs(5);

const OP_SYNC: u8 = 0;
const OP_PUBLISH: u8 = 1;
const OP_CONFIGURE: u8 = 2;

/// Topic namespace prefix for outbound command topics.
const TOPIC_NAMESPACE: &str = "spBv1.0";

/// A duplex byte-stream transport the client can drive.
///
/// `connect` initiates a connection attempt; depending on the
/// implementation, success may be reported synchronously (return `Ok`) with
/// the session established later via [`HostClient::on_connected`].
pub trait Transport {
    fn connect(&mut self, address: &str) -> std::result::Result<(), TransportError>;
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;
    fn close(&mut self);
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; `retry_at` is the pending reconnect deadline, if any
    Disconnected { retry_at: Option<Instant> },
    /// Connect initiated, session not yet confirmed
    Connecting,
    Connected,
}

/// The client: owns the transport, the store, and the reconnect timer.
pub struct HostClient<T: Transport> {
    transport: T,
    store: Store,
    address: String,
    state: ConnectionState,
}

impl<T: Transport> HostClient<T> {
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        HostClient {
            transport,
            store: Store::new(),
            address: address.into(),
            state: ConnectionState::Disconnected { retry_at: None },
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The store, for registering observers.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Initiate a connection attempt. A failure schedules the retry timer.
    pub fn connect(&mut self, now: Instant) {
        match self.transport.connect(&self.address) {
            Ok(()) => {
                debug!("connecting to {}", self.address);
                self.state = ConnectionState::Connecting;
            }
            Err(err) => {
                warn!("connect to {} failed: {err}", self.address);
                self.schedule_reconnect(now);
            }
        }
    }

    /// Fire the reconnect timer if its deadline has passed. Fires at most
    /// once per scheduled timer.
    pub fn poll(&mut self, now: Instant) {
        if let ConnectionState::Disconnected {
            retry_at: Some(retry_at),
        } = self.state
        {
            if now >= retry_at {
                self.state = ConnectionState::Disconnected { retry_at: None };
                self.connect(now);
            }
        }
    }

    /// The transport confirmed the session. Sends the initial state sync
    /// request.
    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        debug!("connected to {}", self.address);
        self.send_op(&[OP_SYNC]);
    }

    /// The transport lost the session. Schedules one reconnect; an already
    /// pending timer is left in place.
    pub fn on_disconnected(&mut self, now: Instant) {
        if let ConnectionState::Disconnected {
            retry_at: Some(_),
        } = self.state
        {
            return;
        }
        warn!("disconnected from {}", self.address);
        self.schedule_reconnect(now);
    }

    /// Stop for good: close the transport and clear any pending timer.
    pub fn shutdown(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected { retry_at: None };
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        self.state = ConnectionState::Disconnected {
            retry_at: Some(now + RECONNECT_TIME),
        };
    }

    /// Process one raw socket message: demultiplex, decode, reduce, notify.
    /// Entirely synchronous; observers have run by the time this returns.
    ///
    /// A frame that fails payload decode is dropped and the rest of the
    /// batch proceeds. A framing error ends the batch, because frame
    /// boundaries past it are unknowable.
    pub fn on_message(&mut self, data: &[u8]) {
        for frame in FrameIter::new(data) {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err @ FrameError::Truncated { .. }) => {
                    warn!("dropping rest of message batch: {err}");
                    return;
                }
                Err(err) => {
                    warn!("dropping frame: {err}");
                    continue;
                }
            };
            let Some(path) = Path::parse(frame.id) else {
                warn!("dropping frame with unusable identifier {:?}", frame.id);
                continue;
            };
            let event = match frame.kind {
                // Death carries no payload and never reads one.
                FrameKind::Death => Event::Death { path },
                FrameKind::Publish | FrameKind::Birth => {
                    if frame.payload.is_empty() {
                        continue;
                    }
                    let payload = match decode_payload(frame.payload) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!("dropping undecodable payload for {path}: {err}");
                            continue;
                        }
                    };
                    match frame.kind {
                        FrameKind::Publish => Event::Update { path, payload },
                        _ => Event::Birth { path, payload },
                    }
                }
            };
            self.store.dispatch(&event);
        }
    }

    /// Request a full state sync. Silent no-op unless connected.
    pub fn sync(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.send_op(&[OP_SYNC]);
    }

    /// Publish one metric as a command to a node or device. Silent no-op
    /// unless connected; commands are never queued.
    pub fn publish(&mut self, target: &Path, metric: Metric) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let payload = Payload {
            timestamp: Some(Utc::now().timestamp_millis() as u64),
            metrics: Some(vec![metric]),
            ..Default::default()
        };
        let body = encode_payload(&payload)?;
        let topic = command_topic(target);

        let mut message = Vec::with_capacity(1 + 4 + topic.len() + body.len());
        message.push(OP_PUBLISH);
        message.extend_from_slice(&(topic.len() as u32).to_le_bytes());
        message.extend_from_slice(topic.as_bytes());
        message.extend_from_slice(&body);
        self.send_op(&message);
        Ok(())
    }

    /// Tell the server which broker address to attach to. Silent no-op
    /// unless connected.
    pub fn configure(&mut self, address: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let mut message = Vec::with_capacity(1 + 4 + address.len());
        message.push(OP_CONFIGURE);
        message.extend_from_slice(&(address.len() as u32).to_le_bytes());
        message.extend_from_slice(address.as_bytes());
        self.send_op(&message);
    }

    fn send_op(&mut self, bytes: &[u8]) {
        if let Err(err) = self.transport.send(bytes) {
            // The transport will report the loss through on_disconnected;
            // the command itself is gone either way.
            warn!("send failed: {err}");
        }
    }
}

/// `spBv1.0/<group>/NCMD/<node>` for nodes,
/// `spBv1.0/<group>/DCMD/<node>/<device>` for devices.
fn command_topic(target: &Path) -> String {
    match &target.device {
        Some(device) => format!(
            "{TOPIC_NAMESPACE}/{}/DCMD/{}/{}",
            target.group, target.node, device
        ),
        None => format!("{TOPIC_NAMESPACE}/{}/NCMD/{}", target.group, target.node),
    }
}

/// In-memory transport for tests: records sent bytes, fails on demand.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub sent: Vec<Vec<u8>>,
    pub connect_attempts: usize,
    pub fail_connect: bool,
    pub fail_send: bool,
    pub connected: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, _address: &str) -> std::result::Result<(), TransportError> {
        self.connect_attempts += 1;
        if self.fail_connect {
            return Err(TransportError::ConnectionFailed("refused".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        if self.fail_send || !self.connected {
            return Err(TransportError::SendFailed("not connected".into()));
        }
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
