//! The socket transport seam.
//!
//! `TwsTransport` is the boundary to the vendor socket codec: it frames and
//! writes typed requests and feeds decoded callbacks into the event channel
//! handed to [`crate::gateway::SocketGateway::start`]. One writer holds the
//! socket; implementations serialize concurrent senders internally.

use crate::api::{RequestKind, TwsEvent, TwsRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use riskguard_core::{BrokerError, BrokerResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Transport for the TWS socket protocol.
#[async_trait]
pub trait TwsTransport: Send + Sync {
    /// (Re)establish the socket session. Idempotent when already connected.
    async fn connect(&self) -> BrokerResult<()>;

    async fn disconnect(&self);

    /// Frame and write one request. Fails only on transport problems;
    /// broker-level rejections arrive as `Error` events.
    async fn send(&self, request: TwsRequest) -> BrokerResult<()>;

    fn is_connected(&self) -> bool;

    /// True when the handshake completes asynchronously and `StartApi` must
    /// be sent once `ConnectAck` arrives.
    fn is_async_connect(&self) -> bool {
        false
    }
}

/// Scripted transport for tests.
///
/// Responses are registered per request kind and replayed into the event
/// channel when a matching request is sent. Correlation ids inside scripted
/// events are rewritten to the id of the triggering request, so scripts can
/// be written without knowing which ids the gateway will allocate.
pub struct MockTransport {
    events_tx: mpsc::Sender<TwsEvent>,
    scripts: Mutex<HashMap<RequestKind, VecDeque<Vec<TwsEvent>>>>,
    connect_events: Mutex<Vec<TwsEvent>>,
    sent: Mutex<Vec<TwsRequest>>,
    connected: AtomicBool,
}

impl MockTransport {
    /// Create a disconnected mock and the event channel for the gateway.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::Receiver<TwsEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let transport = Arc::new(Self {
            events_tx,
            scripts: Mutex::new(HashMap::new()),
            connect_events: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        });
        (transport, events_rx)
    }

    /// Queue the events replayed for the next request of `kind`.
    pub fn script(&self, kind: RequestKind, events: Vec<TwsEvent>) {
        self.scripts
            .lock()
            .entry(kind)
            .or_default()
            .push_back(events);
    }

    /// Events replayed on every `connect` (handshake traffic such as
    /// `ConnectAck` and `NextValidId`).
    pub fn on_connect(&self, events: Vec<TwsEvent>) {
        *self.connect_events.lock() = events;
    }

    /// Push an unsolicited event (broadcast errors, connection loss).
    pub async fn emit(&self, event: TwsEvent) {
        let _ = self.events_tx.send(event).await;
    }

    /// Requests recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<TwsRequest> {
        self.sent.lock().clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl TwsTransport for MockTransport {
    async fn connect(&self) -> BrokerResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        let events = self.connect_events.lock().clone();
        for event in events {
            let _ = self.events_tx.send(event).await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn send(&self, request: TwsRequest) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected("mock transport is closed".to_string()));
        }

        let correlation_id = request_correlation_id(&request);
        let kind = request.kind();
        self.sent.lock().push(request);

        let scripted = self.scripts.lock().get_mut(&kind).and_then(VecDeque::pop_front);
        if let Some(events) = scripted {
            for event in events {
                let event = match correlation_id {
                    Some(id) => with_correlation_id(event, id),
                    None => event,
                };
                let _ = self.events_tx.send(event).await;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn request_correlation_id(request: &TwsRequest) -> Option<i64> {
    match request {
        TwsRequest::ReqMktData { req_id, .. } => Some(*req_id),
        TwsRequest::PlaceOrder { order_id, .. } => Some(*order_id),
        _ => None,
    }
}

fn with_correlation_id(event: TwsEvent, id: i64) -> TwsEvent {
    match event {
        TwsEvent::TickPrice { field, price, .. } => TwsEvent::TickPrice {
            req_id: id,
            field,
            price,
        },
        TwsEvent::TickSnapshotEnd { .. } => TwsEvent::TickSnapshotEnd { req_id: id },
        TwsEvent::OrderStatus { status, .. } => TwsEvent::OrderStatus {
            order_id: id,
            status,
        },
        TwsEvent::Error { code, message, .. } => TwsEvent::Error {
            req_id: id,
            code,
            message,
        },
        other => other,
    }
}
