//! Owns the duplex channel lifecycle: connect, detect loss, reconnect.
//!
//! One supervisor task per session drives the channel. Each connection
//! attempt arms a fresh set of wire callbacks; on loss the supervisor waits a
//! fixed delay and tries again, forever. Nothing is replayed: the reassembly
//! engine recovers on its own because the next turn boundary is
//! authoritative.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

/// Fixed delay between reconnection attempts. No backoff, no jitter.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const OUTBOUND_QUEUE: usize = 64;

/// Lifecycle state of the logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    /// Terminal; only explicit user shutdown reaches this.
    Closed = 3,
}

/// Shared, lock-free view of the channel state.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicU8>);

impl LinkStatus {
    pub fn get(&self) -> LinkState {
        match self.0.load(Ordering::SeqCst) {
            1 => LinkState::Connecting,
            2 => LinkState::Open,
            3 => LinkState::Closed,
            _ => LinkState::Disconnected,
        }
    }

    pub(crate) fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Claims the right to start a connection attempt. Returns false when an
    /// attempt is already open or connecting (or the channel is closed for
    /// good), making reconnection idempotent.
    pub(crate) fn try_begin_connect(&self) -> bool {
        self.0
            .compare_exchange(
                LinkState::Disconnected as u8,
                LinkState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Notifications delivered to the session's single event consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Opened,
    Text(String),
    Closed,
}

/// One outbound wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// A JSON text frame (typed message or image envelope).
    Text(String),
    /// A raw PCM capture frame, sent unenveloped.
    Audio(Vec<u8>),
}

/// A cheap handle for producing outbound frames from any thread.
///
/// Sending is a guarded no-op: frames offered while the channel is not open
/// are dropped, never queued. A stale backlog of media is worse than a gap.
#[derive(Clone)]
pub struct FrameSender {
    status: LinkStatus,
    tx: mpsc::Sender<OutboundFrame>,
}

impl FrameSender {
    pub(crate) fn new(status: LinkStatus, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { status, tx }
    }

    pub fn send(&self, frame: OutboundFrame) {
        if self.status.get() != LinkState::Open {
            debug!("dropping outbound frame while channel is not open");
            return;
        }
        if let Err(err) = self.tx.try_send(frame) {
            warn!(%err, "outbound queue saturated; frame dropped");
        }
    }

    pub fn status(&self) -> LinkState {
        self.status.get()
    }
}

/// The session's connection manager. Owns the supervisor task; all other
/// components interact only through [`FrameSender`] and [`WireEvent`]s.
pub struct Connection {
    status: LinkStatus,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    supervisor: JoinHandle<()>,
}

impl Connection {
    /// Opens the logical channel. Returns immediately; `WireEvent::Opened`
    /// arrives once the underlying connection is established.
    pub fn open(url: String, events_tx: mpsc::Sender<WireEvent>) -> Self {
        let status = LinkStatus::default();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let supervisor = tokio::spawn(supervise(url, status.clone(), outbound_rx, events_tx));
        Self {
            status,
            outbound_tx,
            supervisor,
        }
    }

    pub fn sender(&self) -> FrameSender {
        FrameSender::new(self.status.clone(), self.outbound_tx.clone())
    }

    pub fn send(&self, frame: OutboundFrame) {
        self.sender().send(frame);
    }

    pub fn status(&self) -> LinkState {
        self.status.get()
    }

    /// Tears the channel down for good, cancelling any pending reconnect.
    pub fn close(self) {
        self.status.set(LinkState::Closed);
        self.supervisor.abort();
        info!("channel closed");
    }
}

async fn supervise(
    url: String,
    status: LinkStatus,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    events_tx: mpsc::Sender<WireEvent>,
) {
    loop {
        if status.try_begin_connect() {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    status.set(LinkState::Open);
                    info!(%url, "channel open");
                    if events_tx.send(WireEvent::Opened).await.is_err() {
                        return;
                    }
                    // Frames that raced into the queue while the link was
                    // down are stale; start the new connection clean.
                    while outbound_rx.try_recv().is_ok() {}
                    pump(stream, &mut outbound_rx, &events_tx).await;
                    status.set(LinkState::Disconnected);
                    if events_tx.send(WireEvent::Closed).await.is_err() {
                        return;
                    }
                    warn!(
                        delay_secs = RECONNECT_DELAY.as_secs(),
                        "channel lost; will reconnect"
                    );
                }
                Err(err) => {
                    status.set(LinkState::Disconnected);
                    error!(%err, delay_secs = RECONNECT_DELAY.as_secs(), "connect failed");
                }
            }
        } else if status.get() == LinkState::Closed {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Proxies frames in both directions until the connection drops.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::Receiver<OutboundFrame>,
    events_tx: &mpsc::Sender<WireEvent>,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();
    loop {
        tokio::select! {
            Some(frame) = outbound_rx.recv() => {
                let message = match frame {
                    OutboundFrame::Text(json) => WsMessage::Text(json.into()),
                    OutboundFrame::Audio(pcm) => WsMessage::Binary(pcm.into()),
                };
                if let Err(err) = ws_tx.send(message).await {
                    error!(%err, "send failed; dropping connection");
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        if events_tx.send(WireEvent::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "server closed the channel");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(other)) => {
                        debug!(?other, "ignoring non-text frame");
                    }
                    Some(Err(err)) => {
                        error!(%err, "channel error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_connect_is_claimed_once() {
        let status = LinkStatus::default();
        assert!(status.try_begin_connect());
        // A second attempt while connecting is skipped.
        assert!(!status.try_begin_connect());
    }

    #[test]
    fn begin_connect_skipped_while_open() {
        let status = LinkStatus::default();
        status.set(LinkState::Open);
        assert!(!status.try_begin_connect());
        assert_eq!(status.get(), LinkState::Open);
    }

    #[test]
    fn begin_connect_never_resurrects_a_closed_channel() {
        let status = LinkStatus::default();
        status.set(LinkState::Closed);
        assert!(!status.try_begin_connect());
        assert_eq!(status.get(), LinkState::Closed);
    }

    #[test]
    fn send_while_disconnected_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = FrameSender {
            status: LinkStatus::default(),
            tx,
        };
        sender.send(OutboundFrame::Text("lost".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_while_open_goes_through() {
        let (tx, mut rx) = mpsc::channel(4);
        let status = LinkStatus::default();
        status.set(LinkState::Open);
        let sender = FrameSender { status, tx };
        sender.send(OutboundFrame::Audio(vec![1, 2]));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Audio(vec![1, 2]));
    }

    #[test]
    fn send_on_saturated_queue_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let status = LinkStatus::default();
        status.set(LinkState::Open);
        let sender = FrameSender { status, tx };
        sender.send(OutboundFrame::Audio(vec![0; 4]));
        // The queue is full now; this must drop, not wait.
        sender.send(OutboundFrame::Audio(vec![0; 4]));
    }
}
