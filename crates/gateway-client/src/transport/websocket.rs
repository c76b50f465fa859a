//! WebSocket frame transport
//!
//! Owns one physical socket, split into a send loop and a receive loop.

use super::codec::{decode_binary, decode_text, fragment, DEFAULT_FRAGMENT_SIZE};
use super::{TransportError, TransportResult};
use crate::protocol::Payload;
use futures::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode as WsCloseCode, Data, OpCode as WsOpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Status sent when no gateway-specific status applies
const NORMAL_CLOSURE: u16 = 1000;

/// Status reported when the server closes without giving one
const NO_STATUS_RECEIVED: u16 = 1005;

/// Transport tuning
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest frame body written in one piece
    pub fragment_size: usize,
    /// How long `shutdown` waits for the close handshake before cancelling the loops
    pub close_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Events emitted by the receive loop
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete message decoded into a payload
    Message(Payload),
    /// The connection ended without us asking for it; emitted at most once
    Fatal(TransportError),
}

/// Items consumed by the send loop
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close(CloseFrame<'static>),
}

/// State shared by the two loops and the handle
struct Shared {
    /// Set once we asked for the close; errors after this point are expected
    closing: AtomicBool,
    /// Set once the single terminal event has been emitted
    terminated: AtomicBool,
    /// Hard stop for both loops
    cancel: CancellationToken,
    /// The peer's close frame arrived; the send loop flushes the reply and exits
    close_received: CancellationToken,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn fail(&self, error: TransportError) {
        if self.is_closing() {
            tracing::debug!(error = %error, "Ignoring transport error during close");
            return;
        }
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(error = %error, "Transport failed");
        let _ = self.events.send(TransportEvent::Fatal(error));
    }
}

/// One physical WebSocket connection
///
/// Outgoing text is queued on an unbounded FIFO and written by a single send loop,
/// so frames reach the socket in `send` order. Control traffic is low-volume,
/// which is what keeps the unbounded queue acceptable.
pub struct FrameTransport {
    url: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl FrameTransport {
    /// Open the socket and start the send and receive loops
    ///
    /// Returns once the WebSocket handshake has completed, together with the
    /// receiver for decoded payloads and the terminal event.
    pub async fn connect(
        url: &str,
        config: TransportConfig,
    ) -> TransportResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(TransportError::HandshakeFailed)?;

        tracing::debug!(url = %url, "WebSocket connection established");

        let (sink, source) = socket.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            closing: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            close_received: CancellationToken::new(),
            events: events_tx,
        });

        let send_task = tokio::spawn(
            send_loop(sink, outgoing_rx, shared.clone(), config.fragment_size)
                .instrument(tracing::Span::current()),
        );
        let receive_task = tokio::spawn(
            receive_loop(source, shared.clone()).instrument(tracing::Span::current()),
        );

        Ok((
            Self {
                url: url.to_string(),
                outgoing: outgoing_tx,
                shared,
                tasks: Mutex::new(vec![send_task, receive_task]),
                close_timeout: config.close_timeout,
            },
            events_rx,
        ))
    }

    /// URL this transport is connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue text for sending; never blocks
    pub fn send(&self, text: String) -> TransportResult<()> {
        if self.shared.is_closing() {
            return Err(TransportError::Closed);
        }
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Serialize and queue a payload
    pub fn send_payload(&self, payload: &Payload) -> TransportResult<()> {
        tracing::trace!(op = %payload.op, "Queueing payload");
        self.send(payload.to_json()?)
    }

    /// Request a graceful close with the given status
    ///
    /// Idempotent; only the first call queues a close frame. Frames queued
    /// before the close are still written ahead of it.
    pub fn close(&self, code: u16, reason: &str) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(code = code, reason = %reason, "Closing transport");
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        if self.outgoing.send(Outgoing::Close(frame)).is_err() {
            // Send loop already gone; nothing left to flush
            self.shared.cancel.cancel();
        }
    }

    /// Check if a close has been requested
    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Close the socket and wait until both loops have exited
    pub async fn shutdown(&self) {
        self.close(NORMAL_CLOSURE, "");

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        let joined = futures::future::join_all(tasks);
        tokio::pin!(joined);
        if tokio::time::timeout(self.close_timeout, joined.as_mut()).await.is_err() {
            tracing::debug!("Close handshake timed out, cancelling transport loops");
            self.shared.cancel.cancel();
            joined.await;
        }
    }
}

impl Drop for FrameTransport {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
    }
}

impl std::fmt::Debug for FrameTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTransport")
            .field("url", &self.url)
            .field("closing", &self.shared.is_closing())
            .finish()
    }
}

/// Single consumer of the outgoing queue
async fn send_loop(
    mut sink: WsSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    shared: Arc<Shared>,
    fragment_size: usize,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            () = shared.close_received.cancelled() => {
                flush_close_reply(&mut sink, &shared).await;
                break;
            }
            item = outgoing.recv() => item,
        };

        match item {
            Some(Outgoing::Text(text)) => {
                let result = tokio::select! {
                    () = shared.cancel.cancelled() => break,
                    result = write_text(&mut sink, &text, fragment_size) => result,
                };
                if let Err(e) = result {
                    shared.fail(TransportError::Faulted(e));
                    break;
                }
            }
            Some(Outgoing::Close(frame)) => {
                let result = tokio::select! {
                    () = shared.cancel.cancelled() => break,
                    result = sink.send(Message::Close(Some(frame))) => result,
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
            None => break,
        }
    }

    tracing::trace!("Send loop exited");
}

/// Push out the close reply the WebSocket layer queued for the peer's close frame
async fn flush_close_reply(sink: &mut WsSink, shared: &Shared) {
    let result = tokio::select! {
        () = shared.cancel.cancelled() => return,
        result = sink.flush() => result,
    };
    match result {
        Ok(()) => tracing::trace!("Close reply flushed"),
        Err(e) if is_expected_close_error(&e) => {}
        Err(e) => tracing::debug!(error = %e, "Close reply not delivered"),
    }
}

/// Write one message, fragmenting it when it exceeds `fragment_size`
///
/// `SinkExt::send` flushes, so each frame is fully written before the next starts.
async fn write_text(sink: &mut WsSink, text: &str, fragment_size: usize) -> Result<(), tungstenite::Error> {
    if text.len() <= fragment_size {
        return sink.send(Message::Text(text.to_string())).await;
    }

    let parts = fragment(text, fragment_size);
    let last = parts.len() - 1;
    for (index, part) in parts.into_iter().enumerate() {
        let opcode = if index == 0 {
            WsOpCode::Data(Data::Text)
        } else {
            WsOpCode::Data(Data::Continue)
        };
        let frame = Frame::message(part.to_vec(), opcode, index == last);
        sink.send(Message::Frame(frame)).await?;
    }

    Ok(())
}

/// Reads complete messages until the socket ends
///
/// Fragment reassembly happens in the WebSocket layer; each item here is a
/// whole message. A close frame ends the loop whichever side started the
/// close, so teardown never waits on the peer to drop TCP.
async fn receive_loop(mut source: WsSource, shared: Arc<Shared>) {
    let close_received = loop {
        let next = tokio::select! {
            () = shared.cancel.cancelled() => break false,
            next = source.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => deliver(&shared, decode_text(&text)),
            Some(Ok(Message::Binary(bytes))) => deliver(&shared, decode_binary(&bytes)),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or_else(
                    || (NO_STATUS_RECEIVED, String::new()),
                    |f| (u16::from(f.code), f.reason.into_owned()),
                );
                tracing::debug!(code = code, reason = %reason, "Close frame received");
                shared.fail(TransportError::RemoteClosed { code, reason });
                break true;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                tracing::trace!("Control frame received");
            }
            Some(Err(e)) => {
                if is_expected_close_error(&e) {
                    tracing::trace!(error = %e, "Socket finished closing");
                } else {
                    shared.fail(TransportError::Faulted(e));
                }
                break false;
            }
            None => {
                shared.fail(TransportError::ConnectionLost);
                break false;
            }
        }
    };

    // Receive side is done; stop the send loop too
    if close_received {
        shared.close_received.cancel();
    } else {
        shared.cancel.cancel();
    }
    tracing::trace!("Receive loop exited");
}

fn deliver(shared: &Shared, decoded: TransportResult<Payload>) {
    match decoded {
        Ok(payload) => {
            tracing::trace!(op = %payload.op, "Payload received");
            let _ = shared.events.send(TransportEvent::Message(payload));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable frame");
        }
    }
}

/// Errors that are the normal tail of a close handshake rather than a fault
fn is_expected_close_error(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}
