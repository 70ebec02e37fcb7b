//! Bidirectional frame forwarding between the client and upstream sockets.
//!
//! Each direction is a [`pump`]: read one frame, write it unchanged, repeat.
//! The two pumps share one cancellation token. Whichever stops first cancels
//! it, and the sibling stops at its next read or write. [`relay`] runs both
//! pumps and then closes both sinks, once each.

use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message as AxumMessage};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::{
    Message as WsMessage,
    protocol::{CloseFrame as WsCloseFrame, frame::coding::CloseCode},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message size cap applied to both sockets.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const PREVIEW_CHARS: usize = 120;

/// Status code and reason of a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// A transport-neutral WebSocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl From<AxumMessage> for Frame {
    fn from(msg: AxumMessage) -> Self {
        match msg {
            AxumMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            AxumMessage::Binary(data) => Frame::Binary(data),
            AxumMessage::Ping(data) => Frame::Ping(data),
            AxumMessage::Pong(data) => Frame::Pong(data),
            AxumMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for AxumMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => AxumMessage::Text(text.into()),
            Frame::Binary(data) => AxumMessage::Binary(data),
            Frame::Ping(data) => AxumMessage::Ping(data),
            Frame::Pong(data) => AxumMessage::Pong(data),
            Frame::Close(reason) => AxumMessage::Close(reason.map(|r| AxumCloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

impl From<WsMessage> for Frame {
    fn from(msg: WsMessage) -> Self {
        match msg {
            WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WsMessage::Binary(data) => Frame::Binary(data),
            WsMessage::Ping(data) => Frame::Ping(data),
            WsMessage::Pong(data) => Frame::Pong(data),
            WsMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned(),
            })),
            WsMessage::Frame(raw) => Frame::Binary(Bytes::copy_from_slice(raw.payload())),
        }
    }
}

impl From<Frame> for WsMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(data) => WsMessage::Binary(data),
            Frame::Ping(data) => WsMessage::Ping(data),
            Frame::Pong(data) => WsMessage::Pong(data),
            Frame::Close(reason) => WsMessage::Close(reason.map(|r| WsCloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The source sent a close frame or ended.
    SourceClosed,
    SourceError,
    SinkError,
    /// The shared token fired, because the sibling stopped or the server is
    /// shutting down.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub client_to_upstream: PumpExit,
    pub upstream_to_client: PumpExit,
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

/// Copies frames from `source` to `sink` until either side fails, the source
/// closes, or `cancel` fires. Always cancels `cancel` on the way out.
///
/// Ping and pong frames are answered by each transport and are not relayed.
/// A close frame that carries a code is passed on to `sink` so the other
/// peer sees why the session ended.
pub async fn pump<R, W, In, Out, E>(
    direction: Direction,
    source: &mut R,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PumpExit
where
    R: Stream<Item = Result<In, E>> + Unpin,
    In: Into<Frame>,
    E: fmt::Display,
    W: Sink<Out> + Unpin,
    W::Error: fmt::Display,
    Out: From<Frame>,
{
    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            next = source.next() => next,
        };

        let frame: Frame = match next {
            None => break PumpExit::SourceClosed,
            Some(Err(e)) => {
                warn!(%direction, error = %e, "Read failed; stopping relay");
                break PumpExit::SourceError;
            }
            Some(Ok(msg)) => msg.into(),
        };

        match &frame {
            Frame::Close(reason) => {
                info!(%direction, ?reason, "Close frame received");
                if let Some(reason) = reason {
                    let close = Out::from(Frame::Close(Some(reason.clone())));
                    match timeout(CLOSE_TIMEOUT, sink.send(close)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!(%direction, error = %e, "Close frame not forwarded"),
                        Err(_) => warn!(%direction, "Timed out forwarding close frame"),
                    }
                }
                break PumpExit::SourceClosed;
            }
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Text(text) => {
                debug!(%direction, len = text.len(), preview = %preview(text), "Relaying text frame")
            }
            Frame::Binary(data) => debug!(%direction, len = data.len(), "Relaying binary frame"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            sent = sink.send(Out::from(frame)) => {
                if let Err(e) = sent {
                    warn!(%direction, error = %e, "Write failed; stopping relay");
                    break PumpExit::SinkError;
                }
            }
        }
    };

    debug!(%direction, ?exit, "Pump stopped");
    cancel.cancel();
    exit
}

/// Closes a sink, bounded by a timeout. Failures are only logged.
pub async fn close_sink<S, M>(side: &'static str, sink: &mut S)
where
    S: Sink<M> + Unpin,
    S::Error: fmt::Display,
{
    match timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => debug!(side, "Socket closed"),
        Ok(Err(e)) => debug!(side, error = %e, "Socket close reported an error"),
        Err(_) => warn!(side, "Timed out closing socket"),
    }
}

/// Runs both directions concurrently until one stops, then closes the
/// client sink and the upstream sink exactly once each.
pub async fn relay<CR, CW, UR, UW, CIn, COut, CE, UIn, UOut, UE>(
    client_rx: &mut CR,
    client_tx: &mut CW,
    upstream_rx: &mut UR,
    upstream_tx: &mut UW,
    cancel: &CancellationToken,
) -> RelayOutcome
where
    CR: Stream<Item = Result<CIn, CE>> + Unpin,
    CW: Sink<COut> + Unpin,
    CW::Error: fmt::Display,
    CIn: Into<Frame>,
    COut: From<Frame>,
    CE: fmt::Display,
    UR: Stream<Item = Result<UIn, UE>> + Unpin,
    UW: Sink<UOut> + Unpin,
    UW::Error: fmt::Display,
    UIn: Into<Frame>,
    UOut: From<Frame>,
    UE: fmt::Display,
{
    let (client_to_upstream, upstream_to_client) = tokio::join!(
        pump(Direction::ClientToUpstream, client_rx, upstream_tx, cancel),
        pump(Direction::UpstreamToClient, upstream_rx, client_tx, cancel),
    );

    close_sink("upstream", upstream_tx).await;
    close_sink("client", client_tx).await;

    RelayOutcome {
        client_to_upstream,
        upstream_to_client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
    use std::{
        pin::Pin,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        task::{Context, Poll},
    };

    /// A sink that records what it was sent and how often it was closed.
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Frame>>>,
        closes: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Default::default()
            }
        }

        fn frames(&self) -> Vec<Frame> {
            self.sent.lock().unwrap().clone()
        }

        fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl Sink<Frame> for RecordingSink {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), String> {
            if self.fail_writes {
                return Err("connection reset".to_string());
            }
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    type Source = UnboundedReceiver<Result<Frame, String>>;
    type Feed = UnboundedSender<Result<Frame, String>>;

    struct Harness {
        client_feed: Feed,
        upstream_feed: Feed,
        client_rx: Source,
        upstream_rx: Source,
        client_tx: RecordingSink,
        upstream_tx: RecordingSink,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_sinks(RecordingSink::default(), RecordingSink::default())
        }

        fn with_sinks(client_tx: RecordingSink, upstream_tx: RecordingSink) -> Self {
            let (client_feed, client_rx) = unbounded();
            let (upstream_feed, upstream_rx) = unbounded();
            Self {
                client_feed,
                upstream_feed,
                client_rx,
                upstream_rx,
                client_tx,
                upstream_tx,
            }
        }

        async fn run(mut self, cancel: CancellationToken) -> (RelayOutcome, RecordingSink, RecordingSink) {
            let outcome = tokio::time::timeout(
                Duration::from_secs(5),
                relay(
                    &mut self.client_rx,
                    &mut self.client_tx,
                    &mut self.upstream_rx,
                    &mut self.upstream_tx,
                    &cancel,
                ),
            )
            .await
            .expect("relay must terminate");
            (outcome, self.client_tx, self.upstream_tx)
        }
    }

    fn assert_closed_once(client: &RecordingSink, upstream: &RecordingSink) {
        assert_eq!(client.close_count(), 1, "client closed once");
        assert_eq!(upstream.close_count(), 1, "upstream closed once");
    }

    #[tokio::test]
    async fn test_frames_forwarded_in_order_with_kind_preserved() {
        let harness = Harness::new();
        let client_feed = harness.client_feed.clone();
        let upstream_feed = harness.upstream_feed.clone();

        client_feed.unbounded_send(Ok(Frame::Text("one".into()))).unwrap();
        client_feed.unbounded_send(Ok(Frame::Ping(Bytes::from_static(b"p")))).unwrap();
        client_feed
            .unbounded_send(Ok(Frame::Binary(Bytes::from_static(&[1, 2, 3]))))
            .unwrap();
        client_feed.unbounded_send(Ok(Frame::Text("three".into()))).unwrap();
        upstream_feed
            .unbounded_send(Ok(Frame::Binary(Bytes::from_static(b"audio"))))
            .unwrap();

        let cancel = CancellationToken::new();
        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };
        let (_, client, upstream) = harness.run(cancel).await;
        stopper.await.unwrap();

        assert_eq!(
            upstream.frames(),
            vec![
                Frame::Text("one".into()),
                Frame::Binary(Bytes::from_static(&[1, 2, 3])),
                Frame::Text("three".into()),
            ]
        );
        assert_eq!(client.frames(), vec![Frame::Binary(Bytes::from_static(b"audio"))]);
        drop((client_feed, upstream_feed));
    }

    #[tokio::test]
    async fn test_client_close_stops_both_directions() {
        let harness = Harness::new();
        let upstream_feed = harness.upstream_feed.clone();
        harness.client_feed.unbounded_send(Ok(Frame::Close(None))).unwrap();

        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;

        assert_eq!(outcome.client_to_upstream, PumpExit::SourceClosed);
        assert_eq!(outcome.upstream_to_client, PumpExit::Cancelled);
        assert_closed_once(&client, &upstream);
        drop(upstream_feed);
    }

    #[tokio::test]
    async fn test_upstream_end_of_stream_stops_both_directions() {
        let harness = Harness::new();
        harness.upstream_feed.close_channel();

        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;

        assert_eq!(outcome.upstream_to_client, PumpExit::SourceClosed);
        assert_eq!(outcome.client_to_upstream, PumpExit::Cancelled);
        assert_closed_once(&client, &upstream);
    }

    #[tokio::test]
    async fn test_read_error_on_either_side_stops_relay() {
        let harness = Harness::new();
        let upstream_feed = harness.upstream_feed.clone();
        harness
            .client_feed
            .unbounded_send(Err("protocol violation".into()))
            .unwrap();
        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;
        assert_eq!(outcome.client_to_upstream, PumpExit::SourceError);
        assert_closed_once(&client, &upstream);
        drop(upstream_feed);

        let harness = Harness::new();
        let client_feed = harness.client_feed.clone();
        harness
            .upstream_feed
            .unbounded_send(Err("connection reset".into()))
            .unwrap();
        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;
        assert_eq!(outcome.upstream_to_client, PumpExit::SourceError);
        assert_eq!(outcome.client_to_upstream, PumpExit::Cancelled);
        assert_closed_once(&client, &upstream);
        drop(client_feed);
    }

    #[tokio::test]
    async fn test_write_error_stops_relay() {
        let harness = Harness::with_sinks(RecordingSink::default(), RecordingSink::failing());
        let upstream_feed = harness.upstream_feed.clone();
        harness
            .client_feed
            .unbounded_send(Ok(Frame::Text("hi".into())))
            .unwrap();

        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;

        assert_eq!(outcome.client_to_upstream, PumpExit::SinkError);
        assert_closed_once(&client, &upstream);
        drop(upstream_feed);
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_blocked_pumps() {
        let harness = Harness::new();
        let client_feed = harness.client_feed.clone();
        let upstream_feed = harness.upstream_feed.clone();
        // Only one side ever receives data.
        upstream_feed
            .unbounded_send(Ok(Frame::Text("greeting".into())))
            .unwrap();

        let server = CancellationToken::new();
        let session = server.child_token();
        let other_session = server.child_token();

        let shutdown = {
            let server = server.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                server.cancel();
            })
        };
        let (outcome, client, upstream) = harness.run(session).await;
        shutdown.await.unwrap();

        assert_eq!(outcome.client_to_upstream, PumpExit::Cancelled);
        assert_eq!(outcome.upstream_to_client, PumpExit::Cancelled);
        assert_eq!(client.frames(), vec![Frame::Text("greeting".into())]);
        assert_closed_once(&client, &upstream);
        assert!(other_session.is_cancelled());
        drop((client_feed, upstream_feed));
    }

    #[tokio::test]
    async fn test_session_cancellation_does_not_reach_other_sessions() {
        let server = CancellationToken::new();
        let first = server.child_token();
        let second = server.child_token();

        let harness = Harness::new();
        harness.client_feed.unbounded_send(Ok(Frame::Close(None))).unwrap();
        let upstream_feed = harness.upstream_feed.clone();
        let (outcome, _, _) = harness.run(first.clone()).await;
        assert_eq!(outcome.client_to_upstream, PumpExit::SourceClosed);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!server.is_cancelled());
        drop(upstream_feed);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_frame_conversions_preserve_kind() {
        let text = AxumMessage::from(Frame::Text("hi".into()));
        assert!(matches!(&text, AxumMessage::Text(t) if t.as_str() == "hi"));
        assert_eq!(Frame::from(text), Frame::Text("hi".into()));

        let binary = WsMessage::from(Frame::Binary(Bytes::from_static(b"\x00\x01")));
        assert!(matches!(&binary, WsMessage::Binary(b) if b.as_ref() == b"\x00\x01"));
        assert_eq!(Frame::from(binary), Frame::Binary(Bytes::from_static(b"\x00\x01")));

        assert_eq!(Frame::from(WsMessage::Close(None)), Frame::Close(None));
        assert_eq!(Frame::from(AxumMessage::Close(None)), Frame::Close(None));

        let reason = CloseReason {
            code: 1008,
            reason: "policy".into(),
        };
        let ws = WsMessage::from(Frame::Close(Some(reason.clone())));
        assert!(matches!(&ws, WsMessage::Close(Some(f)) if u16::from(f.code) == 1008));
        let axum = AxumMessage::from(Frame::from(ws));
        assert!(matches!(
            &axum,
            AxumMessage::Close(Some(f)) if f.code == 1008 && f.reason.as_str() == "policy"
        ));
        assert_eq!(Frame::from(axum), Frame::Close(Some(reason)));
    }

    #[tokio::test]
    async fn test_upstream_close_reason_reaches_client() {
        let harness = Harness::new();
        let client_feed = harness.client_feed.clone();
        let reason = CloseReason {
            code: 4000,
            reason: "session expired".into(),
        };
        harness
            .upstream_feed
            .unbounded_send(Ok(Frame::Close(Some(reason.clone()))))
            .unwrap();

        let (outcome, client, upstream) = harness.run(CancellationToken::new()).await;

        assert_eq!(outcome.upstream_to_client, PumpExit::SourceClosed);
        assert_eq!(client.frames(), vec![Frame::Close(Some(reason))]);
        assert!(upstream.frames().is_empty());
        assert_closed_once(&client, &upstream);
        drop(client_feed);
    }
}
