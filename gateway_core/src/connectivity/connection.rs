//! The WebSocket stream connection (C6). One engine, driven by per-venue
//! hooks, implements the state machine and keepalive/reconnect rules of
//! §4.6; grounded on the teacher's `WebSocketConnection` (single
//! writer-mutex, split reader task, heartbeat task) generalized from one
//! fixed ping/pong pair to the four keepalive regimes this spec requires.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gateway_domain::VenueTag;
use gateway_utils::cancellation_token::CancellationToken;
use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::filters::reconnect_backoff;

pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The four named private variants, plus the shared public-market variant
/// dispatched by venue tag (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVariant {
    ReferencePublic,
    ReferenceUserStream,
    MarketPublic(VenueTag),
    VenueBPrivate,
    VenueCPrivate,
    VenueDPrivate,
}

impl StreamVariant {
    pub fn venue(&self) -> VenueTag {
        match self {
            StreamVariant::ReferencePublic | StreamVariant::ReferenceUserStream => VenueTag::Reference,
            StreamVariant::MarketPublic(venue) => *venue,
            StreamVariant::VenueBPrivate => VenueTag::VenueB,
            StreamVariant::VenueCPrivate => VenueTag::VenueC,
            StreamVariant::VenueDPrivate => VenueTag::VenueD,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(
            self,
            StreamVariant::ReferenceUserStream
                | StreamVariant::VenueBPrivate
                | StreamVariant::VenueCPrivate
                | StreamVariant::VenueDPrivate
        )
    }

    /// Transport-level keepalive interval (§4.6 Keepalive). Reference's
    /// public/private streams don't ping at the transport layer: the
    /// reference user stream keeps itself alive by renewing its listen key
    /// instead (handled by the session, not this connection).
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self {
            StreamVariant::ReferencePublic | StreamVariant::ReferenceUserStream => None,
            StreamVariant::MarketPublic(VenueTag::VenueD) | StreamVariant::VenueDPrivate => {
                Some(Duration::from_secs(15))
            }
            _ => Some(Duration::from_secs(15)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    Connecting,
    Authenticating,
    Subscribing,
    Open,
    Closing,
    Reconnecting,
    Closed,
}

/// Per-venue behavior the generic engine doesn't know about. Built by the
/// session when it opens a stream, using the venue's signer/credentials.
pub struct StreamHooks {
    /// `None` for public streams. Returns the text frame to send once
    /// connected, built from [`super::auth`] plus the venue's signer.
    pub build_auth_frame: Option<Box<dyn Fn() -> String + Send + Sync>>,
    /// One subscribe frame per channel (§4.6 SUBSCRIBE).
    pub build_subscribe_frames: Box<dyn Fn() -> Vec<String> + Send + Sync>,
    /// Decodes one already-gunzipped text payload. Returning `Err` is a
    /// decode failure that does not itself force a reconnect; venue-specific
    /// control codes drive reconnect/terminal decisions through
    /// [`FrameOutcome`] instead.
    pub on_message: Box<dyn Fn(&str) -> FrameOutcome + Send + Sync>,
    /// Binary frames need gzip decode first (venue C); other venues never
    /// receive binary data frames.
    pub is_binary_gzipped: bool,
}

pub enum FrameOutcome {
    /// Frame handled; no state change.
    Continue,
    /// First successfully decoded *data* message: resets the reconnect
    /// try-count (§4.6 CONNECT).
    DataReceived,
    Reconnect,
    SleepThenReconnect(Duration),
    TerminalError(String),
}

pub struct StreamConnection {
    variant: StreamVariant,
    trade_id: String,
    writer: AsyncMutex<WsWriter>,
    state: SyncMutex<StreamState>,
    last_heartbeat: SyncMutex<Instant>,
    try_count: AtomicU32,
    cancellation: CancellationToken,
}

impl StreamConnection {
    /// Runs the full state machine for one stream until the cancellation
    /// token fires or a terminal error is hit. Reconnects transparently on
    /// transient failures per the CONNECT rule; `TERMINATION` (§4.6): once
    /// `cancellation` is requested, a close/error exits cleanly instead of
    /// reconnecting.
    pub async fn run(
        url: Url,
        variant: StreamVariant,
        trade_id: String,
        hooks: StreamHooks,
        cancellation: CancellationToken,
    ) -> Result<()> {
        let mut try_count: u32 = 0;
        loop {
            if cancellation.is_cancellation_requested() {
                return Ok(());
            }

            match Self::connect_and_run_once(url.clone(), variant, trade_id.clone(), &hooks, &cancellation, &mut try_count).await {
                Ok(()) => return Ok(()),
                Err(ReconnectSignal::SleepThenRetry(delay)) => {
                    log::trace!("stream {trade_id} {variant:?} reconnecting in {delay:?} (try {try_count})");
                    time::sleep(delay).await;
                }
                Err(ReconnectSignal::Terminal(message)) => {
                    log::error!("stream {trade_id} {variant:?} terminal error: {message}");
                    return Ok(());
                }
            }
        }
    }

    async fn connect_and_run_once(
        url: Url,
        variant: StreamVariant,
        trade_id: String,
        hooks: &StreamHooks,
        cancellation: &CancellationToken,
        try_count: &mut u32,
    ) -> std::result::Result<(), ReconnectSignal> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .context("websocket connect failed")
            .map_err(|err| {
                log::trace!("stream {trade_id} {variant:?} connect failed: {err}");
                ReconnectSignal::SleepThenRetry(reconnect_backoff(*try_count + 1))
            })?;

        let (writer, mut reader) = ws_stream.split();
        let connection = Arc::new(StreamConnection {
            variant,
            trade_id: trade_id.clone(),
            writer: AsyncMutex::new(writer),
            state: SyncMutex::new(StreamState::Connecting),
            last_heartbeat: SyncMutex::new(Instant::now()),
            try_count: AtomicU32::new(*try_count),
            cancellation: cancellation.clone(),
        });

        if variant.is_private() {
            *connection.state.lock() = StreamState::Authenticating;
            if let Some(build_auth_frame) = &hooks.build_auth_frame {
                let frame = build_auth_frame();
                connection
                    .send_text(frame)
                    .await
                    .map_err(|_| ReconnectSignal::SleepThenRetry(Duration::from_secs(1)))?;
            }
        }

        *connection.state.lock() = StreamState::Subscribing;
        for frame in (hooks.build_subscribe_frames)() {
            connection
                .send_text(frame)
                .await
                .map_err(|_| ReconnectSignal::SleepThenRetry(Duration::from_secs(1)))?;
        }

        *connection.state.lock() = StreamState::Open;

        let heartbeat_handle = connection.variant.heartbeat_interval().map(|interval| {
            tokio::spawn(Self::heartbeat_loop(connection.clone(), interval))
        });

        let outcome = Self::read_loop(connection.clone(), &mut reader, hooks).await;

        *connection.state.lock() = StreamState::Closing;
        let _ = connection.writer.lock().await.close().await;
        if let Some(handle) = heartbeat_handle {
            handle.abort();
        }
        *connection.state.lock() = StreamState::Closed;

        // The read loop may have reset this to 0 on first decoded data;
        // carry the latest value back to the caller's reconnect loop.
        *try_count = connection.try_count.load(Ordering::Relaxed);

        if connection.cancellation.is_cancellation_requested() {
            return Ok(());
        }

        match outcome {
            ReadLoopOutcome::CleanClose | ReadLoopOutcome::TransportError | ReadLoopOutcome::Reconnect => {
                *try_count += 1;
                Err(ReconnectSignal::SleepThenRetry(reconnect_backoff(*try_count)))
            }
            ReadLoopOutcome::SleepThenReconnect(delay) => Err(ReconnectSignal::SleepThenRetry(delay)),
            ReadLoopOutcome::Terminal(message) => Err(ReconnectSignal::Terminal(message)),
        }
    }

    async fn read_loop(this: Arc<StreamConnection>, reader: &mut WsReader, hooks: &StreamHooks) -> ReadLoopOutcome {
        while let Some(message) = reader.next().await {
            if this.cancellation.is_cancellation_requested() {
                return ReadLoopOutcome::CleanClose;
            }
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    log::error!("stream {} {:?} transport error: {err}", this.trade_id, this.variant);
                    return ReadLoopOutcome::TransportError;
                }
            };

            let decoded_text = match message {
                Message::Text(text) => Some(text),
                Message::Binary(bytes) => {
                    if hooks.is_binary_gzipped {
                        super::frame::gunzip_to_string(&bytes).ok()
                    } else {
                        String::from_utf8(bytes).ok()
                    }
                }
                Message::Ping(payload) => {
                    let _ = this.send(Message::Pong(payload)).await;
                    None
                }
                Message::Pong(_) => {
                    *this.last_heartbeat.lock() = Instant::now();
                    None
                }
                Message::Close(_) => return ReadLoopOutcome::CleanClose,
                Message::Frame(_) => None,
            };

            let Some(text) = decoded_text else { continue };

            match (hooks.on_message)(&text) {
                FrameOutcome::Continue => {}
                // First decoded data message: reset the retry counter but
                // keep reading on this same connection (§4.6 CONNECT).
                FrameOutcome::DataReceived => this.try_count.store(0, Ordering::Relaxed),
                FrameOutcome::Reconnect => return ReadLoopOutcome::Reconnect,
                FrameOutcome::SleepThenReconnect(delay) => return ReadLoopOutcome::SleepThenReconnect(delay),
                FrameOutcome::TerminalError(message) => return ReadLoopOutcome::Terminal(message),
            }
        }
        ReadLoopOutcome::CleanClose
    }

    async fn heartbeat_loop(this: Arc<StreamConnection>, interval: Duration) {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if this.cancellation.is_cancellation_requested() {
                return;
            }
            if this.send(Message::Ping(b"ping".to_vec())).await.is_err() {
                return;
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.send(Message::Text(text)).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(message).await.context("websocket send failed")
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    pub fn try_count(&self) -> u32 {
        self.try_count.load(Ordering::Relaxed)
    }
}

enum ReadLoopOutcome {
    CleanClose,
    TransportError,
    Reconnect,
    SleepThenReconnect(Duration),
    Terminal(String),
}

enum ReconnectSignal {
    SleepThenRetry(Duration),
    Terminal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_public_variant_reports_the_dispatching_venue() {
        let variant = StreamVariant::MarketPublic(VenueTag::VenueC);
        assert_eq!(variant.venue(), VenueTag::VenueC);
        assert!(!variant.is_private());
    }

    #[test]
    fn private_variants_report_their_fixed_venue() {
        assert_eq!(StreamVariant::VenueDPrivate.venue(), VenueTag::VenueD);
        assert!(StreamVariant::VenueDPrivate.is_private());
        assert!(!StreamVariant::ReferencePublic.is_private());
    }

    #[test]
    fn reference_streams_have_no_transport_heartbeat() {
        assert_eq!(StreamVariant::ReferencePublic.heartbeat_interval(), None);
        assert_eq!(StreamVariant::ReferenceUserStream.heartbeat_interval(), None);
    }

    #[test]
    fn alternate_venues_heartbeat_every_fifteen_seconds() {
        assert_eq!(
            StreamVariant::MarketPublic(VenueTag::VenueB).heartbeat_interval(),
            Some(Duration::from_secs(15))
        );
        assert_eq!(StreamVariant::VenueDPrivate.heartbeat_interval(), Some(Duration::from_secs(15)));
    }
}
