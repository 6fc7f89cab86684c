//! Wires the generic [`StreamConnection`] engine (gateway_core::connectivity)
//! to one running WebSocket per `(tradeId, venue, symbol, channel)`: builds
//! the wire-level subscribe/auth frames, picks the transport URL, and hands
//! the decoded frames to the per-venue parser in
//! `gateway_core::venues::stream`.
//!
//! Subscribe-frame wire shapes for VenueB/C/D are a documented-convention
//! stand-in (see DESIGN.md), the same way `connectivity::subscribe`'s
//! channel-name mapping is: the spec names the channel conventions but not
//! literal wire envelopes, and these follow each venue's well-known public
//! shape (Kraken-style `{"event":"subscribe",...}`, Bitfinex-style
//! `{"event":"subscribe","channel":...}`, OKX-style `{"op":"subscribe",
//! "args":[...]}`).

use std::sync::Arc;

use gateway_core::connectivity::{subscribe, FrameOutcome, StreamConnection, StreamHooks, StreamVariant};
use gateway_core::venues::stream as venue_stream;
use gateway_core::{EventBus, Session};
use gateway_domain::{CanonicalEvent, Interval, VenueTag};
use gateway_utils::cancellation_token::CancellationToken;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Clone, Copy)]
pub enum MarketChannel {
    MiniTicker,
    Depth5,
    Kline(Interval),
}

impl MarketChannel {
    pub fn event_key(&self, symbol: &str) -> String {
        match self {
            MarketChannel::MiniTicker => format!("{symbol}@miniTicker"),
            MarketChannel::Depth5 => format!("{symbol}@depth5"),
            MarketChannel::Kline(interval) => format!("{symbol}@kline_{}", interval.canonical_str()),
        }
    }
}

fn subscribe_frame(venue: VenueTag, channel: MarketChannel, symbol: &str) -> String {
    let name = match channel {
        MarketChannel::MiniTicker => subscribe::mini_ticker_channel(venue, symbol),
        MarketChannel::Depth5 => subscribe::depth5_channel(venue, symbol),
        MarketChannel::Kline(interval) => subscribe::kline_channel(venue, symbol, interval),
    };

    match venue {
        VenueTag::Reference => name, // reference's "subscribe" frame is the stream path itself.
        VenueTag::VenueB => serde_json::json!({
            "event": "subscribe",
            "pair": [gateway_core::venues::venue_b::to_native_symbol(symbol).unwrap_or_else(|| symbol.to_string())],
            "subscription": {"name": name},
        })
        .to_string(),
        VenueTag::VenueC => serde_json::json!({
            "event": "subscribe",
            "channel": name,
            "symbol": symbol,
        })
        .to_string(),
        VenueTag::VenueD => serde_json::json!({
            "op": "subscribe",
            "args": [{"channel": name, "instId": symbol}],
        })
        .to_string(),
    }
}

fn on_message_fn(
    venue: VenueTag,
    symbol: String,
    bus: Arc<EventBus>,
    session: Arc<Session>,
) -> Box<dyn Fn(&str) -> FrameOutcome + Send + Sync> {
    match venue {
        VenueTag::Reference => {
            Box::new(move |text| venue_stream::reference_on_message(&bus, session.active_orders(), text))
        }
        VenueTag::VenueB => Box::new(move |text| venue_stream::venue_b_on_message(&bus, text)),
        VenueTag::VenueC => Box::new(move |text| venue_stream::venue_c_on_message(&bus, text, &symbol)),
        VenueTag::VenueD => Box::new(move |text| venue_stream::venue_d_on_message(&bus, text)),
    }
}

/// Registers a receiver for `channel` and spawns the WebSocket that feeds it,
/// scoped to `trade_id`'s cancellation token. Returns the receiver half the
/// RPC handler turns into the outgoing gRPC stream.
pub fn start_market_stream(
    session: &Arc<Session>,
    trade_id: &str,
    venue: VenueTag,
    symbol: &str,
    channel: MarketChannel,
    ws_base: &str,
) -> mpsc::Receiver<CanonicalEvent> {
    const QUEUE_DEPTH: usize = 256;
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let event_key = channel.event_key(symbol);
    session.event_bus.register_event(trade_id, tx, &event_key, venue);

    let url = Url::parse(ws_base).expect("ws_base must be a valid URL");
    let variant = StreamVariant::MarketPublic(venue);
    let bus = session.event_bus.clone();
    let hooks = StreamHooks {
        build_auth_frame: None,
        build_subscribe_frames: {
            let frame = subscribe_frame(venue, channel, symbol);
            Box::new(move || vec![frame.clone()])
        },
        on_message: on_message_fn(venue, symbol.to_string(), bus, session.clone()),
        is_binary_gzipped: venue == VenueTag::VenueC,
    };

    let token = session.stream_token(trade_id);
    let trade_id = trade_id.to_string();
    tokio::spawn(async move {
        if let Err(err) = StreamConnection::run(url, variant, trade_id.clone(), hooks, token).await {
            log::error!("market stream {trade_id} {venue:?} exited: {err}");
        }
    });

    rx
}

/// Private user-data stream (executionReport/outboundAccountPosition for the
/// reference venue; see `gateway_core::venues::stream` for the VenueB/C/D
/// scope note). `build_auth_frame` signs the venue's login payload with the
/// account's own secret.
///
/// The reference venue's private stream is keyed by a listen key (§4.6
/// Keepalive): obtained once up front, appended to the stream URL, and
/// renewed on `REFERENCE_LISTEN_KEY_RENEWAL_INTERVAL` for as long as the
/// stream's cancellation token stays unset. Other venues authenticate the
/// socket directly and skip this (`obtain_listen_key` defaults to `None`).
pub async fn start_user_stream(
    session: &Arc<Session>,
    trade_id: &str,
    venue: VenueTag,
    ws_base: &str,
    api_secret: Vec<u8>,
) -> (mpsc::Receiver<CanonicalEvent>, CancellationToken) {
    const QUEUE_DEPTH: usize = 256;
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    session.event_bus.register_user_event(trade_id, tx, "executionReport");

    let listen_key = session.venue_client.obtain_listen_key().await.ok().flatten();
    let ws_base = match &listen_key {
        Some(key) => format!("{}/{key}", ws_base.trim_end_matches('/')),
        None => ws_base.to_string(),
    };
    let url = Url::parse(&ws_base).expect("ws_base must be a valid URL");
    let variant = match venue {
        VenueTag::Reference => StreamVariant::ReferenceUserStream,
        VenueTag::VenueB => StreamVariant::VenueBPrivate,
        VenueTag::VenueC => StreamVariant::VenueCPrivate,
        VenueTag::VenueD => StreamVariant::VenueDPrivate,
    };
    let bus = session.event_bus.clone();
    let session_for_hooks = session.clone();
    let auth_venue = venue;
    let build_auth_frame: Option<Box<dyn Fn() -> String + Send + Sync>> = match venue {
        VenueTag::Reference => None,
        _ => Some(Box::new(move || {
            let now_ms = gateway_utils::time::get_current_milliseconds() as i64;
            let payload = match auth_venue {
                VenueTag::VenueB => gateway_core::connectivity::auth::venue_b_auth_payload(now_ms),
                VenueTag::VenueC => gateway_core::connectivity::auth::venue_c_auth_payload(now_ms),
                VenueTag::VenueD => gateway_core::connectivity::auth::venue_d_auth_payload(now_ms / 1000, "GET", "/users/self/verify"),
                VenueTag::Reference => unreachable!(),
            };
            let signature = gateway_core::signer::sign(auth_venue, &api_secret, payload.as_bytes());
            serde_json::json!({"event": "auth", "payload": payload, "signature": signature}).to_string()
        })),
    };
    let hooks = StreamHooks {
        build_auth_frame,
        build_subscribe_frames: Box::new(Vec::new),
        on_message: Box::new(move |text| match venue {
            VenueTag::Reference => {
                venue_stream::reference_on_message(&bus, session_for_hooks.active_orders(), text)
            }
            _ => FrameOutcome::Continue,
        }),
        is_binary_gzipped: venue == VenueTag::VenueC,
    };

    let token = session.stream_token(trade_id);
    let run_token = token.clone();
    let trade_id_owned = trade_id.to_string();
    tokio::spawn(async move {
        if let Err(err) = StreamConnection::run(url, variant, trade_id_owned.clone(), hooks, run_token).await {
            log::error!("user stream {trade_id_owned} {venue:?} exited: {err}");
        }
    });

    if let Some(listen_key) = listen_key {
        let venue_client = session.venue_client.clone();
        let renewal_token = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(
                gateway_core::connectivity::REFERENCE_LISTEN_KEY_RENEWAL_INTERVAL,
            );
            interval.tick().await; // first tick fires immediately; the key is already fresh.
            loop {
                tokio::select! {
                    _ = renewal_token.when_cancelled() => return,
                    _ = interval.tick() => {
                        if let Err(err) = venue_client.keepalive_listen_key(&listen_key).await {
                            log::error!("listen key renewal failed: {err}");
                        }
                    }
                }
            }
        });
    }

    (rx, token)
}
