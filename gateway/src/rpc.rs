//! The `Martin` service implementation (C8 facade, §6): every RPC is a thin
//! translation between wire messages and the session registry /
//! `VenueClient` calls `gateway_core` already provides. Grounded on the
//! teacher's own RPC-facade layer (`mmb_rpc`'s `rest_api.rs`), generalized
//! from jsonrpc-core's per-method dispatch to tonic's generated trait.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::SessionRegistry;
use gateway_domain::{Balance, GatewayError, OrderCancelling, OrderSide, OrderType, VenueTag};
use gateway_proto::martin_server::Martin;
use gateway_proto::*;
use rust_decimal::Decimal;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::config::{AccountConfig, EndpointConfig};
use crate::convert::{
    balance_to_proto, candle_event_to_proto, candle_to_proto, execution_report_to_proto,
    gateway_error_to_status, mini_ticker_to_proto, order_book_top_to_proto, order_to_proto,
    parse_decimal, parse_kline_channels, symbol_to_proto, trade_to_proto,
};
use crate::streams::{start_market_stream, start_user_stream, MarketChannel};
use crate::venue_factory::build_venue_client;

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const STREAM_QUEUE_DEPTH: usize = 64;

pub struct MartinService {
    registry: Arc<SessionRegistry>,
    accounts: HashMap<String, AccountConfig>,
    endpoints: HashMap<String, EndpointConfig>,
}

impl MartinService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        accounts: HashMap<String, AccountConfig>,
        endpoints: HashMap<String, EndpointConfig>,
    ) -> Self {
        Self { registry, accounts, endpoints }
    }

    fn session(&self, client_id: &str) -> Result<Arc<gateway_core::Session>, Status> {
        self.registry
            .get(client_id)
            .ok_or_else(|| Status::not_found(format!("unknown client_id {client_id}")))
    }

    fn endpoint_for(&self, account: &AccountConfig) -> Result<EndpointConfig, Status> {
        self.endpoints
            .get(&account.exchange)
            .cloned()
            .ok_or_else(|| Status::failed_precondition(format!("no endpoint configured for exchange {}", account.exchange)))
    }
}

fn map_err<T>(result: Result<T, GatewayError>) -> Result<T, Status> {
    result.map_err(gateway_error_to_status)
}

#[tonic::async_trait]
impl Martin for MartinService {
    async fn open_client_connection(
        &self,
        request: Request<OpenClientConnectionRequest>,
    ) -> Result<Response<OpenClientConnectionReply>, Status> {
        let request = request.into_inner();
        let account = self
            .accounts
            .get(&request.account_name)
            .ok_or_else(|| Status::failed_precondition(format!("unknown account {}", request.account_name)))?
            .clone();
        let endpoint = self.endpoint_for(&account)?;
        let venue_tag: VenueTag = account
            .exchange
            .parse()
            .map_err(|_| Status::failed_precondition(format!("unrecognized exchange {}", account.exchange)))?;

        let session = self.registry.open_session(&account.name, venue_tag, || {
            build_venue_client(&account, &endpoint)
                .expect("account validated at OpenClientConnection time")
                .0
        });
        session
            .ensure_loaded()
            .await
            .map_err(gateway_error_to_status)?;

        Ok(Response::new(OpenClientConnectionReply {
            client_id: session.session_id.clone(),
            srv_version: SERVER_VERSION.to_string(),
            exchange: session.venue_tag.as_str().to_string(),
        }))
    }

    async fn fetch_server_time(
        &self,
        request: Request<ClientRequest>,
    ) -> Result<Response<FetchServerTimeReply>, Status> {
        let session = self.session(&request.into_inner().client_id)?;
        let server_time = map_err(session.venue_client.fetch_server_time().await)?;
        Ok(Response::new(FetchServerTimeReply { server_time }))
    }

    async fn reset_rate_limit(
        &self,
        request: Request<ResetRateLimitRequest>,
    ) -> Result<Response<SuccessReply>, Status> {
        let session = self.session(&request.into_inner().client_id)?;
        Ok(Response::new(SuccessReply { success: session.reset_rate_limit() }))
    }

    async fn fetch_open_orders(&self, request: Request<SymbolRequest>) -> Result<Response<OrdersReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let orders = map_err(session.venue_client.fetch_open_orders(&request.symbol).await)?;
        Ok(Response::new(OrdersReply {
            orders: orders.iter().map(order_to_proto).collect(),
            rate_limiter: 0,
        }))
    }

    async fn fetch_order(&self, request: Request<FetchOrderRequest>) -> Result<Response<OrderReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let order = map_err(session.venue_client.fetch_order(&request.symbol, request.order_id).await)?;

        // `filledUpdateCall` healing (§4.8): a polled terminal/partial fill
        // the caller asked to be notified about is synthesized onto the
        // executionReport bus so an already-open `OnOrderUpdate` stream sees
        // it even though it arrived by polling, not by WSS push.
        if request.filled_update_call && (order.status.is_terminal() || order.executed_qty > Decimal::ZERO) {
            let report = gateway_domain::ExecutionReportEvent {
                symbol: order.symbol.clone(),
                order_id: order.order_id,
                order_list_id: order.order_list_id,
                client_order_id: order.client_order_id.clone(),
                price: order.price,
                orig_qty: order.orig_qty,
                executed_qty: order.executed_qty,
                cummulative_quote_qty: order.cummulative_quote_qty,
                status: order.status,
                time_in_force: order.time_in_force,
                order_type: order.order_type,
                side: order.side,
                stop_price: order.stop_price,
                iceberg_qty: order.iceberg_qty,
                time: order.time,
                update_time: order.update_time,
                is_working: order.is_working,
                orig_quote_order_qty: order.orig_quote_order_qty,
                execution_type: if order.status.is_terminal() {
                    gateway_domain::ExecutionType::Trade
                } else {
                    gateway_domain::ExecutionType::New
                },
                last_executed_quantity: order.executed_qty,
                last_executed_price: order.price,
                transaction_time: order.update_time,
                trade_id: None,
                in_order_book: order.is_working,
                is_maker_side: false,
            };
            let _ = session
                .event_bus
                .fire("executionReport", gateway_domain::CanonicalEvent::ExecutionReport(report));
        }

        Ok(Response::new(OrderReply { order: Some(order_to_proto(&order)) }))
    }

    async fn cancel_all_orders(&self, request: Request<SymbolRequest>) -> Result<Response<OrdersReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let orders = map_err(session.venue_client.cancel_all_orders(&request.symbol).await)?;
        Ok(Response::new(OrdersReply {
            orders: orders.iter().map(order_to_proto).collect(),
            rate_limiter: 0,
        }))
    }

    async fn fetch_exchange_info_symbol(
        &self,
        request: Request<SymbolRequest>,
    ) -> Result<Response<SymbolInfoReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let info = session.ensure_loaded().await.map_err(gateway_error_to_status)?;
        let symbol = info
            .symbols
            .get(&request.symbol)
            .ok_or_else(|| Status::invalid_argument(format!("unknown symbol {}", request.symbol)))?;
        Ok(Response::new(symbol_to_proto(symbol)))
    }

    async fn fetch_account_information(
        &self,
        request: Request<ClientRequest>,
    ) -> Result<Response<BalancesReply>, Status> {
        let session = self.session(&request.into_inner().client_id)?;
        let balances = map_err(session.venue_client.fetch_account_information().await)?;
        Ok(Response::new(BalancesReply { balances: balances.iter().map(balance_to_proto).collect() }))
    }

    async fn fetch_funding_wallet(
        &self,
        request: Request<FetchFundingWalletRequest>,
    ) -> Result<Response<BalancesReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let balances: Vec<Balance> = map_err(
            session
                .venue_client
                .fetch_funding_wallet(request.asset.as_deref(), request.need_btc_valuation.unwrap_or(false))
                .await,
        )?;
        Ok(Response::new(BalancesReply { balances: balances.iter().map(balance_to_proto).collect() }))
    }

    async fn fetch_order_book(&self, request: Request<SymbolRequest>) -> Result<Response<OrderBookReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let book = map_err(session.venue_client.fetch_order_book(&request.symbol, 5).await)?;
        Ok(Response::new(OrderBookReply {
            symbol: request.symbol,
            last_update_id: book.last_update_id,
            bids: book.bids.iter().map(|(price, qty)| PriceLevel { price: price.to_string(), qty: qty.to_string() }).collect(),
            asks: book.asks.iter().map(|(price, qty)| PriceLevel { price: price.to_string(), qty: qty.to_string() }).collect(),
        }))
    }

    async fn fetch_symbol_price_ticker(
        &self,
        request: Request<SymbolRequest>,
    ) -> Result<Response<SymbolPriceTickerReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let ticker = map_err(session.venue_client.fetch_symbol_price_ticker(&request.symbol).await)?;
        Ok(Response::new(SymbolPriceTickerReply { symbol: ticker.symbol, price: ticker.price.to_string() }))
    }

    async fn fetch_ticker_price_change_statistics(
        &self,
        request: Request<SymbolRequest>,
    ) -> Result<Response<TickerStatsReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let stats = map_err(session.venue_client.fetch_ticker_price_change_statistics(&request.symbol).await)?;
        Ok(Response::new(TickerStatsReply {
            symbol: stats.symbol,
            price_change: stats.price_change.to_string(),
            price_change_percent: stats.price_change_percent.to_string(),
            last_price: stats.last_price.to_string(),
            high_price: stats.high_price.to_string(),
            low_price: stats.low_price.to_string(),
            volume: stats.volume.to_string(),
            quote_volume: (stats.volume * stats.last_price).to_string(),
            open_time: 0,
            close_time: 0,
        }))
    }

    async fn fetch_klines(&self, request: Request<FetchKlinesRequest>) -> Result<Response<KlinesReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let interval = request
            .interval
            .parse()
            .map_err(|_| Status::invalid_argument(format!("unrecognized interval {}", request.interval)))?;
        let candles = map_err(
            session
                .venue_client
                .fetch_klines(&request.symbol, interval, request.limit as u32, request.start_time, request.end_time)
                .await,
        )?;
        Ok(Response::new(KlinesReply { candles: candles.iter().map(candle_to_proto).collect() }))
    }

    async fn fetch_account_trade_list(
        &self,
        request: Request<FetchAccountTradeListRequest>,
    ) -> Result<Response<TradesReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let trades = map_err(
            session
                .venue_client
                .fetch_account_trade_list(&request.symbol, Some(request.start_time), request.limit as u32)
                .await,
        )?;
        Ok(Response::new(TradesReply { trades: trades.iter().map(trade_to_proto).collect() }))
    }

    async fn create_limit_order(
        &self,
        request: Request<CreateLimitOrderRequest>,
    ) -> Result<Response<OrderReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let qty = parse_decimal("quantity", &request.quantity)?;
        let price = parse_decimal("price", &request.price)?;

        let new_order = gateway_core::venues::NewOrder {
            symbol: request.symbol,
            side: if request.buy_side { OrderSide::Buy } else { OrderSide::Sell },
            order_type: OrderType::Limit,
            qty: Some(qty),
            quote_order_qty: None,
            price: Some(price),
            stop_price: None,
            client_order_id: if request.new_client_order_id.is_empty() { None } else { Some(request.new_client_order_id) },
        };

        let created = session.venue_client.create_order(new_order).await;
        if let Err(err) = &created {
            if err.kind == gateway_domain::GatewayErrorKind::RateLimited {
                session.record_rate_limited();
            }
        }
        let order = map_err(created)?;
        Ok(Response::new(OrderReply { order: Some(order_to_proto(&order)) }))
    }

    async fn cancel_order(&self, request: Request<CancelOrderRequest>) -> Result<Response<OrderReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let order = map_err(
            session
                .venue_client
                .cancel_order(OrderCancelling { symbol: request.symbol, order_id: request.order_id })
                .await,
        )?;
        Ok(Response::new(OrderReply { order: Some(order_to_proto(&order)) }))
    }

    type OnKlinesUpdateStream = ReceiverStream<Result<CandleReply, Status>>;

    async fn on_klines_update(
        &self,
        request: Request<OnKlinesUpdateRequest>,
    ) -> Result<Response<Self::OnKlinesUpdateStream>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let channels = parse_kline_channels(&request.interval)?;
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_QUEUE_DEPTH);
        let ws_host = self.ws_host_for(&session)?;

        for channel in channels {
            forward_market_stream(&session, &request.trade_id, &request.symbol, channel, &ws_host, tx.clone(), |event| match event {
                gateway_domain::CanonicalEvent::Candle(candle) => Some(candle_event_to_proto(&candle)),
                _ => None,
            });
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type OnTickerUpdateStream = ReceiverStream<Result<MiniTickerReply, Status>>;

    async fn on_ticker_update(
        &self,
        request: Request<OnTickerUpdateRequest>,
    ) -> Result<Response<Self::OnTickerUpdateStream>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_QUEUE_DEPTH);
        let ws_host = self.ws_host_for(&session)?;

        forward_market_stream(&session, &request.trade_id, &request.symbol, MarketChannel::MiniTicker, &ws_host, tx, |event| match event {
            gateway_domain::CanonicalEvent::MiniTicker(ticker) => Some(mini_ticker_to_proto(&ticker)),
            _ => None,
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type OnOrderBookUpdateStream = ReceiverStream<Result<OrderBookReply, Status>>;

    async fn on_order_book_update(
        &self,
        request: Request<OnOrderBookUpdateRequest>,
    ) -> Result<Response<Self::OnOrderBookUpdateStream>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_QUEUE_DEPTH);
        let ws_host = self.ws_host_for(&session)?;

        forward_market_stream(&session, &request.trade_id, &request.symbol, MarketChannel::Depth5, &ws_host, tx, |event| match event {
            gateway_domain::CanonicalEvent::OrderBookTop(book) => Some(order_book_top_to_proto(&book)),
            _ => None,
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type OnFundsUpdateStream = ReceiverStream<Result<BalancesReply, Status>>;

    async fn on_funds_update(
        &self,
        request: Request<OnFundsUpdateRequest>,
    ) -> Result<Response<Self::OnFundsUpdateStream>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let ws_host = self.ws_host_for(&session)?;
        let api_secret = self.api_secret_for(&session)?;
        let (event_rx, cancel_token) = start_user_stream(&session, &request.trade_id, session.venue_tag, &ws_host, api_secret).await;
        let (out_tx, out_rx) = tokio::sync::mpsc::channel(STREAM_QUEUE_DEPTH);

        tokio::spawn(forward_user_events(event_rx, out_tx, cancel_token, move |event| match event {
            gateway_domain::CanonicalEvent::OutboundAccountPosition(position) => Some(BalancesReply {
                balances: position.balances.iter().map(balance_to_proto).collect(),
            }),
            _ => None,
        }));

        Ok(Response::new(ReceiverStream::new(out_rx)))
    }

    type OnOrderUpdateStream = ReceiverStream<Result<ExecutionReportReply, Status>>;

    async fn on_order_update(
        &self,
        request: Request<OnOrderUpdateRequest>,
    ) -> Result<Response<Self::OnOrderUpdateStream>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        let ws_host = self.ws_host_for(&session)?;
        let api_secret = self.api_secret_for(&session)?;
        let (event_rx, cancel_token) = start_user_stream(&session, &request.trade_id, session.venue_tag, &ws_host, api_secret).await;
        let (out_tx, out_rx) = tokio::sync::mpsc::channel(STREAM_QUEUE_DEPTH);

        tokio::spawn(forward_user_events(event_rx, out_tx, cancel_token, move |event| match event {
            gateway_domain::CanonicalEvent::ExecutionReport(report) => Some(execution_report_to_proto(&report)),
            _ => None,
        }));

        Ok(Response::new(ReceiverStream::new(out_rx)))
    }

    async fn start_stream(&self, request: Request<StartStreamRequest>) -> Result<Response<SuccessReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        session
            .await_market_stream_count(&request.trade_id, request.market_stream_count as usize)
            .await;
        Ok(Response::new(SuccessReply { success: true }))
    }

    async fn stop_stream(&self, request: Request<StopStreamRequest>) -> Result<Response<SuccessReply>, Status> {
        let request = request.into_inner();
        let session = self.session(&request.client_id)?;
        session.stop_stream(&request.trade_id);
        Ok(Response::new(SuccessReply { success: true }))
    }
}

impl MartinService {
    fn account_for(&self, session: &gateway_core::Session) -> Result<&AccountConfig, Status> {
        self.accounts
            .get(&session.account_name)
            .ok_or_else(|| Status::failed_precondition(format!("account {} no longer configured", session.account_name)))
    }

    fn ws_host_for(&self, session: &gateway_core::Session) -> Result<String, Status> {
        let account = self.account_for(session)?;
        let endpoint = self.endpoint_for(account)?;
        Ok(endpoint.rest_and_ws(account.test_net).1.to_string())
    }

    fn api_secret_for(&self, session: &gateway_core::Session) -> Result<Vec<u8>, Status> {
        Ok(self.account_for(session)?.api_secret.as_bytes().to_vec())
    }
}

/// Spawns a market-data stream and a forwarding task that turns the raw
/// `CanonicalEvent`s it decodes into the caller's proto reply type, dropping
/// anything `project` doesn't recognize for this channel (every market
/// channel only ever fires one event shape, so this is a type filter, not a
/// lossy path).
fn forward_market_stream<T: Send + 'static>(
    session: &Arc<gateway_core::Session>,
    trade_id: &str,
    symbol: &str,
    channel: MarketChannel,
    ws_host: &str,
    out_tx: tokio::sync::mpsc::Sender<Result<T, Status>>,
    project: impl Fn(gateway_domain::CanonicalEvent) -> Option<T> + Send + 'static,
) {
    let mut rx = start_market_stream(session, trade_id, session.venue_tag, symbol, channel, ws_host);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(reply) = project(event) {
                if out_tx.send(Ok(reply)).await.is_err() {
                    return;
                }
            }
        }
    });
}

async fn forward_user_events<T: Send + 'static>(
    mut rx: tokio::sync::mpsc::Receiver<gateway_domain::CanonicalEvent>,
    out_tx: tokio::sync::mpsc::Sender<Result<T, Status>>,
    cancel: gateway_utils::cancellation_token::CancellationToken,
    project: impl Fn(gateway_domain::CanonicalEvent) -> Option<T> + Send + 'static,
) {
    loop {
        tokio::select! {
            _ = cancel.when_cancelled() => return,
            event = rx.recv() => {
                match event {
                    None => return,
                    Some(event) => {
                        if let Some(reply) = project(event) {
                            if out_tx.send(Ok(reply)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::venues::{LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics, VenueClient};
    use gateway_domain::{CanonicalOrder, CanonicalTrade, Candle, Interval, OrderCancelling, OrderStatus};

    struct StubVenueClient;

    #[async_trait]
    impl VenueClient for StubVenueClient {
        fn venue_tag(&self) -> VenueTag {
            VenueTag::Reference
        }

        async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
            Ok(LoadedVenueInfo::default())
        }

        async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
            Ok(42)
        }

        async fn fetch_order_book(&self, _symbol: &str, _limit: u32) -> Result<OrderBookTop, GatewayError> {
            unimplemented!()
        }

        async fn fetch_klines(
            &self,
            _symbol: &str,
            _interval: Interval,
            _limit: u32,
            _start: Option<i64>,
            _end: Option<i64>,
        ) -> Result<Vec<Candle>, GatewayError> {
            unimplemented!()
        }

        async fn create_order(&self, _order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
            unimplemented!()
        }

        async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
            Ok(CanonicalOrder {
                symbol: symbol.to_string(),
                order_id,
                order_list_id: CanonicalOrder::NO_ORDER_LIST,
                client_order_id: "client-1".into(),
                price: Decimal::new(100, 0),
                orig_qty: Decimal::new(1, 0),
                executed_qty: Decimal::new(1, 0),
                cummulative_quote_qty: Decimal::new(100, 0),
                status: OrderStatus::Filled,
                time_in_force: gateway_domain::TimeInForce::Gtc,
                order_type: gateway_domain::OrderType::Limit,
                side: OrderSide::Buy,
                stop_price: None,
                iceberg_qty: None,
                time: 0,
                update_time: 0,
                is_working: false,
                orig_quote_order_qty: Decimal::new(100, 0),
            })
        }

        async fn cancel_order(&self, _order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
            unimplemented!()
        }

        async fn cancel_all_orders(&self, _symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
            unimplemented!()
        }

        async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
            Ok(Vec::new())
        }

        async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
            unimplemented!()
        }

        async fn fetch_funding_wallet(&self, _asset: Option<&str>, _need_btc_valuation: bool) -> Result<Vec<Balance>, GatewayError> {
            unimplemented!()
        }

        async fn fetch_account_trade_list(&self, _symbol: &str, _start_time: Option<i64>, _limit: u32) -> Result<Vec<CanonicalTrade>, GatewayError> {
            unimplemented!()
        }

        async fn fetch_symbol_price_ticker(&self, _symbol: &str) -> Result<SymbolPriceTicker, GatewayError> {
            unimplemented!()
        }

        async fn fetch_ticker_price_change_statistics(&self, _symbol: &str) -> Result<TickerStatistics, GatewayError> {
            unimplemented!()
        }
    }

    fn service_with_one_session() -> (MartinService, String) {
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.open_session("acct-1", VenueTag::Reference, || Arc::new(StubVenueClient));
        let accounts = HashMap::new();
        let endpoints = HashMap::new();
        (MartinService::new(registry, accounts, endpoints), session.session_id.clone())
    }

    #[tokio::test]
    async fn fetch_server_time_delegates_to_the_sessions_venue_client() {
        let (service, client_id) = service_with_one_session();
        let reply = service
            .fetch_server_time(Request::new(ClientRequest { client_id }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.server_time, 42);
    }

    #[tokio::test]
    async fn unknown_client_id_is_not_found() {
        let (service, _) = service_with_one_session();
        let status = service
            .fetch_server_time(Request::new(ClientRequest { client_id: "bogus".into() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn fetch_order_with_filled_update_call_fires_an_execution_report() {
        let (service, client_id) = service_with_one_session();
        let session = service.session(&client_id).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        session.event_bus.register_user_event(&session.session_id, tx, "executionReport");

        let reply = service
            .fetch_order(Request::new(FetchOrderRequest {
                client_id,
                symbol: "BTCUSDT".into(),
                order_id: 7,
                trade_id: String::new(),
                filled_update_call: true,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(reply.order.unwrap().order_id, 7);
        match rx.try_recv().unwrap() {
            gateway_domain::CanonicalEvent::ExecutionReport(report) => assert_eq!(report.order_id, 7),
            other => panic!("expected an ExecutionReport event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_open_orders_maps_empty_result_to_empty_reply() {
        let (service, client_id) = service_with_one_session();
        let reply = service
            .fetch_open_orders(Request::new(SymbolRequest { client_id, symbol: "BTCUSDT".into() }))
            .await
            .unwrap()
            .into_inner();
        assert!(reply.orders.is_empty());
    }
}
