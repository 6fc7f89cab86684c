pub mod error;
pub mod events;
pub mod interval;
pub mod order;
pub mod symbol;
pub mod trade;
pub mod venue;

pub use error::{GatewayError, GatewayErrorKind};
pub use events::{
    Balance, CandleEvent, CanonicalEvent, MiniTickerEvent, OrderBookTopEvent,
    OutboundAccountPositionEvent, PriceLevel,
};
pub use interval::{Candle, Interval};
pub use order::{
    CanonicalOrder, ExecutionReportEvent, ExecutionType, OrderCancelling, OrderSide, OrderStatus,
    OrderType, TimeInForce,
};
pub use symbol::Symbol;
pub use trade::CanonicalTrade;
pub use venue::VenueTag;
