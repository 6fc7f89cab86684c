//! Exchange-adaptation and event-distribution engine: signing, REST/WS
//! connectivity, per-venue normalization, order-book reconstruction, the
//! event bus, and the session registry that the RPC façade binds to.

pub mod connectivity;
pub mod eventbus;
pub mod orderbook;
pub mod rest;
pub mod session;
pub mod signer;
pub mod venues;

pub use eventbus::EventBus;
pub use session::{Session, SessionRegistry};
pub use venues::VenueClient;
