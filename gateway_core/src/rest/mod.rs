//! HTTP client layer (C4): connection, header signing, status classification.

pub mod client;
pub mod error;
pub mod uri_builder;

pub use client::{RequestMethod, RestClient, RestHeaders};
pub use error::{classify_response, ErrorHandlerEmpty, RestResponse, VenueErrorHandler};
pub use uri_builder::UriBuilder;
