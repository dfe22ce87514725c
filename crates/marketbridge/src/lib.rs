//! Marketbridge - relays marketplace events into chat channels.
//!
//! The backend posts listing and dispute events to the webhook; each event is
//! validated, routed per scope and category, formatted, and handed to a
//! [`DeliveryGateway`](marketbridge_protocol::DeliveryGateway).

pub mod auth;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod format;
pub mod handlers;
pub mod resolver;
pub mod response;
pub mod routing;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::CategoryCatalog;
pub use dispatcher::{DispatchError, DispatchResult, Dispatcher};
pub use event::{Envelope, Event, EventKind, RejectReason};
pub use routing::{RoutingState, RoutingTable};
