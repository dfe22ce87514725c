//! Marketbridge protocol types.
//!
//! This crate holds the types that cross the boundary between the marketbridge
//! core and a chat platform gateway:
//!
//! - [`Message`]: a platform-neutral rich message (title, fields, color, ...)
//! - [`DeliveryGateway`]: the capability the core uses to send messages,
//!   create threads and add thread members
//! - [`RoutingCommand`] / [`CommandHandler`]: command-based routing
//!   configuration issued from inside the chat platform
//!
//! Gateways depend on this crate only; they never see core internals.

mod command;
mod delivery;
mod message;

pub use command::{CommandHandler, CommandReply, CommandScope, RoutingCommand};
pub use delivery::{DeliveryError, DeliveryGateway, SentMessage, ThreadHandle, ThreadVisibility};
pub use message::{EmbedField, Message, colors};
