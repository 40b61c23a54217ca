//! Transport attachment to live worlds.

pub mod connection;
pub mod manager;

pub use connection::{ChannelConnection, ClientConnection};
pub use manager::{Subscription, SubscriptionManager};
