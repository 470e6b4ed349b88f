//! Live fan-out of invocation progress to connected subscribers.

pub mod events;
pub mod hub;

pub use events::{ConnectionMessage, EventKind, NeuralEvent, NeuralEventData};
pub use hub::{BroadcastHub, SubscriberId, Subscription};
