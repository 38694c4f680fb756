pub mod broadcast_hub;

pub use broadcast_hub::{BroadcastHub, DEFAULT_CHANNEL_CAPACITY};
