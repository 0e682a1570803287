//! Measurement streaming to network subscribers

pub mod client;
pub mod registry;
pub mod server;
pub mod wire;

pub use client::{DistanceHistory, StreamClient};
pub use registry::{BroadcastRegistry, SubscriberId};
pub use server::{ServerState, SubscriberServer};
pub use wire::{WireDecoder, WireMessage, encode_measurement};
