//! Types shared between the greennet relay server and its Rust clients.

pub mod geometry;
pub mod lua;
pub mod protocol;

pub use geometry::{distance, Position};
pub use protocol::{DeliveredMessage, OutboundMessage, RegisterResponse};
