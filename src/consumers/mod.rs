//! Consumer-side helpers.
//!
//! Every consumer follows the same protocol: poll the store, skip the cycle
//! on `None`, otherwise use the frame immediately and release it. Handles
//! are never held across a suspension point.

pub mod broadcast;
pub mod multipart;

pub use broadcast::{Broadcaster, FrameSink, SessionRegistry, SinkError, TickReport};
