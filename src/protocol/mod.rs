//! Wire protocol implementation
//!
//! Handles decoding and encoding of the Redis serialization protocol (RESP2).
//! It is completely independent from other modules (loose coupling).

pub mod codec;
mod frame;

pub use frame::{Frame, FrameError};
