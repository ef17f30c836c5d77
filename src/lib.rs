//! rtc-call - peer-to-peer audio/video calls over WebRTC
//!
//! This crate provides the client side of a one-to-one call: the peer
//! session state machine, local capture device management and the
//! signaling channel that carries offers, answers and ICE candidates
//! between the two peers.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod session;
pub mod signaling;

pub use error::{CallError, Result};
