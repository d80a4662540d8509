//! `RelayChat` — wire protocol library for the direct-message relay protocol.

pub mod codec;
pub mod message;
pub mod wire;
