//! `RelayChat` — direct-message client library.

pub mod config;
pub mod messenger;
pub mod profile;
pub mod session;
pub mod sync;
pub mod transcript;
