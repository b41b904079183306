//! msgrelay - Minimal message relay
//!
//! This library provides a file-backed message store where clients post
//! messages to a recipient and recipients poll for them, plus a thin HTTP
//! layer and CLI on top of it.

pub mod relay;

pub use relay::{MessageStore, StoreError};
