//! Stream module
//!
//! One TCP connection per modality. A background reader thread frames the
//! byte stream on `\n` and publishes only the newest complete frame into a
//! single-slot mailbox that the tick loop drains.

pub mod client;
pub mod framing;
pub mod mailbox;

pub use client::{ConnectionState, StreamClient, StreamStats};
pub use framing::{LineFramer, RawFrame};
