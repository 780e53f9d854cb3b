//! Upstream request forwarding and response relaying.

pub mod forwarder;

pub use forwarder::{Forwarder, UpstreamBody, UpstreamReply};
