#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Per-connection, event-driven framing layer for a SPICE-style remote
//! desktop channel: reads length-prefixed messages off a non-blocking
//! transport, dispatches them to a subclass handler, and multiplexes
//! outgoing messages from an intra-process pipe under a credit-based
//! ack window.
//!
//! The transport, marshaller, generated wire parser and event loop are
//! external collaborators. This crate defines their contracts as traits
//! (see [`net::transport`], [`net::marshaller`], [`net::eventloop`]) and
//! ships a minimal concrete implementation of each over `mio` so the
//! runtime is testable standalone.

pub mod net;

pub use net::ack::AckState;
pub use net::callbacks::{ChannelHandler, Parsed, ParsedChannelHandler};
pub use net::channel::Channel;
pub use net::client::ChannelClient;
pub use net::config::ChannelConfig;
pub use net::error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use net::eventloop::{EventLoop, Interest, MioEventLoop};
pub use net::header::SpiceDataHeader;
pub use net::marshaller::{Marshal, Message};
pub use net::pipe::{Pipe, PipeItem, PipeItemId};
pub use net::transport::Stream;
