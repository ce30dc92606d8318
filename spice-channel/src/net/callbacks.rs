use crate::net::header::SpiceDataHeader;
use crate::net::marshaller::Message;

/// The subclass hook a channel dispatches to: both the inbound handler and
/// the outgoing pipe-item lifecycle (hold/send/release). The original
/// parser-constructor accepted this as optional and substituted do-nothing
/// callbacks when omitted, silently turning a missing handler into a
/// channel that reads and discards everything; that placeholder is dropped
/// here — a `ChannelClient` cannot be constructed without a real handler
/// (see [`crate::net::client::ChannelClient::new`]).
pub trait ChannelHandler {
    /// The channel-type-specific payload carried by data pipe items. Held,
    /// serialized and released exactly once each, per the pipe item
    /// lifecycle invariant.
    type Item;

    /// Dispatches one raw inbound message body. Returning `false` rejects
    /// the message and tears the channel down, mirroring a parser
    /// failure in the original.
    fn handle_message(&mut self, msg_type: u16, body: &[u8]) -> bool;

    /// Validates the connection right after the transport is attached.
    /// Returning `false` fails construction end-to-end: the stream is
    /// dropped and no `ChannelClient` is produced.
    fn config_socket(&mut self) -> bool {
        true
    }

    /// Allocates the buffer a message body is read into, once its header
    /// has been fully parsed. Returning `None` refuses the allocation and
    /// is fatal, mirroring a `null` return from `alloc_recv_buf`.
    fn alloc_recv_buf(&mut self, header: &SpiceDataHeader) -> Option<Vec<u8>> {
        Some(vec![0u8; header.size as usize])
    }

    /// Releases a receive buffer. Called on every exit path out of the
    /// body-reading phase once allocation has succeeded: normal dispatch
    /// completion as well as a fatal error mid-read.
    fn release_recv_buf(&mut self, _header: &SpiceDataHeader, _buf: Vec<u8>) {}

    /// Called exactly once when a data item is handed to the send
    /// pipeline, before it is serialized, so the subclass may
    /// reference-count or otherwise pin the payload for the duration of
    /// the send.
    fn hold_item(&mut self, _item: &Self::Item) {}

    /// Serializes a data item into the wire message the pipeline will
    /// write. Called once the item reaches the head of the pipe and is
    /// about to be sent.
    fn send_item(&mut self, item: &Self::Item) -> Message;

    /// Releases a data item exactly once, either after a successful send
    /// (`item_pushed = true`) or after it is dropped unsent on disconnect
    /// or pipe clear (`item_pushed = false`).
    fn release_item(&mut self, _item: Self::Item, _item_pushed: bool) {}

    /// Called once a `MIGRATE_FLUSH_MARK` control message arrives, so the
    /// subclass can drop any pending state that shouldn't survive a
    /// migration (the core does not clear the pipe on its own).
    fn handle_migrate_flush_mark(&mut self) {}

    /// Called once a `MIGRATE_DATA` control message's body has arrived.
    /// The blob's layout is channel-specific and out of scope here; the
    /// subclass interprets it and hands back the send serial to resume
    /// from. Returning `None` rejects the migration and is fatal.
    fn handle_migrate_data(&mut self, _data: &[u8]) -> Option<u64> {
        Some(0)
    }

    /// Called right before the channel tears the connection down.
    fn on_disconnect(&mut self) {}
}

/// A handler that dispatches through a generated wire parser instead of
/// raw bytes. The parser itself (decoding `body` into `Message`) is out
/// of scope here; this trait is the seam a generated parser would bind
/// against. Mirrors [`ChannelHandler`] in every other respect.
pub trait ParsedChannelHandler {
    type Message;
    type Item;

    fn parse(&self, msg_type: u16, body: &[u8]) -> Option<Self::Message>;
    fn handle_parsed(&mut self, msg_type: u16, message: Self::Message) -> bool;

    fn config_socket(&mut self) -> bool {
        true
    }

    fn alloc_recv_buf(&mut self, header: &SpiceDataHeader) -> Option<Vec<u8>> {
        Some(vec![0u8; header.size as usize])
    }

    fn release_recv_buf(&mut self, _header: &SpiceDataHeader, _buf: Vec<u8>) {}

    fn hold_item(&mut self, _item: &Self::Item) {}

    fn send_item(&mut self, item: &Self::Item) -> Message;

    fn release_item(&mut self, _item: Self::Item, _item_pushed: bool) {}

    fn handle_migrate_flush_mark(&mut self) {}

    fn handle_migrate_data(&mut self, _data: &[u8]) -> Option<u64> {
        Some(0)
    }

    fn on_disconnect(&mut self) {}
}

/// Adapts a [`ParsedChannelHandler`] to the raw [`ChannelHandler`] seam a
/// `ChannelClient` drives, so the client never needs to be generic over
/// the parsed message type.
pub struct Parsed<P>(pub P);

impl<P: ParsedChannelHandler> ChannelHandler for Parsed<P> {
    type Item = P::Item;

    #[inline]
    fn handle_message(&mut self, msg_type: u16, body: &[u8]) -> bool {
        match self.0.parse(msg_type, body) {
            Some(message) => self.0.handle_parsed(msg_type, message),
            None => false,
        }
    }

    #[inline]
    fn config_socket(&mut self) -> bool {
        self.0.config_socket()
    }

    #[inline]
    fn alloc_recv_buf(&mut self, header: &SpiceDataHeader) -> Option<Vec<u8>> {
        self.0.alloc_recv_buf(header)
    }

    #[inline]
    fn release_recv_buf(&mut self, header: &SpiceDataHeader, buf: Vec<u8>) {
        self.0.release_recv_buf(header, buf)
    }

    #[inline]
    fn hold_item(&mut self, item: &Self::Item) {
        self.0.hold_item(item)
    }

    #[inline]
    fn send_item(&mut self, item: &Self::Item) -> Message {
        self.0.send_item(item)
    }

    #[inline]
    fn release_item(&mut self, item: Self::Item, item_pushed: bool) {
        self.0.release_item(item, item_pushed)
    }

    #[inline]
    fn handle_migrate_flush_mark(&mut self) {
        self.0.handle_migrate_flush_mark()
    }

    #[inline]
    fn handle_migrate_data(&mut self, data: &[u8]) -> Option<u64> {
        self.0.handle_migrate_data(data)
    }

    #[inline]
    fn on_disconnect(&mut self) {
        self.0.on_disconnect()
    }
}
