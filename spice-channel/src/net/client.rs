use crate::net::ack::AckState;
use crate::net::callbacks::ChannelHandler;
use crate::net::config::ChannelConfig;
use crate::net::error::{ErrorType, NetworkError, NetworkResult};
use crate::net::header::SpiceDataHeader;
use crate::net::marshaller::{Marshal, Message};
use crate::net::pipe::{Pipe, PipeItemId};
use crate::net::reader::FramedReader;
use crate::net::transport::Stream;
use crate::net::writer::VectoredWriter;
use flux::logging::{self, Logger};

/// Control messages the client sends, interpreted locally rather than
/// handed to the subclass.
pub mod control {
    pub const ACK_SYNC: u16 = 1;
    pub const ACK: u16 = 2;
    pub const DISCONNECTING: u16 = 3;
    pub const MIGRATE_FLUSH_MARK: u16 = 4;
    pub const MIGRATE_DATA: u16 = 5;
}

/// The control message the channel sends to (re)establish the client's
/// ack window and generation.
const MSG_SET_ACK: u16 = 1;

/// An item queued on the outgoing pipe: either a subclass-produced data
/// item or a control message the client itself constructs. `SET_ACK` is
/// serviced entirely inside the pipeline (`red_channel_client_send_item`'s
/// built-in `PIPE_ITEM_TYPE_SET_ACK` case); a data item is handed to the
/// handler's `hold_item`/`send_item`/`release_item` hooks.
enum OutgoingItem<I> {
    Data(I),
    SetAck,
}

/// A message currently being flushed by the writer: its encoded header,
/// the already-marshalled bytes, and the item it was built from — kept
/// alive until `write_message` reports it fully sent, at which point the
/// item (if a data item) is released.
struct InFlight<I> {
    header_bytes: [u8; SpiceDataHeader::SIZE],
    message: Message,
    item: OutgoingItem<I>,
}

/// Per-connection channel client ("rcc" in the original): owns the
/// transport, the framing reader/writer, the outgoing pipe and its ack
/// window, and drives dispatch to a subclass [`ChannelHandler`].
///
/// `push()` is reentrant-safe: a handler invoked from inside `receive()`
/// may itself call `push()` (e.g. to answer a request inline); nested
/// calls collapse into the outer pump via `during_send`, matching
/// `red_channel_client_push`'s guard.
pub struct ChannelClient<S, H: ChannelHandler> {
    stream: S,
    handler: H,
    config: ChannelConfig,
    reader: FramedReader,
    writer: VectoredWriter,
    ack: AckState,
    pipe: Pipe<OutgoingItem<H::Item>>,
    in_flight: Option<InFlight<H::Item>>,
    /// True exactly when the writer most recently suspended on
    /// `NetworkError::Wait`; the owning `Channel` arms WRITE readiness
    /// while this holds and reverts to READ-only once it clears.
    blocked: bool,
    during_send: bool,
    /// The serial stamped into the most recently begun outgoing message's
    /// header; zero until the first message is sent. Mirrors the
    /// original's single `send_data.serial` counter — there is no separate
    /// "next serial" field, so this also doubles as
    /// `red_channel_client_get_message_serial`'s return value and the
    /// guard `MIGRATE_DATA` checks against.
    send_serial: u64,
    /// Sticky flag set by `shutdown()`. Checked immediately after every
    /// dispatch so a handler that both returns success and triggers a
    /// shutdown still terminates `receive()` via a fatal error.
    shut: bool,
    /// Set once `disconnect()` has fully run; makes `disconnect()`
    /// idempotent and short-circuits any further `receive()` call.
    torn_down: bool,
    log: Logger,
}

impl<S: Stream, H: ChannelHandler> ChannelClient<S, H> {
    /// The only constructor: a real handler is mandatory, so there is no
    /// do-nothing-callback state to accidentally ship. `log` is the
    /// parent logger this client derives its own child logger from; pass
    /// `None` to discard logging entirely.
    ///
    /// A fresh client starts permanently blocked on the ack window (see
    /// [`AckState::new`]); the embedder must call
    /// [`Self::init_outgoing_messages_window`] once the handshake
    /// completes before anything will actually be sent.
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        stream: S,
        handler: H,
        config: ChannelConfig,
        log: L,
    ) -> Self {
        let ack = AckState::new(config.client_ack_window, config.handle_acks);
        let reader = FramedReader::new(config.max_message_size);
        let writer = VectoredWriter::new(config.max_send_vec);
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => Logger::root(logging::Discard, logging::o!()),
        };

        ChannelClient {
            stream,
            handler,
            config,
            reader,
            writer,
            ack,
            pipe: Pipe::new(),
            in_flight: None,
            blocked: false,
            during_send: false,
            send_serial: 0,
            shut: false,
            torn_down: false,
            log,
        }
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut
    }

    #[inline]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[inline]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The serial stamped into the most recently begun outgoing message.
    /// Mirrors `red_channel_client_get_message_serial`.
    #[inline]
    pub fn send_serial(&self) -> u64 {
        self.send_serial
    }

    #[inline]
    pub fn pipe_len(&self) -> usize {
        self.pipe.len()
    }

    /// True exactly when the writer is suspended on backpressure; the
    /// owning [`crate::net::channel::Channel`] uses this to decide whether
    /// the watch needs WRITE interest.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Whether the writer still has something to flush: either a message
    /// already in flight, or an unblocked pipe with items queued.
    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        self.in_flight.is_some() || (!self.pipe.is_empty() && !self.ack.is_blocked())
    }

    /// Overrides the ack credit granted per window, taking effect on the
    /// next `SET_ACK`. Mirrors `red_channel_client_ack_set_client_window`.
    #[inline]
    pub fn set_client_ack_window(&mut self, window: u32) {
        self.ack.set_client_window(window);
    }

    /// Un-blocks a freshly attached client once the handshake is done,
    /// then immediately tries to drain the pipe. Mirrors
    /// `red_channel_client_init_outgoing_messages_window`.
    pub fn init_outgoing_messages_window(&mut self) -> NetworkResult<()> {
        self.ack.init_outgoing_messages_window();
        self.push()
    }

    /// Queues a data item for delivery. Does not itself attempt to send;
    /// callers pump with [`Self::push`].
    #[inline]
    pub fn enqueue(&mut self, item: H::Item) -> PipeItemId {
        self.pipe.push_tail(OutgoingItem::Data(item))
    }

    /// Enqueues a `SET_ACK` at normal priority, behind whatever is already
    /// queued. Mirrors `red_channel_push_set_ack`/`pipe_add`: the ack
    /// generation is not bumped and `messages_window` is not zeroed here —
    /// both only take effect once the item is actually sent (see
    /// `begin_send`'s `SetAck` arm), so an item that is cancelled or left
    /// sitting in the pipe never silently discards in-flight client ACKs
    /// or reopens the flow-control gate early.
    pub fn request_ack(&mut self) -> PipeItemId {
        self.pipe.push_tail(OutgoingItem::SetAck)
    }

    /// Cancels a not-yet-sent queued item, releasing it with
    /// `item_pushed=false`. Returns `false` if the item was already sent
    /// or never existed. Mirrors `pipe_remove_and_release`.
    pub fn cancel(&mut self, id: PipeItemId) -> bool {
        match self.pipe.remove(id) {
            Some(OutgoingItem::Data(item)) => {
                self.handler.release_item(item, false);
                true
            }
            Some(OutgoingItem::SetAck) => true,
            None => false,
        }
    }

    /// Drops every queued item without sending it, releasing each data
    /// item with `item_pushed=false`. Used on disconnect and to discard
    /// stale work after a migration flush mark.
    pub fn clear_pipe(&mut self) {
        for item in self.pipe.clear() {
            if let OutgoingItem::Data(data) = item {
                self.handler.release_item(data, false);
            }
        }
    }

    /// Drives the outgoing pump: flushes any message already in flight,
    /// then pops and sends from the pipe until it empties, the transport
    /// blocks, or the ack window closes. Reentrant: a nested call made
    /// from inside a handler callback (itself invoked from `push` or
    /// `receive`) is a no-op, folding into the outer pump.
    pub fn push(&mut self) -> NetworkResult<()> {
        if self.during_send {
            logging::trace!(self.log, "push re-entered while already pumping, folding in";
                            "context" => "push");
            return Ok(());
        }
        self.during_send = true;
        let result = self.pump();
        self.during_send = false;

        if let Err(ref err) = result {
            logging::trace!(self.log, "pump stopped"; "context" => "push", "error" => ?err);
        }

        result
    }

    fn pump(&mut self) -> NetworkResult<()> {
        loop {
            if self.in_flight.is_none() {
                if self.ack.is_blocked() {
                    return Ok(());
                }
                let item = match self.pipe.pop_front() {
                    Some(item) => item.into_inner(),
                    None => return Ok(()),
                };
                self.begin_send(item);
            }

            let in_flight = self
                .in_flight
                .take()
                .expect("checked above: in_flight is populated before this point");

            match self
                .writer
                .write_message(&mut self.stream, &in_flight.header_bytes, &in_flight.message)
            {
                Ok(()) => {
                    self.blocked = false;
                    match in_flight.item {
                        OutgoingItem::Data(item) => {
                            self.ack.message_sent();
                            self.handler.release_item(item, true);
                        }
                        OutgoingItem::SetAck => {}
                    }
                }
                Err(NetworkError::Wait) => {
                    self.blocked = true;
                    self.in_flight = Some(in_flight);
                    return Err(NetworkError::Wait);
                }
                Err(fatal) => {
                    self.in_flight = Some(in_flight);
                    return Err(fatal);
                }
            }
        }
    }

    fn begin_send(&mut self, item: OutgoingItem<H::Item>) {
        let message = match &item {
            OutgoingItem::Data(data) => {
                self.handler.hold_item(data);
                self.handler.send_item(data)
            }
            OutgoingItem::SetAck => {
                // Generation bump and messages_window reset happen here,
                // at the moment SET_ACK is actually sent, not when it was
                // enqueued — mirrors `red_channel_client_send_set_ack`.
                let (generation, window) = self.ack.next_set_ack();
                let mut body = Vec::with_capacity(8);
                body.extend_from_slice(&generation.to_le_bytes());
                body.extend_from_slice(&window.to_le_bytes());
                Message::single(MSG_SET_ACK, body)
            }
        };

        self.send_serial += 1;
        let serial = self.send_serial;

        let header = SpiceDataHeader {
            serial,
            msg_type: message.msg_type(),
            size: message.body_len() as u32,
            sub_list: message.sub_list(),
        };
        let mut header_bytes = [0u8; SpiceDataHeader::SIZE];
        header
            .write(&mut header_bytes[..])
            .expect("writing into a fixed-size in-memory buffer cannot fail");

        self.in_flight = Some(InFlight { header_bytes, message, item });
    }

    /// Reads and dispatches as many complete inbound messages as the
    /// transport currently has buffered. The sticky `shut` flag, checked
    /// immediately after each dispatch, terminates the loop with a fatal
    /// error even if the handler that just ran returned success —
    /// matching the original's check of the shut-down flag before any
    /// further state reset.
    pub fn receive(&mut self) -> NetworkResult<()> {
        logging::trace!(self.log, "receiving data from the network"; "context" => "receive");

        loop {
            if self.torn_down {
                return Ok(());
            }

            let (header, body) = match self.reader.read_message(&mut self.stream, &mut self.handler) {
                Ok(message) => message,
                Err(NetworkError::Wait) => return Ok(()),
                Err(fatal) => return Err(fatal),
            };

            logging::trace!(self.log, "dispatching inbound message";
                            "context" => "receive", "msg_type" => header.msg_type, "size" => header.size);

            self.dispatch(header.msg_type, &body)?;

            if self.shut {
                return Err(NetworkError::Fatal(ErrorType::ShutDown));
            }
        }
    }

    fn dispatch(&mut self, msg_type: u16, body: &[u8]) -> NetworkResult<()> {
        match msg_type {
            control::ACK_SYNC => {
                let generation = read_u32(body)?;
                self.ack.handle_ack_sync(generation);
                Ok(())
            }
            control::ACK => {
                if !body.is_empty() {
                    return Err(NetworkError::Fatal(ErrorType::BadControlBody));
                }
                if self.ack.handle_ack() {
                    match self.push() {
                        Ok(()) | Err(NetworkError::Wait) => Ok(()),
                        Err(fatal) => Err(fatal),
                    }
                } else {
                    Ok(())
                }
            }
            control::DISCONNECTING => {
                // Accepted with no state change: the client is about to
                // close its end; the core doesn't need to act on this
                // control message itself (the eventual orderly close is
                // handled as a normal fatal read error).
                logging::debug!(self.log, "client reported disconnecting"; "context" => "dispatch");
                Ok(())
            }
            control::MIGRATE_FLUSH_MARK => {
                logging::debug!(self.log, "migrate flush mark"; "context" => "dispatch",
                                "pending_pipe_items" => self.pipe.len());
                self.handler.handle_migrate_flush_mark();
                Ok(())
            }
            control::MIGRATE_DATA => {
                if self.send_serial != 0 {
                    logging::error!(self.log, "migrate data arrived with send_serial already set";
                                    "context" => "dispatch", "send_serial" => self.send_serial);
                    return Err(NetworkError::Fatal(ErrorType::MigrationSerialAlreadySet));
                }
                match self.handler.handle_migrate_data(body) {
                    Some(serial) => {
                        logging::debug!(self.log, "migration serial restored";
                                        "context" => "dispatch", "send_serial" => serial);
                        self.send_serial = serial;
                        Ok(())
                    }
                    None => Err(NetworkError::Fatal(ErrorType::HandlerRejected)),
                }
            }
            _ => {
                if self.handler.handle_message(msg_type, body) {
                    Ok(())
                } else {
                    Err(NetworkError::Fatal(ErrorType::HandlerRejected))
                }
            }
        }
    }

    /// Half-closes the connection and releases any in-flight item with
    /// `item_pushed=false`, but does NOT clear the pipe — that is
    /// `clear_pipe`'s job, called explicitly by `disconnect`. Idempotent:
    /// a second call is a no-op.
    pub fn shutdown(&mut self) {
        if self.shut {
            return;
        }
        logging::debug!(self.log, "shutting down client"; "context" => "shutdown");
        self.shut = true;
        if let Some(in_flight) = self.in_flight.take() {
            if let OutgoingItem::Data(item) = in_flight.item {
                self.handler.release_item(item, false);
            }
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Tears the connection down fully: releases any in-flight item,
    /// clears the pipe (both with `item_pushed=false`), notifies the
    /// handler, and shuts down the transport. Idempotent.
    pub fn disconnect(&mut self) {
        if self.torn_down {
            return;
        }
        logging::debug!(self.log, "disconnecting client"; "context" => "disconnect",
                        "pending_pipe_items" => self.pipe.len());
        if let Some(in_flight) = self.in_flight.take() {
            if let OutgoingItem::Data(item) = in_flight.item {
                self.handler.release_item(item, false);
            }
        }
        self.clear_pipe();
        self.handler.on_disconnect();
        self.shut = true;
        self.torn_down = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn read_u32(body: &[u8]) -> NetworkResult<u32> {
    if body.len() != 4 {
        return Err(NetworkError::Fatal(ErrorType::BadControlBody));
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(body);
    Ok(u32::from_le_bytes(bytes))
}
