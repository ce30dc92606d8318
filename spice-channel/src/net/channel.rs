use crate::net::callbacks::ChannelHandler;
use crate::net::client::ChannelClient;
use crate::net::config::ChannelConfig;
use crate::net::error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
use crate::net::eventloop::{EventLoop, Interest};
use crate::net::pipe::PipeItemId;
use crate::net::transport::Stream;
use flux::logging::{self, Logger};
use std::os::unix::io::AsRawFd;

/// Owns at most one connected client at a time, plus the event loop watch
/// backing it. Multi-client fan-out is out of scope; a second `attach`
/// while one is already connected replaces it, matching a single-client
/// channel's lifecycle rather than pretending to support several.
pub struct Channel<S, H, E: EventLoop> {
    client: Option<ChannelClient<S, H>>,
    event_loop: E,
    watch: Option<E::Watch>,
    log: Logger,
}

impl<S: Stream, H: ChannelHandler, E: EventLoop> Channel<S, H, E> {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(event_loop: E, log: L) -> Self {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => Logger::root(logging::Discard, logging::o!()),
        };
        Channel {
            client: None,
            event_loop,
            watch: None,
            log,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Attaches a newly-accepted connection: validates it via the
    /// handler's `config_socket`, registers it with the event loop for
    /// read readiness, and replaces any previously attached client.
    /// Fails the whole attach (stream dropped, nothing registered) if
    /// `config_socket` refuses the connection.
    pub fn attach(&mut self, stream: S, mut handler: H, config: ChannelConfig) -> NetworkResult<()> {
        logging::debug!(self.log, "attaching new client"; "context" => "attach",
                        "replacing_existing" => self.is_connected());
        self.disconnect();

        if !handler.config_socket() {
            logging::debug!(self.log, "handler refused socket configuration"; "context" => "attach");
            return Err(NetworkError::Fatal(ErrorType::ConfigSocketRefused));
        }

        let watch = self
            .event_loop
            .register(stream.as_raw_fd(), Interest::READ)?;
        self.watch = Some(watch);
        self.client = Some(ChannelClient::new(stream, handler, config, &self.log));
        Ok(())
    }

    /// Queues a data message for the connected client. A no-op if no
    /// client is attached.
    pub fn enqueue(&mut self, item: H::Item) -> Option<PipeItemId> {
        self.client.as_mut().map(|c| c.enqueue(item))
    }

    /// Requests a fresh ack window from the connected client.
    pub fn request_ack(&mut self) -> Option<PipeItemId> {
        self.client.as_mut().map(|c| c.request_ack())
    }

    /// Un-blocks a freshly attached client's pump once the handshake is
    /// done. A no-op if no client is attached.
    pub fn init_outgoing_messages_window(&mut self) -> NetworkResult<()> {
        let result = match self.client.as_mut() {
            Some(client) => client.init_outgoing_messages_window(),
            None => return Ok(()),
        };
        match result {
            Ok(()) | Err(NetworkError::Wait) => self.reconcile_interest(),
            Err(_) => self.disconnect(),
        }
        result
    }

    /// Services a read-readiness event: dispatches every complete inbound
    /// message currently buffered. Tears the client down on a fatal
    /// error; a control message alone never triggers disconnection.
    pub fn on_readable(&mut self) -> NetworkResult<()> {
        let result = match self.client.as_mut() {
            Some(client) => client.receive(),
            None => return Ok(()),
        };

        if result.has_failed() {
            self.disconnect();
        } else {
            self.reconcile_interest();
        }

        result
    }

    /// Services a write-readiness event: pumps the outgoing pipe.
    pub fn on_writable(&mut self) -> NetworkResult<()> {
        let result = match self.client.as_mut() {
            Some(client) => client.push(),
            None => return Ok(()),
        };

        match result {
            Ok(()) | Err(NetworkError::Wait) => self.reconcile_interest(),
            Err(_) => self.disconnect(),
        }

        result
    }

    /// True once the connected client has outgoing work queued and is not
    /// blocked on the ack window; callers use this to decide whether to
    /// keep registering for write readiness.
    #[inline]
    pub fn wants_write(&self) -> bool {
        self.client.as_ref().map_or(false, |c| c.has_pending_writes())
    }

    /// Re-arms the watch's interest mask: READ is always wanted while
    /// attached, WRITE is added exactly while the writer is suspended on
    /// backpressure.
    fn reconcile_interest(&mut self) {
        let (client, watch) = match (&self.client, self.watch) {
            (Some(client), Some(watch)) => (client, watch),
            _ => return,
        };

        let mut interest = Interest::READ;
        if client.is_blocked() {
            interest |= Interest::WRITE;
        }

        if let Err(err) = self.event_loop.update(watch, interest) {
            logging::debug!(self.log, "failed to update watch interest";
                            "context" => "reconcile_interest", "error" => %err);
        }
    }

    /// Half-closes the connected client without tearing it down: removes
    /// the watch and releases any in-flight item, but keeps the client
    /// object and its queued pipe alive. A no-op if nothing is attached.
    pub fn shutdown(&mut self) {
        if let Some(watch) = self.watch.take() {
            let _ = self.event_loop.deregister(watch);
        }
        if let Some(client) = self.client.as_mut() {
            client.shutdown();
        }
    }

    /// Disconnects and drops the current client, if any, deregistering
    /// its watch first.
    pub fn disconnect(&mut self) {
        if let Some(watch) = self.watch.take() {
            let _ = self.event_loop.deregister(watch);
        }
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::error::ErrorType;
    use crate::net::marshaller::Message;
    use crate::net::transport::test_support::MockStream;
    use std::cell::Cell;
    use std::io;
    use std::os::unix::io::RawFd;

    /// An event loop double that just counts calls; no real registration
    /// happens since `MockStream`'s fd is a dummy value anyway.
    #[derive(Default)]
    struct NoopEventLoop {
        registered: Cell<u32>,
        deregistered: Cell<u32>,
    }

    impl EventLoop for NoopEventLoop {
        type Watch = ();

        fn register(&self, _fd: RawFd, _interest: Interest) -> io::Result<()> {
            self.registered.set(self.registered.get() + 1);
            Ok(())
        }

        fn update(&self, _watch: (), _interest: Interest) -> io::Result<()> {
            Ok(())
        }

        fn deregister(&self, _watch: ()) -> io::Result<()> {
            self.deregistered.set(self.deregistered.get() + 1);
            Ok(())
        }
    }

    struct NullHandler;

    impl ChannelHandler for NullHandler {
        type Item = Message;

        fn handle_message(&mut self, _msg_type: u16, _body: &[u8]) -> bool {
            true
        }

        fn send_item(&mut self, item: &Self::Item) -> Message {
            item.clone()
        }
    }

    struct RefusingHandler;

    impl ChannelHandler for RefusingHandler {
        type Item = Message;

        fn handle_message(&mut self, _msg_type: u16, _body: &[u8]) -> bool {
            true
        }

        fn config_socket(&mut self) -> bool {
            false
        }

        fn send_item(&mut self, item: &Self::Item) -> Message {
            item.clone()
        }
    }

    fn channel() -> Channel<MockStream, NullHandler, NoopEventLoop> {
        Channel::new(NoopEventLoop::default(), None)
    }

    #[test]
    fn attach_replaces_any_existing_client() {
        let mut channel = channel();
        assert!(!channel.is_connected());

        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();
        assert!(channel.is_connected());

        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();
        assert!(channel.is_connected());
    }

    #[test]
    fn config_socket_refusal_fails_attach() {
        let mut channel: Channel<MockStream, RefusingHandler, NoopEventLoop> =
            Channel::new(NoopEventLoop::default(), None);

        let err = channel
            .attach(MockStream::default(), RefusingHandler, ChannelConfig::default())
            .unwrap_err();
        assert_eq!(err, NetworkError::Fatal(ErrorType::ConfigSocketRefused));
        assert!(!channel.is_connected());
    }

    #[test]
    fn fresh_client_stays_blocked_until_initialized() {
        let mut channel = channel();
        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();

        channel.enqueue(Message::single(1, b"x".to_vec()));
        assert!(!channel.wants_write(), "a fresh client is permanently blocked until initialized");
    }

    #[test]
    fn wants_write_reflects_queued_work_once_initialized() {
        let mut channel = channel();
        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();
        channel.init_outgoing_messages_window().unwrap();

        channel.enqueue(Message::single(1, b"x".to_vec()));
        assert!(channel.wants_write());

        channel.on_writable().unwrap();
        assert!(!channel.wants_write());
    }

    #[test]
    fn fatal_read_error_disconnects_the_client() {
        let mut channel = channel();
        let stream = MockStream::with_incoming(Vec::new());
        channel.attach(stream, NullHandler, ChannelConfig::default()).unwrap();

        let err = channel.on_readable().unwrap_err();
        assert_eq!(err, NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::UnexpectedEof)));
        assert!(!channel.is_connected());
    }

    #[test]
    fn no_client_attached_is_a_harmless_no_op() {
        let mut channel = channel();
        assert!(channel.on_readable().is_ok());
        assert!(channel.on_writable().is_ok());
    }

    #[test]
    fn disconnect_deregisters_the_watch() {
        let event_loop = NoopEventLoop::default();
        let mut channel: Channel<MockStream, NullHandler, NoopEventLoop> =
            Channel::new(event_loop, None);
        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();

        channel.disconnect();
        assert!(!channel.is_connected());
    }

    #[test]
    fn shutdown_keeps_the_client_but_stops_watching() {
        let mut channel = channel();
        channel.attach(MockStream::default(), NullHandler, ChannelConfig::default()).unwrap();
        channel.enqueue(Message::single(1, b"x".to_vec()));

        channel.shutdown();
        assert!(channel.is_connected(), "shutdown half-closes but does not drop the client");
    }
}
