use crate::net::callbacks::ChannelHandler;
use crate::net::error::{ErrorType, NetworkError, NetworkResult};
use crate::net::header::SpiceDataHeader;
use crate::net::transport::Stream;
use std::io::{self, Read};

#[derive(Debug)]
enum Phase {
    Header,
    /// Body buffer is allocated lazily, the moment the header completes,
    /// via the handler's `alloc_recv_buf` — not eagerly at header-parse
    /// time — so a refusal never touches the transport again.
    Body { header: SpiceDataHeader, buf: Vec<u8> },
}

/// Assembles length-prefixed messages off a non-blocking transport. One
/// call to `read_message` drives as many reads as the transport currently
/// has data for, returning the first fully-assembled message and leaving
/// any partial header/body progress in place for the next call. Mirrors
/// `red_peer_handle_incoming`'s two-phase header/body loop.
#[derive(Debug)]
pub struct FramedReader {
    max_message_size: u32,
    phase: Phase,
    header_buf: [u8; SpiceDataHeader::SIZE],
    header_pos: usize,
    body_pos: usize,
}

impl FramedReader {
    #[inline]
    pub fn new(max_message_size: u32) -> Self {
        FramedReader {
            max_message_size,
            phase: Phase::Header,
            header_buf: [0u8; SpiceDataHeader::SIZE],
            header_pos: 0,
            body_pos: 0,
        }
    }

    /// Reads as far as the transport allows without blocking and returns
    /// the next fully-assembled message. Returns `Err(NetworkError::Wait)`
    /// once the transport has no more data buffered right now; the caller
    /// should call again after the next readiness event. A `read` that
    /// returns `Ok(0)` is an orderly close and is fatal, matching
    /// `red_peer_receive`. `handler` supplies the receive buffer via
    /// `alloc_recv_buf`/`release_recv_buf`.
    pub fn read_message<S: Stream, H: ChannelHandler>(
        &mut self,
        stream: &mut S,
        handler: &mut H,
    ) -> NetworkResult<(SpiceDataHeader, Vec<u8>)> {
        loop {
            match &mut self.phase {
                Phase::Header => {
                    if self.header_pos < SpiceDataHeader::SIZE {
                        let buf = &mut self.header_buf[..];
                        let read = fill(stream, buf, self.header_pos)?;
                        self.header_pos += read;
                        continue;
                    }

                    let header = SpiceDataHeader::read(&self.header_buf[..])
                        .map_err(|_| NetworkError::Fatal(ErrorType::ParseFailed))?;

                    if header.size > self.max_message_size {
                        return Err(NetworkError::Fatal(ErrorType::MessageTooLarge(header.size)));
                    }

                    let buf = handler
                        .alloc_recv_buf(&header)
                        .ok_or(NetworkError::Fatal(ErrorType::AllocRefused))?;
                    self.body_pos = 0;
                    self.phase = Phase::Body { header, buf };
                }
                Phase::Body { header, buf } => {
                    let header = *header;
                    if self.body_pos < buf.len() {
                        match fill(stream, &mut buf[..], self.body_pos) {
                            Ok(read) => {
                                self.body_pos += read;
                                continue;
                            }
                            Err(err) => {
                                let (_, buf) = take_body(&mut self.phase);
                                handler.release_recv_buf(&header, buf);
                                return Err(err);
                            }
                        }
                    }

                    let (_, body) = take_body(&mut self.phase);
                    self.body_pos = 0;
                    self.header_pos = 0;
                    self.phase = Phase::Header;
                    return Ok((header, body));
                }
            }
        }
    }
}

/// Swaps the current `Body` phase out for `Header`, handing back the
/// header and buffer it held. Only called once the phase is known to be
/// `Body`.
fn take_body(phase: &mut Phase) -> (SpiceDataHeader, Vec<u8>) {
    match std::mem::replace(phase, Phase::Header) {
        Phase::Body { header, buf } => (header, buf),
        Phase::Header => unreachable!("take_body called outside the body phase"),
    }
}

/// Reads into `buf[pos..]` once. `Ok(0)` becomes a fatal orderly-close
/// error; `WouldBlock` becomes `NetworkError::Wait` via the blanket
/// `From<io::Error>` conversion; `Interrupted` (EINTR) is retried
/// transparently and never surfaces to the caller.
#[inline]
fn fill<S: Stream>(stream: &mut S, buf: &mut [u8], pos: usize) -> NetworkResult<usize> {
    loop {
        match stream.read(&mut buf[pos..]) {
            Ok(0) => {
                return Err(NetworkError::Fatal(ErrorType::Io(
                    io::ErrorKind::UnexpectedEof,
                )))
            }
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::test_support::{MockStream, ReadStep};
    use std::collections::VecDeque;

    struct NullHandler;

    impl ChannelHandler for NullHandler {
        type Item = crate::net::marshaller::Message;

        fn handle_message(&mut self, _msg_type: u16, _body: &[u8]) -> bool {
            true
        }

        fn send_item(&mut self, item: &Self::Item) -> crate::net::marshaller::Message {
            item.clone()
        }
    }

    struct RefusingHandler;

    impl ChannelHandler for RefusingHandler {
        type Item = crate::net::marshaller::Message;

        fn handle_message(&mut self, _msg_type: u16, _body: &[u8]) -> bool {
            true
        }

        fn alloc_recv_buf(&mut self, _header: &SpiceDataHeader) -> Option<Vec<u8>> {
            None
        }

        fn send_item(&mut self, item: &Self::Item) -> crate::net::marshaller::Message {
            item.clone()
        }
    }

    fn frame(msg_type: u16, body: &[u8]) -> Vec<u8> {
        let header = SpiceDataHeader {
            serial: 1,
            msg_type,
            size: body.len() as u32,
            sub_list: 0,
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn reads_one_message_in_a_single_call() {
        let mut stream = MockStream::with_incoming(frame(5, b"hello"));
        let mut reader = FramedReader::new(1024);
        let mut handler = NullHandler;

        let (header, body) = reader.read_message(&mut stream, &mut handler).unwrap();
        assert_eq!(header.msg_type, 5);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn resumes_a_header_split_across_reads() {
        let mut stream = MockStream::with_incoming(frame(9, b"abc"));
        stream.read_steps = Some(VecDeque::from(vec![
            ReadStep::Bytes(4),
            ReadStep::WouldBlock,
        ]));
        let mut reader = FramedReader::new(1024);
        let mut handler = NullHandler;

        let err = reader.read_message(&mut stream, &mut handler);
        assert_eq!(err.unwrap_err(), NetworkError::Wait);

        let (header, body) = reader.read_message(&mut stream, &mut handler).unwrap();
        assert_eq!(header.msg_type, 9);
        assert_eq!(body, b"abc");
    }

    #[test]
    fn second_message_starts_fresh_after_first_completes() {
        let mut combined = frame(1, b"one");
        combined.extend(frame(2, b"two"));
        let mut stream = MockStream::with_incoming(combined);
        let mut reader = FramedReader::new(1024);
        let mut handler = NullHandler;

        let (h1, b1) = reader.read_message(&mut stream, &mut handler).unwrap();
        assert_eq!((h1.msg_type, b1), (1, b"one".to_vec()));

        let (h2, b2) = reader.read_message(&mut stream, &mut handler).unwrap();
        assert_eq!((h2.msg_type, b2), (2, b"two".to_vec()));
    }

    #[test]
    fn orderly_close_is_fatal() {
        let mut stream = MockStream::with_incoming(Vec::new());
        let mut reader = FramedReader::new(1024);
        let mut handler = NullHandler;

        let err = reader.read_message(&mut stream, &mut handler).unwrap_err();
        assert_eq!(
            err,
            NetworkError::Fatal(ErrorType::Io(io::ErrorKind::UnexpectedEof))
        );
    }

    #[test]
    fn oversized_header_is_rejected_before_allocating_body() {
        let mut stream = MockStream::with_incoming(frame(1, &[0u8; 32]));
        let mut reader = FramedReader::new(16);
        let mut handler = NullHandler;

        let err = reader.read_message(&mut stream, &mut handler).unwrap_err();
        assert_eq!(err, NetworkError::Fatal(ErrorType::MessageTooLarge(32)));
    }

    #[test]
    fn alloc_refusal_is_fatal_and_never_touches_the_body() {
        let mut stream = MockStream::with_incoming(frame(1, b"hello"));
        let mut reader = FramedReader::new(1024);
        let mut handler = RefusingHandler;

        let err = reader.read_message(&mut stream, &mut handler).unwrap_err();
        assert_eq!(err, NetworkError::Fatal(ErrorType::AllocRefused));
    }

    #[test]
    fn interrupted_reads_are_retried_transparently() {
        let mut stream = MockStream::with_incoming(frame(5, b"hello"));
        stream.read_steps = Some(VecDeque::from(vec![
            ReadStep::Interrupted,
            ReadStep::Interrupted,
        ]));
        let mut reader = FramedReader::new(1024);
        let mut handler = NullHandler;

        let (header, body) = reader.read_message(&mut stream, &mut handler).unwrap();
        assert_eq!(header.msg_type, 5);
        assert_eq!(body, b"hello");
    }
}
