use crate::net::error::{ErrorType, NetworkError, NetworkResult};
use crate::net::marshaller::{build_vec, Marshal};
use crate::net::transport::Stream;
use std::io;

/// Flushes one header + message pair onto a non-blocking transport via
/// scatter/gather writes, capped at `max_vec` segments per `writev` call.
/// Tracks how many bytes of the combined header+body stream have already
/// been written so a message that spans several readiness events resumes
/// exactly where it left off, mirroring `red_peer_handle_outgoing`.
#[derive(Debug)]
pub struct VectoredWriter {
    max_vec: usize,
    pos: usize,
}

impl VectoredWriter {
    #[inline]
    pub fn new(max_vec: usize) -> Self {
        VectoredWriter { max_vec, pos: 0 }
    }

    /// Bytes of the current message already written. Zero between
    /// messages and right after `write_message` completes one.
    #[inline]
    pub fn progress(&self) -> usize {
        self.pos
    }

    /// Writes as much of `header` + `message` as the transport accepts
    /// without blocking. `Ok(())` means the message is fully flushed and
    /// the writer is reset for the next one. `Err(NetworkError::Wait)`
    /// means the transport is full for now; internal progress is
    /// preserved and the same `header`/`message` must be passed again on
    /// the next call.
    pub fn write_message<S: Stream>(
        &mut self,
        stream: &mut S,
        header: &[u8],
        message: &dyn Marshal,
    ) -> NetworkResult<()> {
        let total_len = header.len() + message.body_len();

        loop {
            if self.pos >= total_len {
                self.pos = 0;
                return Ok(());
            }

            let (slices, _truncated) = build_vec(header, message, self.pos, self.max_vec);
            match stream.write_vectored(&slices) {
                Ok(0) => {
                    return Err(NetworkError::Fatal(ErrorType::Io(
                        std::io::ErrorKind::WriteZero,
                    )));
                }
                Ok(n) => self.pos += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::header::SpiceDataHeader;
    use crate::net::marshaller::Message;
    use crate::net::transport::test_support::MockStream;
    use std::collections::VecDeque;

    fn header_bytes() -> Vec<u8> {
        let header = SpiceDataHeader {
            serial: 1,
            msg_type: 3,
            size: 5,
            sub_list: 0,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn writes_header_and_body_in_one_call() {
        let message = Message::single(3, b"hello".to_vec());
        let header = header_bytes();
        let mut stream = MockStream::default();
        let mut writer = VectoredWriter::new(16);

        writer.write_message(&mut stream, &header, &message).unwrap();
        assert_eq!(writer.progress(), 0);

        let mut expected = header.clone();
        expected.extend_from_slice(b"hello");
        assert_eq!(stream.outgoing, expected);
    }

    #[test]
    fn resumes_after_a_partial_write() {
        let message = Message::single(3, b"hello".to_vec());
        let header = header_bytes();
        let mut stream = MockStream::default();
        stream.write_quota = Some(VecDeque::from(vec![10]));
        let mut writer = VectoredWriter::new(16);

        let err = writer.write_message(&mut stream, &header, &message);
        assert_eq!(err.unwrap_err(), NetworkError::Wait);
        assert_eq!(writer.progress(), 10);

        writer.write_message(&mut stream, &header, &message).unwrap();
        assert_eq!(writer.progress(), 0);

        let mut expected = header.clone();
        expected.extend_from_slice(b"hello");
        assert_eq!(stream.outgoing, expected);
    }

    #[test]
    fn interrupted_write_is_retried_transparently() {
        let message = Message::single(3, b"hello".to_vec());
        let header = header_bytes();
        let mut stream = MockStream::default();
        stream.interrupt_next_write = true;
        let mut writer = VectoredWriter::new(16);

        writer.write_message(&mut stream, &header, &message).unwrap();

        let mut expected = header.clone();
        expected.extend_from_slice(b"hello");
        assert_eq!(stream.outgoing, expected);
    }

    #[test]
    fn would_block_preserves_progress() {
        let message = Message::single(3, b"hello".to_vec());
        let header = header_bytes();
        let mut stream = MockStream::default();
        stream.fail_next_write = true;
        let mut writer = VectoredWriter::new(16);

        let err = writer.write_message(&mut stream, &header, &message);
        assert_eq!(err.unwrap_err(), NetworkError::Wait);
        assert_eq!(writer.progress(), 0);
        assert!(stream.outgoing.is_empty());
    }
}
