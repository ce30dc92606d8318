use std::io;
use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Split mirrors the framing layer's two outcomes: `Wait` means "try again
/// once the transport is ready", everything else is fatal and must tear the
/// channel down.
#[derive(Debug, Eq, PartialEq, Error)]
pub enum NetworkError {
    #[error("transport would block")]
    Wait,
    #[error("{0}")]
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq, Error)]
pub enum ErrorType {
    /// Orderly close (read returned 0) or a transport error other than
    /// `WouldBlock`/`Interrupted` while assembling or flushing a frame.
    #[error("transport io error: {0:?}")]
    Io(io::ErrorKind),
    /// The handler's parser rejected the message body.
    #[error("parser rejected message body")]
    ParseFailed,
    /// `handle_message`/`handle_parsed` returned `false`.
    #[error("handler rejected message")]
    HandlerRejected,
    /// The subclass refused to allocate a receive buffer for the message.
    #[error("subclass refused to allocate a receive buffer")]
    AllocRefused,
    /// An inbound control message carried a body of the wrong size.
    #[error("control message body had the wrong size")]
    BadControlBody,
    /// A message header advertised a body larger than the configured
    /// maximum.
    #[error("message body of {0} bytes exceeds the configured maximum")]
    MessageTooLarge(u32),
    /// `MIGRATE_DATA` arrived while `send_serial != 0`.
    #[error("migrate data arrived with a send serial already set")]
    MigrationSerialAlreadySet,
    /// The sticky shutdown flag forced the next dispatch boundary to fail,
    /// even though the handler that just ran returned success.
    #[error("channel client is shutting down")]
    ShutDown,
    /// The subclass's `config_socket` hook refused the connection.
    #[error("subclass refused the socket configuration")]
    ConfigSocketRefused,
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

/// Convenience used the way the teacher's call sites check results: `Wait`
/// is not failure, anything else tears the channel down.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(NetworkError::Wait))
    }
}
