use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::io::AsRawFd;

/// The socket-like object a channel reads from and writes to. The real
/// transport (handshake, encryption, the actual `mio::net::TcpStream`) is
/// out of scope here; this trait is the seam the framing layer binds
/// against, and `mio::net::TcpStream` below is the only concrete
/// implementation shipped. `AsRawFd` is required so a `Channel` can
/// register/update/deregister it against an [`crate::net::eventloop::EventLoop`].
pub trait Stream: Read + Write + AsRawFd {
    /// A scatter/gather write. The default implementation falls back to
    /// writing the first non-empty slice; real transports should override
    /// this with a real `writev`.
    fn write_vectored(&mut self, bufs: &[io::IoSlice<'_>]) -> io::Result<usize> {
        Write::write_vectored(self, bufs)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()>;
}

impl Stream for mio::net::TcpStream {
    #[inline]
    fn write_vectored(&mut self, bufs: &[io::IoSlice<'_>]) -> io::Result<usize> {
        Write::write_vectored(self, bufs)
    }

    #[inline]
    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        mio::net::TcpStream::shutdown(self, how)
    }
}
