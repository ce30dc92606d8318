use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};

bitflags::bitflags! {
    /// Readiness a channel wants to be notified about. Mirrors the
    /// watch-registration contract of the original event loop (fd,
    /// event mask, opaque token) without depending on its internals,
    /// which are out of scope here.
    pub struct Interest: u8 {
        const READ  = 0b0000_0001;
        const WRITE = 0b0000_0010;
    }
}

/// The event loop a channel registers its transport against. Its own
/// scheduling/dispatch internals are out of scope; only the
/// register/update/deregister contract the channel binds against matters
/// here. `Watch` is an opaque handle (fd + token for the mio backing) that
/// the channel holds and passes back in to update or deregister interest.
pub trait EventLoop {
    type Watch: Copy;

    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<Self::Watch>;
    fn update(&self, watch: Self::Watch, interest: Interest) -> io::Result<()>;
    fn deregister(&self, watch: Self::Watch) -> io::Result<()>;
}

/// Token allocator for `mio::Poll::register`. A plain counter is enough:
/// uniqueness across the lifetime of one `Poll` is all mio requires.
#[derive(Debug, Default)]
pub struct TokenAllocator {
    next: AtomicUsize,
}

impl TokenAllocator {
    pub fn new() -> Self {
        TokenAllocator {
            next: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> mio::Token {
        mio::Token(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[inline]
fn to_ready(interest: Interest) -> mio::Ready {
    let mut ready = mio::Ready::empty();
    if interest.contains(Interest::READ) {
        ready |= mio::Ready::readable();
    }
    if interest.contains(Interest::WRITE) {
        ready |= mio::Ready::writable();
    }
    ready
}

/// A watch registered against a `mio::Poll`: just the fd and token needed
/// to reregister/deregister via `EventedFd`, independent of the original
/// stream object.
#[derive(Debug, Clone, Copy)]
pub struct MioWatch {
    fd: RawFd,
    token: mio::Token,
}

/// Minimal concrete `EventLoop` over a single `mio::Poll`, shipped as
/// reference scaffolding so the framing layer is exercisable standalone.
/// Multiplexing many channels over one loop, accept handling, and timeout
/// housekeeping are all out of scope.
pub struct MioEventLoop {
    poll: mio::Poll,
    tokens: TokenAllocator,
}

impl MioEventLoop {
    pub fn new() -> io::Result<Self> {
        Ok(MioEventLoop {
            poll: mio::Poll::new()?,
            tokens: TokenAllocator::new(),
        })
    }

    pub fn poll(&self) -> &mio::Poll {
        &self.poll
    }

    pub fn poll_events(&self, events: &mut mio::Events, timeout: Option<std::time::Duration>) -> io::Result<usize> {
        self.poll.poll(events, timeout)
    }
}

impl EventLoop for MioEventLoop {
    type Watch = MioWatch;

    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<MioWatch> {
        let token = self.tokens.next();
        self.poll.register(
            &mio::unix::EventedFd(&fd),
            token,
            to_ready(interest),
            mio::PollOpt::edge(),
        )?;
        Ok(MioWatch { fd, token })
    }

    fn update(&self, watch: MioWatch, interest: Interest) -> io::Result<()> {
        self.poll.reregister(
            &mio::unix::EventedFd(&watch.fd),
            watch.token,
            to_ready(interest),
            mio::PollOpt::edge(),
        )
    }

    fn deregister(&self, watch: MioWatch) -> io::Result<()> {
        self.poll.deregister(&mio::unix::EventedFd(&watch.fd))
    }
}
