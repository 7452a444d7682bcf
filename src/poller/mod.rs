//! Readiness-notification strategies behind one trait.
//!
//! Three interchangeable implementations: `select(2)` bitmap scan,
//! `poll(2)` indexed-array scan, and an edge-triggered `epoll(7)` event
//! queue. Callers pick one at startup via [`create_poller`] and only ever
//! see the shared [`Poller`] contract.

mod epoll;
mod poll;
mod select;

pub use epoll::EpollPoller;
pub use poll::PollPoller;
pub use select::SelectPoller;

use crate::config::PollerKind;
use crate::error::ServerResult;
use std::os::unix::io::RawFd;

/// Strategy-neutral read interest, used by the select implementation.
pub const EVENT_READ: u32 = 0x1;
/// Strategy-neutral write interest.
pub const EVENT_WRITE: u32 = 0x4;

/// Common contract of all readiness-notification strategies.
///
/// `events` masks are in the implementation's native encoding; the value
/// to use for "readable" comes from [`create_poller`] alongside the
/// instance, so no caller hard-codes a strategy-specific flag.
pub trait Poller: Send {
    /// Register interest in a descriptor. Registering an fd twice is an
    /// error ([`ServerError::DuplicateFd`](crate::error::ServerError)).
    fn insert(&mut self, fd: RawFd, events: u32) -> ServerResult<()>;

    /// Drop a registration. Erasing an absent fd is a no-op.
    fn erase(&mut self, fd: RawFd) -> ServerResult<()>;

    /// Change the interest mask of a registered fd.
    fn modify(&mut self, fd: RawFd, events: u32) -> ServerResult<()>;

    /// Block until at least one registered fd is ready.
    ///
    /// `timeout_ms < 0` blocks indefinitely, `0` polls, `> 0` waits up to
    /// that many milliseconds. A signal interruption or timeout yields an
    /// empty list.
    fn wait(&mut self, timeout_ms: i32) -> ServerResult<Vec<(RawFd, u32)>>;

    /// Number of registered descriptors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration, keeping the poller usable.
    fn clear(&mut self);

    fn is_open(&self) -> bool;

    /// Release all OS resources. The instance is permanently unusable
    /// afterwards; further operations fail with `PollerClosed`.
    fn close(&mut self);
}

/// Build the configured strategy and the interest mask the engine should
/// register connections with. Computed once per engine, never global.
pub fn create_poller(kind: PollerKind) -> ServerResult<(Box<dyn Poller>, u32)> {
    match kind {
        PollerKind::Select => Ok((Box::new(SelectPoller::new()), EVENT_READ)),
        PollerKind::Poll => Ok((Box::new(PollPoller::new()), libc::POLLIN as u32)),
        PollerKind::Epoll => Ok((
            Box::new(EpollPoller::new()?),
            (libc::EPOLLIN | libc::EPOLLET) as u32,
        )),
    }
}
