use super::{Poller, EVENT_READ, EVENT_WRITE};
use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::mem;
use std::os::unix::io::RawFd;

/// `select(2)`-based strategy: fixed-size fd_set bitmaps, O(highest fd)
/// per wait. Limited to descriptors below `FD_SETSIZE`.
pub struct SelectPoller {
    readfds: libc::fd_set,
    writefds: libc::fd_set,
    registered: HashMap<RawFd, u32>,
    max_fd: RawFd,
    open: bool,
}

impl SelectPoller {
    pub fn new() -> Self {
        let (readfds, writefds) = unsafe {
            let mut r: libc::fd_set = mem::zeroed();
            let mut w: libc::fd_set = mem::zeroed();
            libc::FD_ZERO(&mut r);
            libc::FD_ZERO(&mut w);
            (r, w)
        };
        Self {
            readfds,
            writefds,
            registered: HashMap::new(),
            max_fd: -1,
            open: true,
        }
    }

    fn recompute_max(&mut self) {
        self.max_fd = self.registered.keys().copied().max().unwrap_or(-1);
    }
}

impl Default for SelectPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller for SelectPoller {
    fn insert(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        if fd < 0 || fd >= libc::FD_SETSIZE as RawFd {
            return Err(ServerError::Poller(format!(
                "fd {} out of select range (FD_SETSIZE {})",
                fd,
                libc::FD_SETSIZE
            )));
        }
        if self.registered.contains_key(&fd) {
            return Err(ServerError::DuplicateFd(fd));
        }
        unsafe {
            if events & EVENT_READ != 0 {
                libc::FD_SET(fd, &mut self.readfds);
            }
            if events & EVENT_WRITE != 0 {
                libc::FD_SET(fd, &mut self.writefds);
            }
        }
        self.registered.insert(fd, events);
        if fd > self.max_fd {
            self.max_fd = fd;
        }
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        if self.registered.remove(&fd).is_none() {
            return Ok(());
        }
        unsafe {
            libc::FD_CLR(fd, &mut self.readfds);
            libc::FD_CLR(fd, &mut self.writefds);
        }
        if fd == self.max_fd {
            self.recompute_max();
        }
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        if !self.registered.contains_key(&fd) {
            return Err(ServerError::Poller(format!("fd {} not registered", fd)));
        }
        unsafe {
            libc::FD_CLR(fd, &mut self.readfds);
            libc::FD_CLR(fd, &mut self.writefds);
            if events & EVENT_READ != 0 {
                libc::FD_SET(fd, &mut self.readfds);
            }
            if events & EVENT_WRITE != 0 {
                libc::FD_SET(fd, &mut self.writefds);
            }
        }
        self.registered.insert(fd, events);
        Ok(())
    }

    fn wait(&mut self, timeout_ms: i32) -> ServerResult<Vec<(RawFd, u32)>> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }

        // select mutates the sets in place, so work on copies.
        let mut readfds = self.readfds;
        let mut writefds = self.writefds;

        let mut tv = libc::timeval {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
        };
        let tv_ptr = if timeout_ms < 0 {
            std::ptr::null_mut()
        } else {
            &mut tv as *mut libc::timeval
        };

        let ready = unsafe {
            libc::select(
                self.max_fd + 1,
                &mut readfds,
                &mut writefds,
                std::ptr::null_mut(),
                tv_ptr,
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(ServerError::Io(err));
        }

        let mut result = Vec::with_capacity(ready as usize);
        if ready > 0 {
            for &fd in self.registered.keys() {
                let mut events = 0;
                unsafe {
                    if libc::FD_ISSET(fd, &readfds) {
                        events |= EVENT_READ;
                    }
                    if libc::FD_ISSET(fd, &writefds) {
                        events |= EVENT_WRITE;
                    }
                }
                if events != 0 {
                    result.push((fd, events));
                }
            }
        }
        Ok(result)
    }

    fn len(&self) -> usize {
        self.registered.len()
    }

    fn clear(&mut self) {
        unsafe {
            libc::FD_ZERO(&mut self.readfds);
            libc::FD_ZERO(&mut self.writefds);
        }
        self.registered.clear();
        self.max_fd = -1;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        // No kernel object to release; the instance just becomes inert.
        self.clear();
        self.open = false;
    }
}
