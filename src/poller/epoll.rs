use super::Poller;
use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;

const MAX_EVENTS: usize = 1024;

/// `epoll(7)`-based strategy: one kernel event queue, edge-triggered
/// interest masks, O(ready count) per wait.
pub struct EpollPoller {
    epoll_fd: RawFd,
    registered: HashMap<RawFd, u32>,
    events: Vec<libc::epoll_event>,
}

impl EpollPoller {
    pub fn new() -> ServerResult<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }
        Ok(Self {
            epoll_fd,
            registered: HashMap::new(),
            events: Vec::with_capacity(MAX_EVENTS),
        })
    }
}

impl Poller for EpollPoller {
    fn insert(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if self.epoll_fd < 0 {
            return Err(ServerError::PollerClosed);
        }
        if self.registered.contains_key(&fd) {
            return Err(ServerError::DuplicateFd(fd));
        }
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event as *mut _)
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(ServerError::DuplicateFd(fd));
            }
            return Err(ServerError::Io(err));
        }
        self.registered.insert(fd, events);
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> ServerResult<()> {
        if self.epoll_fd < 0 {
            return Err(ServerError::PollerClosed);
        }
        if self.registered.remove(&fd).is_none() {
            return Ok(());
        }
        // The kernel may already have dropped the fd (closed elsewhere);
        // that is not a caller-visible failure.
        unsafe {
            libc::epoll_ctl(
                self.epoll_fd,
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            );
        }
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if self.epoll_fd < 0 {
            return Err(ServerError::PollerClosed);
        }
        if !self.registered.contains_key(&fd) {
            return Err(ServerError::Poller(format!("fd {} not registered", fd)));
        }
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_MOD, fd, &mut event as *mut _)
        };
        if ret < 0 {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }
        self.registered.insert(fd, events);
        Ok(())
    }

    fn wait(&mut self, timeout_ms: i32) -> ServerResult<Vec<(RawFd, u32)>> {
        if self.epoll_fd < 0 {
            return Err(ServerError::PollerClosed);
        }
        self.events.clear();
        self.events
            .resize(MAX_EVENTS, libc::epoll_event { events: 0, u64: 0 });

        let num_events = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                MAX_EVENTS as i32,
                timeout_ms,
            )
        };
        if num_events < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(ServerError::Io(err));
        }

        Ok(self.events[..num_events as usize]
            .iter()
            .map(|event| (event.u64 as RawFd, event.events))
            .collect())
    }

    fn len(&self) -> usize {
        self.registered.len()
    }

    fn clear(&mut self) {
        if self.epoll_fd < 0 {
            return;
        }
        for fd in std::mem::take(&mut self.registered).into_keys() {
            unsafe {
                libc::epoll_ctl(
                    self.epoll_fd,
                    libc::EPOLL_CTL_DEL,
                    fd,
                    std::ptr::null_mut(),
                );
            }
        }
    }

    fn is_open(&self) -> bool {
        self.epoll_fd >= 0
    }

    fn close(&mut self) {
        if self.epoll_fd >= 0 {
            unsafe {
                libc::close(self.epoll_fd);
            }
            self.epoll_fd = -1;
            self.registered.clear();
        }
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        self.close();
    }
}
