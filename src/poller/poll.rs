use super::Poller;
use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;

/// `poll(2)`-based strategy: a flat pollfd array plus an fd→index map
/// for O(1) erase and modify; each wait scans the registered count.
pub struct PollPoller {
    pollfds: Vec<libc::pollfd>,
    index: HashMap<RawFd, usize>,
    open: bool,
}

impl PollPoller {
    pub fn new() -> Self {
        Self {
            pollfds: Vec::new(),
            index: HashMap::new(),
            open: true,
        }
    }
}

impl Default for PollPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller for PollPoller {
    fn insert(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        if self.index.contains_key(&fd) {
            return Err(ServerError::DuplicateFd(fd));
        }
        self.index.insert(fd, self.pollfds.len());
        self.pollfds.push(libc::pollfd {
            fd,
            events: events as i16,
            revents: 0,
        });
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        let Some(pos) = self.index.remove(&fd) else {
            return Ok(());
        };
        // Swap-remove keeps the array dense; fix up the moved entry.
        self.pollfds.swap_remove(pos);
        if pos < self.pollfds.len() {
            self.index.insert(self.pollfds[pos].fd, pos);
        }
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, events: u32) -> ServerResult<()> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        let Some(&pos) = self.index.get(&fd) else {
            return Err(ServerError::Poller(format!("fd {} not registered", fd)));
        };
        self.pollfds[pos].events = events as i16;
        Ok(())
    }

    fn wait(&mut self, timeout_ms: i32) -> ServerResult<Vec<(RawFd, u32)>> {
        if !self.open {
            return Err(ServerError::PollerClosed);
        }
        let ready = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout_ms,
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
        for pfd in &mut self.pollfds {
            if pfd.revents != 0 {
                result.push((pfd.fd, pfd.revents as u32));
                pfd.revents = 0;
                if result.len() == ready as usize {
                    break;
                }
            }
        }
        Ok(result)
    }

    fn len(&self) -> usize {
        self.pollfds.len()
    }

    fn clear(&mut self) {
        self.pollfds.clear();
        self.index.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.clear();
        self.open = false;
    }
}
