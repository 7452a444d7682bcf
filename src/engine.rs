use crate::assembler::RequestAssembler;
use crate::cache::FileCache;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::{Request, Response, Status};
use crate::net;
use crate::poller::{create_poller, Poller};
use crate::timer::TimerWheel;
use crate::worker::WorkerPool;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

const RECV_BUF_SIZE: usize = 10 * 1024;

/// Everything a worker needs to drive one connection. Shared with the
/// pool threads by Arc; descriptors themselves are plain values owned by
/// whichever structure currently holds them.
struct WorkerCtx {
    config: Arc<ServerConfig>,
    cache: FileCache,
    timer: Arc<TimerWheel>,
    // Partially framed requests for parked connections. At most one
    // worker touches a given fd at a time, so entries are taken out,
    // driven, and put back without further synchronization.
    parked: Mutex<HashMap<RawFd, RequestAssembler>>,
    handoff_wr: RawFd,
}

/// Orchestrator that owns the listening socket, the multiplexer, the
/// worker pool, and the idle timer wheel, and runs the single-threaded
/// accept/dispatch loop.
///
/// Ownership rule: a connection descriptor is held by exactly one of
/// {poller registration, pool queue, a running worker, timer bucket}.
/// The dispatch loop erases an fd from the poller before pushing it to
/// the pool; workers hand it back through the pipe so only this loop
/// ever re-registers it.
pub struct ConnectionEngine {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    listen_fd: RawFd,
    poller: Box<dyn Poller>,
    interest: u32,
    pool: WorkerPool,
    timer: Arc<TimerWheel>,
    handoff_rd: RawFd,
    handoff_wr: RawFd,
}

impl ConnectionEngine {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let config = Arc::new(config);
        let listener = Self::create_listener(&config)?;
        let listen_fd = listener.as_raw_fd();

        let (mut poller, interest) = create_poller(config.poller)?;

        // Handoff channel: workers write a descriptor value into the
        // write end; the dispatch loop reads it back and re-registers.
        let mut pipe_fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(pipe_fds.as_mut_ptr()) } < 0 {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }
        let [handoff_rd, handoff_wr] = pipe_fds;
        net::set_nonblocking(handoff_rd)?;

        poller.insert(listen_fd, interest)?;
        poller.insert(handoff_rd, interest)?;

        // Expiry shuts the socket down instead of closing it outright:
        // the poller then reports the fd readable and the ordinary
        // zero-read path reclaims it through the single-threaded loop,
        // so no registration ever outlives its descriptor.
        let timer = TimerWheel::new(config.keep_alive_secs, Box::new(net::shutdown));

        let pool = WorkerPool::new(config.worker_threads);
        let ctx = Arc::new(WorkerCtx {
            cache: FileCache::new(config.cache_capacity),
            config: Arc::clone(&config),
            timer: Arc::clone(&timer),
            parked: Mutex::new(HashMap::new()),
            handoff_wr,
        });
        pool.set_task(move |fd| serve_connection(&ctx, fd));

        Ok(Self {
            config,
            listener,
            listen_fd,
            poller,
            interest,
            pool,
            timer,
            handoff_rd,
            handoff_wr,
        })
    }

    fn create_listener(config: &ServerConfig) -> ServerResult<TcpListener> {
        let addr: SocketAddr = config
            .socket_address()
            .parse()
            .map_err(|e| ServerError::Config(format!("bad listen address: {}", e)))?;
        let domain = if addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        Ok(socket.into())
    }

    /// The address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept/dispatch loop. Blocks the calling thread.
    pub fn run(&mut self) -> ServerResult<()> {
        self.timer.start();
        log::info!(
            "serving {} on {}",
            self.config.document_root.display(),
            self.local_addr()?
        );

        loop {
            let events = self.poller.wait(-1)?;
            for (fd, _events) in events {
                if fd == self.listen_fd {
                    self.accept_ready();
                } else if fd == self.handoff_rd {
                    self.drain_handoff();
                } else {
                    // Deregister before dispatch: from here on, exactly
                    // one worker owns this descriptor.
                    let _ = self.poller.erase(fd);
                    self.timer.cancel(fd);
                    self.pool.push(fd);
                }
            }
        }
    }

    /// Accept until the backlog is drained (required for edge-triggered
    /// pollers), registering each new connection.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        log::warn!("failed to set {} non-blocking: {}", peer, e);
                        continue;
                    }
                    let fd = stream.into_raw_fd();
                    log::debug!("accepted {} as fd {}", peer, fd);
                    if let Err(e) = self.poller.insert(fd, self.interest) {
                        // Half-registered descriptors are never kept.
                        log::warn!("failed to register fd {}: {}", fd, e);
                        net::close(fd);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Drain descriptor values out of the handoff pipe and re-register
    /// each with the poller.
    fn drain_handoff(&mut self) {
        while let Some(fd) = read_handoff_fd(self.handoff_rd) {
            if let Err(e) = self.poller.insert(fd, self.interest) {
                log::warn!("failed to re-register fd {}: {}", fd, e);
                self.timer.cancel(fd);
                net::close(fd);
            }
        }
    }
}

impl Drop for ConnectionEngine {
    fn drop(&mut self) {
        self.poller.close();
        self.pool.shutdown();
        self.timer.stop();
        net::close(self.handoff_rd);
        net::close(self.handoff_wr);
        // The listener closes with the TcpListener.
    }
}

/// Read one descriptor value from the handoff pipe; None when drained.
fn read_handoff_fd(pipe_rd: RawFd) -> Option<RawFd> {
    let mut buf = [0u8; std::mem::size_of::<RawFd>()];
    let mut filled = 0;
    while filled < buf.len() {
        let n = unsafe {
            libc::read(
                pipe_rd,
                buf[filled..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - filled,
            )
        };
        if n > 0 {
            filled += n as usize;
        } else if n == 0 {
            return None;
        } else {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            // EAGAIN with a partial value cannot happen: descriptor
            // writes are well under PIPE_BUF and therefore atomic.
            return None;
        }
    }
    Some(RawFd::from_ne_bytes(buf))
}

/// Hand a descriptor's ownership back to the dispatch loop.
fn hand_back(ctx: &WorkerCtx, fd: RawFd) -> bool {
    let buf = fd.to_ne_bytes();
    let n = unsafe {
        libc::write(
            ctx.handoff_wr,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
        )
    };
    n == buf.len() as isize
}

/// Worker task body: drive one connection until its current request is
/// answered, the peer goes away, or the socket runs dry.
fn serve_connection(ctx: &WorkerCtx, fd: RawFd) {
    // Resume a partially framed request if this fd was parked.
    let mut asm = ctx.parked.lock().remove(&fd).unwrap_or_default();
    let mut buf = [0u8; RECV_BUF_SIZE];

    loop {
        match net::recv(fd, &mut buf) {
            Ok(0) => {
                // Peer closed; the timer entry is normally already gone.
                ctx.timer.cancel(fd);
                net::close(fd);
                return;
            }
            Ok(n) => match asm.append(&buf[..n]) {
                Ok(true) => {
                    finish_request(ctx, fd, &mut asm);
                    return;
                }
                Ok(false) => continue,
                Err(e) => {
                    // Framing failure poisons only this connection.
                    log::debug!("protocol error on fd {}: {}", fd, e);
                    ctx.timer.cancel(fd);
                    net::close(fd);
                    return;
                }
            },
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                // Out of bytes mid-request: park the assembler state and
                // hand the fd back so the poller watches it again.
                ctx.parked.lock().insert(fd, asm);
                if hand_back(ctx, fd) {
                    ctx.timer.timing(fd);
                } else {
                    ctx.parked.lock().remove(&fd);
                    ctx.timer.cancel(fd);
                    net::close(fd);
                }
                return;
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("read error on fd {}: {}", fd, e);
                ctx.timer.cancel(fd);
                net::close(fd);
                return;
            }
        }
    }
}

fn finish_request(ctx: &WorkerCtx, fd: RawFd, asm: &mut RequestAssembler) {
    let request = match asm.take_request() {
        Ok(request) => request,
        Err(e) => {
            log::debug!("dropping fd {}: {}", fd, e);
            ctx.timer.cancel(fd);
            net::close(fd);
            return;
        }
    };
    log::info!("{} {} {}", request.method.as_str(), request.path, request.version);

    let sent = respond(ctx, fd, &request);
    if sent && request.keep_alive() && hand_back(ctx, fd) {
        ctx.timer.timing(fd);
    } else {
        ctx.timer.cancel(fd);
        net::close(fd);
    }
}

/// Resolve the request path under the document root. Traversal segments
/// are dropped rather than honored; directories get the index file.
fn resolve_path(config: &ServerConfig, request: &Request) -> PathBuf {
    let raw = request.relative_path();
    let raw = raw.split('?').next().unwrap_or("");

    let mut path = config.document_root.clone();
    for segment in raw.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        path.push(segment);
    }
    if path.is_dir() {
        path.push(&config.index_file);
    }
    path
}

fn respond(ctx: &WorkerCtx, fd: RawFd, request: &Request) -> bool {
    let path = resolve_path(&ctx.config, request);
    let reply = match ctx.cache.get(&path) {
        Some(content) => {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            let mut response = Response::new(Status::Ok);
            response.set_version(&request.version);
            response.set_header("Server", &ctx.config.server_name);
            response.set_header("Content-Type", ctx.config.content_type(extension));
            response.set_body(&content);
            response
        }
        None => not_found_response(ctx, request),
    };

    let mut wire = Vec::with_capacity(reply.body.len() + 256);
    if reply.serialize(&mut wire).is_err() {
        return false;
    }
    match net::send_all(fd, &wire) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("send failed on fd {}: {}", fd, e);
            false
        }
    }
}

fn not_found_response(ctx: &WorkerCtx, request: &Request) -> Response {
    let page = format!(
        "<html>\
            <head><title>404 Not Found</title></head>\
            <body>\
                <center><h1>404 Not Found</h1></center>\
                <hr>\
                <center>{}</center>\
            </body>\
        </html>\n",
        ctx.config.server_name
    );
    let mut response = Response::new(Status::NotFound);
    response.set_version(&request.version);
    response.set_header("Server", &ctx.config.server_name);
    response.set_header("Content-Type", "text/html");
    response.set_body(page.as_bytes());
    response
}
