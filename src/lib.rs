pub mod assembler;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod net;
pub mod poller;
pub mod timer;
pub mod worker;

/// Re-exports of common components for easier access
pub use assembler::RequestAssembler;
pub use cache::{DiskFs, FileCache, Vfs};
pub use config::{PollerKind, ServerConfig};
pub use engine::ConnectionEngine;
pub use error::{ServerError, ServerResult};
pub use http::{Method, Request, Response, Status};
pub use poller::{create_poller, EpollPoller, Poller, PollPoller, SelectPoller};
pub use timer::TimerWheel;
pub use worker::WorkerPool;
