use crate::error::ServerResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which readiness-notification strategy the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerKind {
    Select,
    Poll,
    Epoll,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    // Network configuration
    pub listen_address: String,
    pub port: u16,

    // Thread configuration
    pub worker_threads: usize,

    // Event notification strategy
    pub poller: PollerKind,

    // Static file serving
    pub document_root: PathBuf,
    pub index_file: String,
    pub server_name: String,

    // Content types
    pub default_type: String,
    pub types: HashMap<String, String>,

    // Connection settings
    pub keep_alive_secs: usize,
    pub cache_capacity: usize,
}

fn default_types() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let pairs = [
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("js", "text/javascript"),
        ("txt", "text/plain"),
        ("md", "text/markdown"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("wasm", "application/wasm"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("svg", "image/svg+xml"),
        ("webp", "image/webp"),
        ("ico", "image/x-icon"),
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
    ];
    for (ext, ty) in pairs {
        map.insert(ext.to_string(), ty.to_string());
    }
    map
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 8080,

            worker_threads: num_cpus::get(),

            poller: PollerKind::Epoll,

            document_root: PathBuf::from("www"),
            index_file: "index.html".to_string(),
            server_name: format!("fileserv/{}", env!("CARGO_PKG_VERSION")),

            default_type: "application/octet-stream".to_string(),
            types: default_types(),

            keep_alive_secs: 30,
            cache_capacity: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address and port to listen on
    pub fn with_address(mut self, address: &str, port: u16) -> Self {
        self.listen_address = address.to_string();
        self.port = port;
        self
    }

    /// Set the number of worker threads
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the readiness-notification strategy
    pub fn with_poller(mut self, poller: PollerKind) -> Self {
        self.poller = poller;
        self
    }

    /// Set the directory static files are served from
    pub fn with_document_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.document_root = root.into();
        self
    }

    /// Set the keep-alive idle timeout in seconds
    pub fn with_keep_alive_secs(mut self, secs: usize) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Get the full address string (address:port)
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// Look up the content type for a file extension
    pub fn content_type(&self, extension: &str) -> &str {
        self.types
            .get(extension)
            .map(String::as_str)
            .unwrap_or(&self.default_type)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> ServerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
