use crate::error::{ServerError, ServerResult};
use crate::http::{Method, Request};
use std::collections::HashMap;

/// Where the assembler is in the life of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingHead,
    ReadingBody,
    Complete,
}

/// How the body is framed, decided once the head is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    None,
    Length(usize),
    Chunked,
}

/// Incremental HTTP/1.x request framer.
///
/// Socket bytes are pushed in with [`append`](Self::append) in whatever
/// fragments the network delivers; the call that completes the message
/// returns `true`, as does every call after it. One assembler frames
/// exactly one request; call [`reset`](Self::reset) to reuse it.
pub struct RequestAssembler {
    state: State,
    mode: BodyMode,

    head_buf: Vec<u8>,
    // Resume position for the "\r\n\r\n" search, so repeated short
    // appends stay linear overall.
    scan_pos: usize,

    method: Option<Method>,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,

    // Chunked-transfer state carried across calls.
    chunk_buf: Vec<u8>,
    chunk_remaining: usize,
    crlf_skip: usize,
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self {
            state: State::ReadingHead,
            mode: BodyMode::None,
            head_buf: Vec::new(),
            scan_pos: 0,
            method: None,
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            chunk_buf: Vec::new(),
            chunk_remaining: 0,
            crlf_skip: 0,
        }
    }

    /// Feed newly arrived bytes. Returns `true` once the message is
    /// complete (idempotent from then on).
    pub fn append(&mut self, data: &[u8]) -> ServerResult<bool> {
        match self.state {
            State::Complete => Ok(true),
            State::ReadingHead => self.fill_head(data),
            State::ReadingBody => self.feed_body(data),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Take the framed request out of a completed assembler.
    pub fn take_request(&mut self) -> ServerResult<Request> {
        if self.state != State::Complete {
            return Err(ServerError::HttpParse("request not complete".to_string()));
        }
        let method = self
            .method
            .ok_or_else(|| ServerError::HttpParse("method not set".to_string()))?;
        Ok(Request {
            method,
            path: std::mem::take(&mut self.path),
            version: std::mem::take(&mut self.version),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        })
    }

    /// Reset to frame the next request on the same connection.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn fill_head(&mut self, data: &[u8]) -> ServerResult<bool> {
        self.head_buf.extend_from_slice(data);

        let Some(head_end) = find_from(&self.head_buf, b"\r\n\r\n", self.scan_pos) else {
            self.scan_pos = self.head_buf.len().saturating_sub(3);
            return Ok(false);
        };

        let leftover = self.head_buf[head_end + 4..].to_vec();
        let head = std::mem::take(&mut self.head_buf);
        self.parse_head(&head[..head_end])?;

        // Content framing is selected exactly once, here.
        if let Some(value) = self.headers.get("content-length") {
            let length: usize = value
                .parse()
                .map_err(|_| ServerError::HttpParse(format!("bad Content-Length: {}", value)))?;
            if length == 0 {
                self.state = State::Complete;
                return Ok(true);
            }
            self.mode = BodyMode::Length(length);
        } else if self
            .headers
            .get("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            self.mode = BodyMode::Chunked;
        } else {
            self.state = State::Complete;
            return Ok(true);
        }

        self.state = State::ReadingBody;
        // Body bytes that arrived in the same call as the terminator.
        self.feed_body(&leftover)
    }

    fn parse_head(&mut self, head: &[u8]) -> ServerResult<()> {
        let head = std::str::from_utf8(head)
            .map_err(|_| ServerError::HttpParse("head is not valid UTF-8".to_string()))?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or("");
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ServerError::HttpParse(format!(
                "invalid request line: {:?}",
                request_line
            )));
        };
        if parts.next().is_some() {
            return Err(ServerError::HttpParse(format!(
                "invalid request line: {:?}",
                request_line
            )));
        }
        self.method = Some(Method::from_str(method)?);
        self.path = path.to_string();
        self.version = version.to_string();

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let Some(colon) = line.find(':') else {
                return Err(ServerError::HttpParse(format!("invalid header: {:?}", line)));
            };
            let name = line[..colon].trim().to_lowercase();
            let value = line[colon + 1..].trim().to_string();
            self.headers.insert(name, value);
        }
        Ok(())
    }

    fn feed_body(&mut self, data: &[u8]) -> ServerResult<bool> {
        match self.mode {
            BodyMode::None => {
                self.state = State::Complete;
                Ok(true)
            }
            BodyMode::Length(length) => {
                self.body.extend_from_slice(data);
                if self.body.len() >= length {
                    // Bytes beyond the declared length are a framing
                    // violation; they are discarded.
                    self.body.truncate(length);
                    self.state = State::Complete;
                    return Ok(true);
                }
                Ok(false)
            }
            BodyMode::Chunked => self.feed_chunk(data),
        }
    }

    fn feed_chunk(&mut self, data: &[u8]) -> ServerResult<bool> {
        self.chunk_buf.extend_from_slice(data);
        let mut pos = 0;

        loop {
            // CRLF trailing the previous chunk's data.
            if self.crlf_skip > 0 {
                let k = self.crlf_skip.min(self.chunk_buf.len() - pos);
                pos += k;
                self.crlf_skip -= k;
                if self.crlf_skip > 0 {
                    break;
                }
            }
            if pos >= self.chunk_buf.len() {
                break;
            }

            if self.chunk_remaining == 0 {
                // Expecting a hex size line.
                let Some(line_end) = find_from(&self.chunk_buf, b"\r\n", pos) else {
                    break;
                };
                let line = std::str::from_utf8(&self.chunk_buf[pos..line_end])
                    .map_err(|_| ServerError::HttpParse("bad chunk size line".to_string()))?;
                let hex = line.split(';').next().unwrap_or("").trim();
                let size = usize::from_str_radix(hex, 16).map_err(|_| {
                    ServerError::HttpParse(format!("invalid chunk size: {:?}", hex))
                })?;
                pos = line_end + 2;
                if size == 0 {
                    self.chunk_buf.clear();
                    self.state = State::Complete;
                    return Ok(true);
                }
                self.chunk_remaining = size;
            } else {
                let take = self.chunk_remaining.min(self.chunk_buf.len() - pos);
                self.body.extend_from_slice(&self.chunk_buf[pos..pos + take]);
                pos += take;
                self.chunk_remaining -= take;
                if self.chunk_remaining == 0 {
                    self.crlf_skip = 2;
                } else {
                    break;
                }
            }
        }

        self.chunk_buf.drain(..pos);
        Ok(false)
    }
}

impl Default for RequestAssembler {
    fn default() -> Self {
        Self::new()
    }
}
