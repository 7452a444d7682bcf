use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::io::Write;

/// HTTP Status Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 200,

    MovedPermanently = 301,
    NotModified = 304,

    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    RequestTimeout = 408,
    PayloadTooLarge = 413,

    InternalServerError = 500,
    NotImplemented = 501,
}

impl Status {
    /// Get the text description for this status code
    pub fn as_str(&self) -> &'static str {
        match *self {
            Status::Ok => "OK",

            Status::MovedPermanently => "Moved Permanently",
            Status::NotModified => "Not Modified",

            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::RequestTimeout => "Request Timeout",
            Status::PayloadTooLarge => "Payload Too Large",

            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

/// HTTP Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
    Patch,
}

impl Method {
    /// Parse a method from a string
    pub fn from_str(s: &str) -> ServerResult<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            "PATCH" => Ok(Method::Patch),
            _ => Err(ServerError::HttpParse(format!("Invalid method: {}", s))),
        }
    }

    /// Convert the method to a string
    pub fn as_str(&self) -> &'static str {
        match *self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
        }
    }
}

/// A fully framed HTTP request. Header names are stored lowercased.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Set a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_lowercase(), value.to_string());
    }

    /// Get a header
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_lowercase())
    }

    /// The request path without its leading slash.
    pub fn relative_path(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    /// Whether the connection should survive this exchange. The
    /// Connection header wins; otherwise HTTP/1.1 and later default to
    /// keep-alive.
    pub fn keep_alive(&self) -> bool {
        match self.get_header("connection").map(|v| v.to_lowercase()) {
            Some(v) if v == "keep-alive" => true,
            Some(v) if v == "close" => false,
            _ => self.version.as_str() >= "HTTP/1.1",
        }
    }
}

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status: Status,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    /// Create a new response
    pub fn new(status: Status) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Set the version used in the status line
    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    /// Set a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Set the body and update Content-Length
    pub fn set_body(&mut self, body: &[u8]) {
        self.body = body.to_vec();
        self.set_header("Content-Length", &body.len().to_string());
    }

    /// Serialize the response to a byte vector
    pub fn serialize(&self, writer: &mut Vec<u8>) -> ServerResult<()> {
        write!(
            writer,
            "{} {} {}\r\n",
            self.version, self.status as u16, self.status.as_str()
        )
        .map_err(ServerError::Io)?;

        for (name, value) in &self.headers {
            write!(writer, "{}: {}\r\n", name, value).map_err(ServerError::Io)?;
        }

        write!(writer, "\r\n").map_err(ServerError::Io)?;
        writer.extend_from_slice(&self.body);

        Ok(())
    }
}
