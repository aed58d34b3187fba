//! Logical request and response types shared by the signer and the transport

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};

use bytes::Bytes;
use coldstore_core::{ColdstoreError, ColdstoreResult};
use coldstore_hash::TreeHash;

/// Header or query map; header names are stored lower-cased
pub type Params = BTreeMap<String, String>;

/// Largest slice handed out by [`BodyStream::next_chunk`]
pub const BODY_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical API call, before the transport stamps and signs it
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Params,
    pub headers: Params,
    /// Shared so each attempt can hand the same buffer to the wire
    pub body: Bytes,
    /// Pre-computed SHA-256 of `body`; computed on demand when `None`
    pub body_digest: Option<TreeHash>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Params::new(),
            headers: Params::new(),
            body: Bytes::new(),
            body_digest: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a header only when a value is present
    pub fn header_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.header(name, v),
            None => self,
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>, digest: Option<TreeHash>) -> Self {
        self.body = body.into();
        self.body_digest = digest;
        self
    }
}

/// Pull-based response body.
///
/// Each call to [`BodyStream::next_chunk`] returns at most
/// [`BODY_CHUNK_SIZE`] bytes; `None` marks the end of the body.
pub struct BodyStream {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
    done: bool,
}

impl BodyStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buf: vec![0u8; BODY_CHUNK_SIZE],
            done: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Box::new(io::empty()))
    }

    pub fn next_chunk(&mut self) -> io::Result<Option<&[u8]>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(n) => return Ok(Some(&self.buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the remaining body into memory. Only for small payloads (JSON).
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").field("done", &self.done).finish()
    }
}

/// A successful (2xx) response
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Params,
    pub body: BodyStream,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn require_header(&self, name: &'static str) -> ColdstoreResult<&str> {
        self.header(name).ok_or(ColdstoreError::MissingHeader(name))
    }

    /// Decode a JSON body
    pub fn json<T: serde::de::DeserializeOwned>(self) -> ColdstoreResult<T> {
        let bytes = self.body.into_bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
