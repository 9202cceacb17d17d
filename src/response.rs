//! Response assembler: status/header-line construction into the bounded
//! write buffer, and the scatter/gather write vector that mixes the
//! in-memory header with a memory-mapped file body (SPEC_FULL.md §4.D,
//! §9 "Scatter/gather writer").
//!
//! Grounded on `write()`/`add_status_line`/`add_headers` in
//! `examples/original_source/http/http_conn.cpp` for the exact
//! advance-on-partial-write algorithm, and on
//! `examples/kill-ux-01-server/src/http/response.rs` for the Rust-side
//! builder shape.

use std::io::{IoSlice, Write as _};

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::request::WRITE_BUF_CAP;

pub const HTTP_OK: u16 = 200;
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;

const NOT_FOUND_BODY: &str = "The requested URL was not found on this server.\n";
const FORBIDDEN_BODY: &str = "You do not have permission to access this resource.\n";
const INTERNAL_ERROR_BODY: &str = "The server encountered an internal error.\n";
const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// Outcome of the `do_request`-equivalent dispatcher, mirroring the
/// reference source's `HTTP_CODE` enum (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// Malformed request line/method, or the resolved path is a
    /// directory. Resolved Design Question 2: rendered as 404, not 400.
    BadRequest,
    /// The resolved path does not exist. Resolved Design Question 5:
    /// rendered as 404 with a canned body (the original source leaves
    /// this case unhandled; SPEC_FULL.md §8 scenario 7 requires a body).
    NoResource,
    /// The resolved path exists but is not world-readable.
    Forbidden,
    /// The resolved path is a readable regular file.
    FileRequest,
    /// Header assembly or internal bookkeeping failed.
    InternalError,
}

impl HttpCode {
    fn status_and_reason(self) -> (u16, &'static str) {
        match self {
            HttpCode::BadRequest => (HTTP_NOT_FOUND, "Not Found"),
            HttpCode::NoResource => (HTTP_NOT_FOUND, "Not Found"),
            HttpCode::Forbidden => (HTTP_FORBIDDEN, "Forbidden"),
            HttpCode::FileRequest => (HTTP_OK, "OK"),
            HttpCode::InternalError => (HTTP_INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }

    fn canned_body(self) -> &'static str {
        match self {
            HttpCode::BadRequest | HttpCode::NoResource => NOT_FOUND_BODY,
            HttpCode::Forbidden => FORBIDDEN_BODY,
            HttpCode::InternalError => INTERNAL_ERROR_BODY,
            HttpCode::FileRequest => "",
        }
    }
}

/// Body of a response: nothing, a small owned buffer (canned error text,
/// or a login/register redirect page byte-for-byte), or a memory-mapped
/// file whose descriptor has already been closed.
pub enum ResponseBody {
    None,
    Inline(Vec<u8>),
    Mapped(Mmap),
}

impl ResponseBody {
    fn as_slice(&self) -> &[u8] {
        match self {
            ResponseBody::None => &[],
            ResponseBody::Inline(v) => v.as_slice(),
            ResponseBody::Mapped(m) => &m[..],
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

fn status_line(status: u16, reason: &str, content_length: usize, linger: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(96);
    write!(buf, "HTTP/1.1 {status} {reason}\r\n").ok();
    write!(buf, "Content-Length: {content_length}\r\n").ok();
    write!(buf, "Connection: {}\r\n", if linger { "keep-alive" } else { "close" }).ok();
    buf.extend_from_slice(b"\r\n");
    if buf.len() > WRITE_BUF_CAP {
        return Err(Error::HeaderOverflow);
    }
    Ok(buf)
}

/// A fully-assembled response, ready to be drained by the scatter/gather
/// writer. Constructed once per request; consumed by `write_vectored`
/// across as many partial writes as the kernel needs.
pub struct WriteVector {
    header: Vec<u8>,
    body: ResponseBody,
    sent: usize,
    pub linger: bool,
}

impl WriteVector {
    pub fn new(code: HttpCode, body: ResponseBody, linger: bool) -> Result<Self> {
        let (status, reason) = code.status_and_reason();
        let content_length = match code {
            HttpCode::FileRequest if body.len() == 0 => EMPTY_FILE_BODY.len(),
            HttpCode::FileRequest => body.len(),
            _ => code.canned_body().len(),
        };
        let body = match code {
            HttpCode::FileRequest if body.len() == 0 => {
                ResponseBody::Inline(EMPTY_FILE_BODY.as_bytes().to_vec())
            }
            HttpCode::FileRequest => body,
            _ => ResponseBody::Inline(code.canned_body().as_bytes().to_vec()),
        };
        let header = status_line(status, reason, content_length, linger)?;
        Ok(WriteVector { header, body, sent: 0, linger })
    }

    /// A pre-built response whose body bytes are already known (the
    /// login/register redirect pages are served by path, not literal
    /// bytes, but this constructor is used by tests and by any future
    /// caller that wants to hand back an exact byte buffer).
    pub fn from_bytes(status: u16, reason: &str, body: Vec<u8>, linger: bool) -> Result<Self> {
        let header = status_line(status, reason, body.len(), linger)?;
        Ok(WriteVector { header, body: ResponseBody::Inline(body), sent: 0, linger })
    }

    fn total_len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn remaining(&self) -> usize {
        self.total_len() - self.sent
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Build the at-most-two-entry scatter/gather vector for the bytes
    /// not yet sent.
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        let mut slices = Vec::with_capacity(2);
        if self.sent < self.header.len() {
            slices.push(IoSlice::new(&self.header[self.sent..]));
            let body = self.body.as_slice();
            if !body.is_empty() {
                slices.push(IoSlice::new(body));
            }
        } else {
            let body_sent = self.sent - self.header.len();
            let body = self.body.as_slice();
            if body_sent < body.len() {
                slices.push(IoSlice::new(&body[body_sent..]));
            }
        }
        slices
    }

    /// Advance the vector after the kernel reports `n` bytes written.
    /// SPEC_FULL.md §9: once bytes-sent exceeds header length, the first
    /// entry conceptually drops out and the second slides forward; here
    /// that's implicit in `io_slices` recomputing from `sent` each call.
    pub fn advance(&mut self, n: usize) {
        self.sent = (self.sent + n).min(self.total_len());
    }
}
