//! The incremental request parser (SPEC_FULL.md §4.B): a from-state line
//! tokenizer feeding a main-state request machine, operating on a
//! fixed-capacity buffer owned by the connection record.
//!
//! Grounded on `examples/original_source/http/http_conn.cpp`'s
//! `parse_line`/`parse_request_line`/`parse_headers`/`parse_content`. Per
//! SPEC_FULL.md's Resolved Design Question 6, url/version/host/body are
//! copied out as owned `String`/`Vec<u8>` rather than kept as pointers
//! into the mutating buffer.

use std::collections::HashMap;

use crate::error::{Error, Result};

pub const READ_BUF_CAP: usize = 2048;
pub const WRITE_BUF_CAP: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }
}

/// From-state tokenizer result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Ok,
    Bad,
    Open,
}

/// Main-state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainState {
    RequestLine,
    Headers,
    Content,
}

/// Outcome of advancing the parser by all currently-available bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Need more bytes before progress can be made.
    NoRequest,
    /// A complete, well-formed request is ready to dispatch.
    Dispatch,
    /// The request is malformed or uses an unsupported method.
    BadRequest,
    /// The parser reached an unexpected internal state.
    InternalError,
}

/// Fixed-capacity read buffer with from-state cursor bookkeeping.
///
/// Invariant: `0 <= checked_idx <= read_idx <= READ_BUF_CAP`.
pub struct ReadBuffer {
    data: Box<[u8; READ_BUF_CAP]>,
    /// One past the last byte of data present.
    read_idx: usize,
    /// Cursor of the from-state tokenizer.
    checked_idx: usize,
    /// Start of the line currently being assembled by the main state.
    start_line: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        ReadBuffer {
            data: Box::new([0u8; READ_BUF_CAP]),
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
        }
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    pub fn capacity(&self) -> usize {
        READ_BUF_CAP
    }

    /// Whether another receive call is permitted without overflowing.
    /// Resolved Design Question 4: equality is rejected, not just `>`.
    pub fn has_room(&self) -> bool {
        self.read_idx < READ_BUF_CAP
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
    }

    /// The mutable tail available for the next receive call.
    pub fn spare_capacity_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.read_idx..]
    }

    /// Record that `n` bytes were written into the spare capacity.
    /// Incremented exactly once (Resolved Design Question 1).
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.read_idx + n <= READ_BUF_CAP);
        self.read_idx += n;
    }

    fn parse_line(&mut self) -> LineStatus {
        while self.checked_idx < self.read_idx {
            let byte = self.data[self.checked_idx];
            if byte == b'\r' {
                if self.checked_idx + 1 == self.read_idx {
                    return LineStatus::Open;
                }
                if self.data[self.checked_idx + 1] == b'\n' {
                    self.data[self.checked_idx] = 0;
                    self.checked_idx += 1;
                    self.data[self.checked_idx] = 0;
                    self.checked_idx += 1;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            } else if byte == b'\n' {
                if self.checked_idx > 0 && self.data[self.checked_idx - 1] == b'\r' {
                    self.data[self.checked_idx - 1] = 0;
                    self.data[self.checked_idx] = 0;
                    self.checked_idx += 1;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            }
            self.checked_idx += 1;
        }
        LineStatus::Open
    }

    /// The current line, from `start_line` up to (excluding) the
    /// terminator that `parse_line` just NUL'd out.
    fn current_line(&self) -> &[u8] {
        let end = self.line_terminator_start();
        &self.data[self.start_line..end]
    }

    fn line_terminator_start(&self) -> usize {
        // checked_idx now points just past the two NUL bytes that
        // replaced CRLF; walk back to find where they begin.
        let mut i = self.checked_idx;
        while i > self.start_line && self.data[i - 1] == 0 {
            i -= 1;
        }
        i
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// The request being incrementally assembled for one connection.
pub struct HttpRequest {
    pub buf: ReadBuffer,
    pub state: MainState,
    pub method: Method,
    pub url: String,
    pub version: String,
    pub host: Option<String>,
    pub headers: HashMap<String, String>,
    pub content_length: usize,
    pub linger: bool,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            buf: ReadBuffer::new(),
            state: MainState::RequestLine,
            method: Method::Get,
            url: String::new(),
            version: String::new(),
            host: None,
            headers: HashMap::new(),
            content_length: 0,
            linger: false,
            body: Vec::new(),
        }
    }

    /// Reset to the initial state, ready to parse the next request from
    /// byte zero of a fresh buffer (keep-alive cycling, SPEC_FULL.md §8).
    pub fn reinit(&mut self) {
        self.buf.reset();
        self.state = MainState::RequestLine;
        self.method = Method::Get;
        self.url.clear();
        self.version.clear();
        self.host = None;
        self.headers.clear();
        self.content_length = 0;
        self.linger = false;
        self.body.clear();
    }

    /// Advance the parser over everything currently buffered.
    pub fn advance(&mut self) -> Result<ParseOutcome> {
        loop {
            let want_line = !matches!(self.state, MainState::Content);
            if want_line {
                match self.buf.parse_line() {
                    LineStatus::Bad => return Ok(ParseOutcome::BadRequest),
                    LineStatus::Open => return Ok(ParseOutcome::NoRequest),
                    LineStatus::Ok => {}
                }
            }

            let line_start = self.buf.start_line;
            let line_end = self.buf.line_terminator_start();
            self.buf.start_line = self.buf.checked_idx;

            match self.state {
                MainState::RequestLine => {
                    let line = self.buf.data[line_start..line_end].to_vec();
                    match self.parse_request_line(&line) {
                        Ok(()) => self.state = MainState::Headers,
                        Err(outcome) => return Ok(outcome),
                    }
                }
                MainState::Headers => {
                    let line = self.buf.data[line_start..line_end].to_vec();
                    match self.parse_header_line(&line)? {
                        HeaderStep::Continue => {}
                        HeaderStep::HeadersDone => {
                            if self.content_length > 0 {
                                self.state = MainState::Content;
                            } else {
                                return Ok(ParseOutcome::Dispatch);
                            }
                        }
                    }
                }
                MainState::Content => {
                    let have = self.buf.read_idx.saturating_sub(self.buf.checked_idx);
                    if have < self.content_length {
                        return Ok(ParseOutcome::NoRequest);
                    }
                    let start = self.buf.checked_idx;
                    let end = start + self.content_length;
                    self.body = self.buf.data[start..end].to_vec();
                    self.buf.checked_idx = end;
                    self.buf.start_line = end;
                    return Ok(ParseOutcome::Dispatch);
                }
            }
        }
    }

    fn parse_request_line(&mut self, line: &[u8]) -> std::result::Result<(), ParseOutcome> {
        let line = std::str::from_utf8(line).map_err(|_| ParseOutcome::BadRequest)?;
        let mut parts = line.split(' ').filter(|p| !p.is_empty());
        let method_str = parts.next().ok_or(ParseOutcome::BadRequest)?;
        let mut url = parts.next().ok_or(ParseOutcome::BadRequest)?.to_string();
        let version = parts.next().ok_or(ParseOutcome::BadRequest)?;

        let method = Method::parse(method_str).ok_or(ParseOutcome::BadRequest)?;
        if !version.eq_ignore_ascii_case("HTTP/1.1") {
            return Err(ParseOutcome::BadRequest);
        }

        if let Some(rest) = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
        {
            match rest.find('/') {
                Some(idx) => url = rest[idx..].to_string(),
                None => url = "/".to_string(),
            }
        }
        if url == "/" {
            url = "/judge.html".to_string();
        }

        self.method = method;
        self.url = url;
        self.version = version.to_string();
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<HeaderStep> {
        if line.is_empty() {
            return Ok(HeaderStep::HeadersDone);
        }
        let line = std::str::from_utf8(line).map_err(|e| Error::Config(e.to_string()))?;
        let Some((name, value)) = line.split_once(':') else {
            // Unknown/malformed header: logged and ignored per SPEC_FULL.md §4.B.
            return Ok(HeaderStep::Continue);
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        match name.as_str() {
            "connection" => self.linger = value.eq_ignore_ascii_case("keep-alive"),
            "content-length" => {
                self.content_length = value.parse().unwrap_or(0);
            }
            "host" => self.host = Some(value.clone()),
            _ => {}
        }
        self.headers.insert(name, value);
        Ok(HeaderStep::Continue)
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

enum HeaderStep {
    Continue,
    HeadersDone,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(req: &mut HttpRequest, bytes: &[u8]) {
        let dst = req.buf.spare_capacity_mut();
        dst[..bytes.len()].copy_from_slice(bytes);
        req.buf.commit(bytes.len());
    }

    #[test]
    fn simple_get() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
        let outcome = req.advance().unwrap();
        assert_eq!(outcome, ParseOutcome::Dispatch);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "/index.html");
        assert_eq!(req.host.as_deref(), Some("x"));
    }

    #[test]
    fn root_rewritten_to_judge_html() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert_eq!(req.url, "/judge.html");
    }

    #[test]
    fn split_crlf_across_two_reads() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /index.html HTTP/1.1\r");
        assert_eq!(req.advance().unwrap(), ParseOutcome::NoRequest);
        feed(&mut req, b"\nHost:x\r\n\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert_eq!(req.url, "/index.html");
    }

    #[test]
    fn fragmented_headers_line_by_line() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /a HTTP/1.1\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::NoRequest);
        feed(&mut req, b"Host: example\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::NoRequest);
        feed(&mut req, b"\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
    }

    #[test]
    fn post_request_with_body() {
        let mut req = HttpRequest::new();
        feed(
            &mut req,
            b"POST /2 HTTP/1.1\r\nContent-Length: 18\r\n\r\nuser=a&password=pw",
        );
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body, b"user=a&password=pw");
    }

    #[test]
    fn post_fragmented_body() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"POST /2 HTTP/1.1\r\nContent-Length: 18\r\n\r\nuser=a&pass");
        assert_eq!(req.advance().unwrap(), ParseOutcome::NoRequest);
        feed(&mut req, b"word=pw");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert_eq!(req.body, b"user=a&password=pw");
    }

    #[test]
    fn unsupported_method_is_bad_request() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"PUT / HTTP/1.1\r\n\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::BadRequest);
    }

    #[test]
    fn keep_alive_cycling_after_reinit() {
        let mut req = HttpRequest::new();
        feed(&mut req, b"GET /a HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert!(req.linger);
        req.reinit();
        assert_eq!(req.state, MainState::RequestLine);
        assert_eq!(req.buf.read_idx(), 0);
        feed(&mut req, b"GET /b HTTP/1.1\r\n\r\n");
        assert_eq!(req.advance().unwrap(), ParseOutcome::Dispatch);
        assert_eq!(req.url, "/b");
    }

    #[test]
    fn read_buffer_rejects_overflow_room() {
        let mut buf = ReadBuffer::new();
        buf.commit(READ_BUF_CAP);
        assert!(!buf.has_room());
    }
}
