//! Backend (upstream) HTTP/1.1 client connection.
//!
//! Owns a single outbound `TcpStream` plus a `netbuf::Buf` read buffer,
//! grounded on the teacher's `client/head.rs`/`client/recv_mode.rs`
//! split between "what framing did the response declare" and "how do we
//! pull body bytes out of it" — collapsed here into one small connection
//! object since there is no connection pool or pipelining to manage.

use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use httparse;
use netbuf::Buf;

use crate::chunked;
use crate::enums::{Status, Version};
use crate::error::Error;
use crate::headers::{self, HeaderList};

/// How the response body is framed on the wire, derived from the
/// response's `Content-Length`, `Transfer-Encoding`, status code, and
/// whether the request was `HEAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// A known-length body of `n` bytes.
    ContentSize(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// No length or chunked marker: read until the backend closes.
    StreamClose,
    /// 1xx/204/304, or a response to a `HEAD` request.
    NoBody,
}

/// One span of body bytes read from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// More bytes were read; the body is not yet fully consumed. For a
    /// chunked body, this is the original framing bytes (chunk-size
    /// line, data, trailing CRLF) verbatim, not re-encoded.
    More(Vec<u8>),
    /// The final span of body bytes; the body is now fully read.
    Done(Vec<u8>),
}

impl StreamChunk {
    pub fn is_done(&self) -> bool {
        matches!(*self, StreamChunk::Done(..))
    }

    pub fn data(&self) -> &[u8] {
        match *self {
            StreamChunk::More(ref d) | StreamChunk::Done(ref d) => d,
        }
    }
}

/// A single outbound connection to a backend.
pub struct Backend {
    stream: TcpStream,
    buf: Buf,
    version: Version,
    status: Option<Status>,
    body_kind: BodyKind,
    content_remaining: u64,
    chunk_cursor: chunked::Cursor,
    is_head: bool,
    closed: bool,
}

impl Backend {
    /// Opens a TCP connection to the backend, failing fast after
    /// `timeout` per the configured connect timeout.
    pub fn connect(ip: IpAddr, port: u16, timeout: Duration) -> Result<Backend, Error> {
        let addr = SocketAddr::new(ip, port);
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|err| {
            warn!("backend connect to {} failed: {}", addr, err);
            Error::UpstreamUnreachable(err)
        })?;
        stream.set_nodelay(true).map_err(Error::UpstreamIo)?;
        Ok(Backend {
            stream,
            buf: Buf::new(),
            version: Version::Http11,
            status: None,
            body_kind: BodyKind::NoBody,
            content_remaining: 0,
            chunk_cursor: chunked::Cursor::new(),
            is_head: false,
            closed: false,
        })
    }

    /// Whether the in-flight request is a `HEAD` request; affects body
    /// classification of the upcoming response.
    pub fn set_request_is_head(&mut self, is_head: bool) {
        self.is_head = is_head;
    }

    /// Writes raw, already-serialized request bytes to the backend.
    pub fn raw_request(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream.write_all(bytes).map_err(Error::UpstreamIo)
    }

    /// Reads and parses the backend's status line and headers, blocking
    /// until a full head is available.
    pub fn response(&mut self) -> Result<(Version, Status, HeaderList), Error> {
        self.stream.set_read_timeout(None).map_err(Error::UpstreamIo)?;
        loop {
            if let Some(head) = self.try_parse_head()? {
                return Ok(head);
            }
            self.read_more()?;
        }
    }

    /// Attempts to read and parse a response head, waiting at most
    /// `timeout` for the backend to produce one. Used by the continue
    /// arbiter's inner poll: `Ok(None)` means no complete head arrived
    /// within `timeout` and the caller should re-check the client side.
    pub fn try_read_head(&mut self, timeout: Duration)
        -> Result<Option<(Version, Status, HeaderList)>, Error>
    {
        if let Some(head) = self.try_parse_head()? {
            return Ok(Some(head));
        }
        self.stream.set_read_timeout(Some(timeout)).map_err(Error::UpstreamIo)?;
        match self.buf.read_from(&mut self.stream) {
            Ok(0) => Err(Error::UpstreamIo(io::Error::new(
                io::ErrorKind::UnexpectedEof, "backend closed connection"))),
            Ok(_) => self.try_parse_head(),
            Err(ref e) if matches!(e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(Error::UpstreamIo(e)),
        }
    }

    fn try_parse_head(&mut self) -> Result<Option<(Version, Status, HeaderList)>, Error> {
        let mut raw_headers = [httparse::EMPTY_HEADER; 64];
        let mut resp = httparse::Response::new(&mut raw_headers);
        let used = match resp.parse(&self.buf[..])? {
            httparse::Status::Complete(used) => used,
            httparse::Status::Partial => return Ok(None),
        };
        let version = Version::from_httparse(resp.version.unwrap_or(1));
        let code = resp.code.unwrap_or(0);
        let reason = resp.reason.unwrap_or("");
        let status = Status::from_wire(code, reason);
        let headers = HeaderList::from_httparse(resp.headers);
        self.buf.consume(used);
        self.version = version;
        self.status = Some(status.clone());
        if !status.is_informational() {
            self.body_kind = classify_body_kind(&status, &headers, self.is_head);
            if let BodyKind::ContentSize(n) = self.body_kind {
                self.content_remaining = n;
            }
            self.chunk_cursor = chunked::Cursor::new();
        }
        Ok(Some((version, status, headers)))
    }

    /// Body framing classified from the most recently read response
    /// head.
    pub fn body_type(&self) -> BodyKind {
        self.body_kind
    }

    /// Reads the full response body into memory. Only sensible for
    /// `BodyKind::ContentSize`/`NoBody`; callers streaming a large or
    /// close-delimited body should use [`next_chunk`](Self::next_chunk).
    pub fn response_body(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        loop {
            match self.next_chunk()? {
                StreamChunk::More(data) => out.extend_from_slice(&data),
                StreamChunk::Done(data) => {
                    out.extend_from_slice(&data);
                    return Ok(out);
                }
            }
        }
    }

    /// Reads the next span of body bytes, dispatching on `body_type()`.
    /// For a chunked body this returns the original framing bytes
    /// verbatim (see [`StreamChunk::More`]).
    pub fn next_chunk(&mut self) -> Result<StreamChunk, Error> {
        match self.body_kind {
            BodyKind::NoBody => Ok(StreamChunk::Done(Vec::new())),
            BodyKind::ContentSize(_) => self.next_fixed_chunk(),
            BodyKind::Chunked => self.next_chunked_span(),
            BodyKind::StreamClose => self.next_close_delimited_chunk(),
        }
    }

    fn next_fixed_chunk(&mut self) -> Result<StreamChunk, Error> {
        if self.content_remaining == 0 {
            return Ok(StreamChunk::Done(Vec::new()));
        }
        if self.buf.len() == 0 {
            self.read_more()?;
        }
        let take = std::cmp::min(self.buf.len() as u64, self.content_remaining) as usize;
        let data = self.buf[..take].to_vec();
        self.buf.consume(take);
        self.content_remaining -= take as u64;
        if self.content_remaining == 0 {
            Ok(StreamChunk::Done(data))
        } else {
            Ok(StreamChunk::More(data))
        }
    }

    fn next_chunked_span(&mut self) -> Result<StreamChunk, Error> {
        loop {
            let n = self.chunk_cursor.scan(&self.buf[..])?;
            if n > 0 || self.chunk_cursor.is_done() {
                let data = self.buf[..n].to_vec();
                self.buf.consume(n);
                return if self.chunk_cursor.is_done() {
                    Ok(StreamChunk::Done(data))
                } else {
                    Ok(StreamChunk::More(data))
                };
            }
            self.read_more()?;
        }
    }

    fn next_close_delimited_chunk(&mut self) -> Result<StreamChunk, Error> {
        if self.buf.len() != 0 {
            let data = self.buf[..].to_vec();
            let len = data.len();
            self.buf.consume(len);
            return Ok(StreamChunk::More(data));
        }
        let n = self.read_more_allow_eof()?;
        if n == 0 {
            return Ok(StreamChunk::Done(Vec::new()));
        }
        let data = self.buf[..].to_vec();
        let len = data.len();
        self.buf.consume(len);
        Ok(StreamChunk::More(data))
    }

    fn read_more(&mut self) -> Result<usize, Error> {
        let n = self.read_more_allow_eof()?;
        if n == 0 {
            return Err(Error::UpstreamIo(io::Error::new(
                io::ErrorKind::UnexpectedEof, "backend closed connection")));
        }
        Ok(n)
    }

    fn read_more_allow_eof(&mut self) -> Result<usize, Error> {
        self.stream.set_read_timeout(None).map_err(Error::UpstreamIo)?;
        self.buf.read_from(&mut self.stream).map_err(Error::UpstreamIo)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The most recently read terminal status, if any.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Hands over the raw socket plus any bytes already buffered past
    /// the current message boundary — used when the response is a
    /// successful `101 Switching Protocols` and the connection becomes
    /// an opaque byte pipe.
    pub fn raw_socket(mut self) -> (TcpStream, Buf) {
        let buf = std::mem::replace(&mut self.buf, Buf::new());
        self.closed = true;
        (self.stream, buf)
    }

    /// Closes the backend connection. Idempotent: safe to call more
    /// than once, including on every error path.
    pub fn close(&mut self) {
        if !self.closed {
            trace!("closing backend connection");
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
            self.closed = true;
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.close();
    }
}

fn classify_body_kind(status: &Status, headers: &HeaderList, is_head: bool) -> BodyKind {
    if is_head || status.forbids_body() {
        return BodyKind::NoBody;
    }
    if let Some(te) = headers.get("Transfer-Encoding") {
        if headers::is_chunked(te) {
            return BodyKind::Chunked;
        }
    }
    if let Some(cl) = headers.get("Content-Length") {
        if let Ok(text) = std::str::from_utf8(cl) {
            if let Ok(n) = text.trim().parse::<u64>() {
                return BodyKind::ContentSize(n);
            }
        }
    }
    BodyKind::StreamClose
}

#[cfg(test)]
mod test {
    use super::{classify_body_kind, BodyKind};
    use crate::enums::Status;
    use crate::headers::HeaderList;

    #[test]
    fn head_response_has_no_body() {
        let mut headers = HeaderList::new();
        headers.push("Content-Length", &b"500"[..]);
        let status = Status::from_wire(200, "OK");
        assert_eq!(classify_body_kind(&status, &headers, true), BodyKind::NoBody);
    }

    #[test]
    fn no_content_status_has_no_body() {
        let headers = HeaderList::new();
        let status = Status::from_wire(204, "No Content");
        assert_eq!(classify_body_kind(&status, &headers, false), BodyKind::NoBody);
    }

    #[test]
    fn chunked_transfer_encoding_wins_over_absent_length() {
        let mut headers = HeaderList::new();
        headers.push("Transfer-Encoding", &b"chunked"[..]);
        let status = Status::from_wire(200, "OK");
        assert_eq!(classify_body_kind(&status, &headers, false), BodyKind::Chunked);
    }

    #[test]
    fn content_length_without_chunked_is_fixed() {
        let mut headers = HeaderList::new();
        headers.push("Content-Length", &b"42"[..]);
        let status = Status::from_wire(200, "OK");
        assert_eq!(classify_body_kind(&status, &headers, false),
                   BodyKind::ContentSize(42));
    }

    #[test]
    fn neither_header_streams_to_close() {
        let headers = HeaderList::new();
        let status = Status::from_wire(200, "OK");
        assert_eq!(classify_body_kind(&status, &headers, false),
                   BodyKind::StreamClose);
    }
}
