//! The front-end collaborator interface.
//!
//! Everything about accepting connections, parsing the request line and
//! headers, and routing to a backend lives outside this crate. The
//! relay only needs a handle shaped like `Inbound` to pull body bytes
//! from the client and push a reply back, mirroring how the teacher
//! separates its `Codec` trait (consumed) from the connection types
//! that implement it (`server/proto.rs`, `client/proto.rs`).

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use netbuf::Buf;

use crate::headers::HeaderList;

/// A span of inbound-request body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundChunk {
    /// More bytes were read; the body is not yet fully consumed. For a
    /// chunked request body this is the original framing bytes
    /// verbatim.
    More(Vec<u8>),
    /// The final span; the body is now fully read.
    Done(Vec<u8>),
}

/// The parsed-request side of a relay cycle, as handed over by the
/// front-end HTTP layer.
///
/// A `101`-upgrade or any other disposition that ends the HTTP-level
/// exchange consumes `self` via [`into_raw_parts`](Self::into_raw_parts),
/// modeling the "only one subsystem holds the socket at a time" rule in
/// the Design Notes as an ordinary Rust move.
pub trait Inbound {
    /// Method of the inbound request (`"GET"`, `"POST"`, ...).
    fn method(&self) -> &str;

    /// Request target as sent on the request line.
    fn path(&self) -> &str;

    /// HTTP version of the inbound request.
    fn version(&self) -> crate::enums::Version;

    /// Request headers, in wire order.
    fn headers(&self) -> &HeaderList;

    /// Pulls the next span of request body bytes, decoding per the
    /// request's own framing (raw or chunked). Returns `Done(&[])` for
    /// a bodyless request.
    fn next_body_chunk(&mut self) -> io::Result<InboundChunk>;

    /// Buffers up to `max` bytes already available on the client
    /// socket without blocking past `timeout`. An empty result after
    /// `timeout` means no bytes arrived, not an error. Used by the
    /// continue arbiter's zero-timeout client check and by the byte
    /// pipe's initial drain of request-body bytes read ahead of the
    /// upgrade. Bytes returned here must still be replayed through
    /// [`next_body_chunk`](Self::next_body_chunk) by the implementation
    /// — this is a peek at arrival, not a separate consumption.
    fn poll_buffered(&mut self, max: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    /// Writes a single interim status line (`100 Continue`) directly to
    /// the client socket, outside the normal reply path. At most one
    /// call per cycle per the continue-once invariant.
    fn send_continue(&mut self, line: &[u8]) -> io::Result<()>;

    /// Writes a complete reply (status line, headers, body) in one
    /// shot. Used for bodyless, small known-length, and error replies.
    fn send_reply(&mut self, status_line_and_headers: &[u8], body: &[u8]) -> io::Result<()>;

    /// Writes a reply's status line and headers only, leaving the body
    /// to be streamed afterward via [`write_body_chunk`](Self::write_body_chunk).
    fn send_reply_head(&mut self, status_line_and_headers: &[u8]) -> io::Result<()>;

    /// Streams one span of response body bytes to the client. For a
    /// chunked reply this is expected to already be framed (chunk-size
    /// line + data + CRLF) by the caller.
    fn write_body_chunk(&mut self, data: &[u8]) -> io::Result<()>;

    /// Consumes the inbound handle, returning the raw client socket
    /// plus any bytes already buffered past the current message
    /// boundary. Used once per cycle, on the upgrade path.
    fn into_raw_parts(self: Box<Self>) -> (TcpStream, Buf);
}
