//! Synchronous message-framing state machine shared by the request
//! forwarder and the response relay.
//!
//! Both sides write a status/request line, then headers, then a body
//! whose framing (fixed length, chunked, or none) was already decided
//! before the first header went into the buffer. `MessageState` is the
//! single sum type tracking that progression; each method either
//! advances the state or panics, since a caller emitting headers or
//! body out of order is a programming error, not a runtime condition.

use std::fmt::Display;
use std::io::Write;

use netbuf::Buf;

use crate::enums::Version;

quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        DuplicateContentLength {
            description("Content-Length is added twice")
        }
        DuplicateTransferEncoding {
            description("Transfer-Encoding is added twice")
        }
        InvalidHeaderName {
            description("Header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("Header value contains invalid characters")
        }
        TransferEncodingAfterContentLength {
            description("Transfer encoding added when Content-Length is \
                already specified")
        }
        ContentLengthAfterTransferEncoding {
            description("Content-Length added after Transfer-Encoding")
        }
        CantDetermineBodySize {
            description("Neither Content-Length nor Transfer-Encoding \
                is present in the headers")
        }
        BodyLengthHeader {
            description("Content-Length and Transfer-Encoding must be set \
                using the specialized methods")
        }
        RequireBodyless {
            description("This message must not contain body length fields.")
        }
    }
}

/// State of a message being serialized, valid for both requests and
/// responses.
///
/// Note: the same buffer must be passed to every call on a given
/// `MessageState`.
#[derive(Debug)]
pub enum MessageState {
    /// Nothing has been sent.
    ResponseStart { version: Version, body: Body, close: bool },
    /// A `100 Continue` interim line has already been sent.
    FinalResponseStart { version: Version, body: Body, close: bool },
    /// Nothing has been sent.
    RequestStart,
    /// Status/request line is already in the buffer.
    Headers { body: Body, close: bool },
    /// The message contains a fixed size body.
    FixedHeaders { is_head: bool, close: bool, content_length: u64 },
    /// The message contains a chunked body.
    ChunkedHeaders { is_head: bool, close: bool },
    /// The message contains a body delimited only by closing the
    /// connection afterward (no `Content-Length`/`Transfer-Encoding`).
    ClosedHeaders { is_head: bool },
    /// The message contains no body (1xx, 204, 304, or HEAD response).
    Bodyless,
    /// Streaming a body with the given remaining length.
    FixedBody { is_head: bool, content_length: u64 },
    /// Streaming a chunked body.
    ChunkedBody { is_head: bool },
    /// Streaming a close-delimited body; the peer learns the body is
    /// complete only when the caller closes the connection.
    CloseDelimitedBody { is_head: bool },
    /// Message fully written.
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Body {
    /// Message contains a body.
    Normal,
    /// Message body is ignored: responses to HEAD requests.
    Head,
    /// Message must not have a body: 1xx, 204, 304.
    Denied,
    /// The message is a request and always contains a body (maybe empty).
    Request,
}

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&x| x == b'\r' || x == b'\n')
}

impl MessageState {
    /// Writes the status line.
    ///
    /// # Panics
    ///
    /// When a status line is already written, or `code == 100` (100 is
    /// never a valid final status).
    pub fn response_status(&mut self, buf: &mut Buf, code: u16, reason: &str) {
        use self::Body::*;
        use self::MessageState::*;
        match *self {
            ResponseStart { version, mut body, close } |
            FinalResponseStart { version, mut body, close } => {
                assert!(code != 100);
                write!(buf, "{} {} {}\r\n", version, code, reason).unwrap();
                if (100..200).contains(&code) || code == 204 || code == 304 {
                    body = Denied;
                }
                *self = Headers { body, close };
            }
            ref state => {
                panic!("called response_status() on message in state {:?}",
                       state)
            }
        }
    }

    /// Writes the request line.
    ///
    /// # Panics
    ///
    /// When a request line is already written.
    pub fn request_line(&mut self, buf: &mut Buf,
        method: &str, path: &str, version: Version)
    {
        use self::Body::*;
        use self::MessageState::*;
        match *self {
            RequestStart => {
                write!(buf, "{} {} {}\r\n", method, path, version).unwrap();
                *self = Headers { body: Request, close: false };
            }
            ref state => {
                panic!("called request_line() on message in state {:?}",
                       state)
            }
        }
    }

    /// Writes a `100 Continue` interim response.
    ///
    /// # Panics
    ///
    /// When the response has already progressed past its start.
    pub fn response_continue(&mut self, buf: &mut Buf) {
        use self::MessageState::*;
        match *self {
            ResponseStart { version, body, close } => {
                write!(buf, "{} 100 Continue\r\n\r\n", version).unwrap();
                *self = FinalResponseStart { version, body, close };
            }
            ref state => {
                panic!("called response_continue() on message in state {:?}",
                       state)
            }
        }
    }

    fn write_header(&mut self, buf: &mut Buf, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.len();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();

        let value_start = buf.len();
        buf.write_all(value).unwrap();
        if invalid_header(&buf[value_start..]) {
            buf.remove_range(start..);
            return Err(HeaderError::InvalidHeaderValue);
        }

        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    fn write_formatted<D: Display>(&mut self, buf: &mut Buf,
        name: &str, value: D)
        -> Result<(), HeaderError>
    {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.len();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();

        let value_start = buf.len();
        write!(buf, "{}", value).unwrap();
        if invalid_header(&buf[value_start..]) {
            buf.remove_range(start..);
            return Err(HeaderError::InvalidHeaderValue);
        }

        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    /// Adds a header. `Content-Length` and `Transfer-Encoding` must go
    /// through [`add_length`](Self::add_length) /
    /// [`add_chunked`](Self::add_chunked) instead, since those two
    /// headers determine body framing.
    ///
    /// # Panics
    ///
    /// When called outside the headers-writing states.
    pub fn add_header(&mut self, buf: &mut Buf, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        use self::HeaderError::*;
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding") {
            return Err(BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | ChunkedHeaders { .. } => {
                self.write_header(buf, name, value)
            }
            ref state => {
                panic!("called add_header() on message in state {:?}", state)
            }
        }
    }

    /// Same as [`add_header`](Self::add_header) but formats the value
    /// directly into the buffer; useful for numeric/date headers.
    pub fn format_header<D: Display>(&mut self, buf: &mut Buf,
        name: &str, value: D)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        use self::HeaderError::*;
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding") {
            return Err(BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | ChunkedHeaders { .. } => {
                self.write_formatted(buf, name, value)
            }
            ref state => {
                panic!("called format_header() on message in state {:?}", state)
            }
        }
    }

    /// Declares a fixed-length body, writing `Content-Length` immediately.
    ///
    /// # Panics
    ///
    /// When called outside the plain headers state.
    pub fn add_length(&mut self, buf: &mut Buf, n: u64)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        use self::HeaderError::*;
        use self::Body::*;
        match *self {
            FixedHeaders { .. } => Err(DuplicateContentLength),
            ChunkedHeaders { .. } => Err(ContentLengthAfterTransferEncoding),
            Headers { body: Denied, .. } => Err(RequireBodyless),
            Headers { body, close } => {
                self.write_formatted(buf, "Content-Length", n)?;
                *self = FixedHeaders { is_head: body == Head, close, content_length: n };
                Ok(())
            }
            ref state => {
                panic!("called add_length() on message in state {:?}", state)
            }
        }
    }

    /// Declares a chunked body, writing `Transfer-Encoding: chunked`
    /// immediately.
    ///
    /// # Panics
    ///
    /// When called outside the plain headers state.
    pub fn add_chunked(&mut self, buf: &mut Buf) -> Result<(), HeaderError> {
        use self::MessageState::*;
        use self::HeaderError::*;
        use self::Body::*;
        match *self {
            FixedHeaders { .. } => Err(TransferEncodingAfterContentLength),
            ChunkedHeaders { .. } => Err(DuplicateTransferEncoding),
            Headers { body: Denied, .. } => Err(RequireBodyless),
            Headers { body, close } => {
                self.write_header(buf, "Transfer-Encoding", b"chunked")?;
                *self = ChunkedHeaders { is_head: body == Head, close };
                Ok(())
            }
            ref state => {
                panic!("called add_chunked() on message in state {:?}", state)
            }
        }
    }

    /// Declares close-delimited framing: no `Content-Length` or
    /// `Transfer-Encoding` is written: the peer is expected to read the
    /// body until the connection closes. Used for the response relay's
    /// `stream_to_close` classification, the one body-framing mode
    /// without a length field of its own.
    ///
    /// # Panics
    ///
    /// When called outside the plain headers state, or on a bodyless
    /// response.
    pub fn add_close_delimited(&mut self) {
        use self::MessageState::*;
        use self::Body::*;
        match *self {
            Headers { body, .. } if body != Denied => {
                *self = ClosedHeaders { is_head: body == Head };
            }
            ref state => {
                panic!("called add_close_delimited() on message in state {:?}",
                       state)
            }
        }
    }

    /// Whether at least the status/request line has been written.
    pub fn is_started(&self) -> bool {
        !matches!(*self,
            MessageState::RequestStart |
            MessageState::ResponseStart { .. } |
            MessageState::FinalResponseStart { .. })
    }

    /// Closes the header block and returns whether a body is expected.
    ///
    /// # Panics
    ///
    /// When called outside a headers-writing state.
    pub fn done_headers(&mut self, buf: &mut Buf) -> Result<bool, HeaderError> {
        use self::Body::*;
        use self::MessageState::*;
        if matches!(*self,
                    Headers { close: true, .. } |
                    FixedHeaders { close: true, .. } |
                    ChunkedHeaders { close: true, .. } |
                    ClosedHeaders { .. }) {
            self.add_header(buf, "Connection", b"close").unwrap();
        }
        let expect_body = match *self {
            Headers { body: Denied, .. } => {
                *self = Bodyless;
                false
            }
            Headers { body: Request, .. } => {
                *self = FixedBody { is_head: false, content_length: 0 };
                true
            }
            Headers { body: Normal, .. } => {
                return Err(HeaderError::CantDetermineBodySize);
            }
            FixedHeaders { is_head, content_length, .. } => {
                *self = FixedBody { is_head, content_length };
                !is_head
            }
            ChunkedHeaders { is_head, .. } => {
                *self = ChunkedBody { is_head };
                !is_head
            }
            ClosedHeaders { is_head } => {
                *self = CloseDelimitedBody { is_head };
                !is_head
            }
            ref state => {
                panic!("called done_headers() on message in state {:?}", state)
            }
        };
        buf.write_all(b"\r\n").unwrap();
        Ok(expect_body)
    }

    /// Writes a chunk of the message body; works for both fixed-size and
    /// chunked framing.
    ///
    /// # Panics
    ///
    /// When the message has no body, is already done, or a fixed-size
    /// body would overflow its declared length.
    pub fn write_body(&mut self, buf: &mut Buf, data: &[u8]) {
        use self::MessageState::*;
        match *self {
            Bodyless => panic!("message must not contain a body"),
            FixedBody { is_head, ref mut content_length } => {
                if data.len() as u64 > *content_length {
                    panic!("fixed size body overflow: {} bytes left, got {}",
                           content_length, data.len());
                }
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                *content_length -= data.len() as u64;
            }
            ChunkedBody { is_head } => if !is_head && !data.is_empty() {
                write!(buf, "{:x}\r\n", data.len()).unwrap();
                buf.write_all(data).unwrap();
                buf.write_all(b"\r\n").unwrap();
            },
            CloseDelimitedBody { is_head } => if !is_head {
                buf.write_all(data).unwrap();
            },
            ref state => {
                panic!("called write_body() on message in state {:?}", state)
            }
        }
    }

    /// Writes a span of chunked-body bytes **verbatim**, bypassing
    /// re-framing. Used by the raw chunked relay path, which forwards
    /// the backend's original chunk-size lines and CRLFs untouched
    /// instead of re-deriving them from a parsed length.
    ///
    /// # Panics
    ///
    /// When not in the chunked-body state.
    pub fn write_raw_chunk_bytes(&mut self, buf: &mut Buf, raw: &[u8]) {
        use self::MessageState::*;
        match *self {
            ChunkedBody { is_head } => if !is_head {
                buf.write_all(raw).unwrap();
            },
            ref state => {
                panic!("called write_raw_chunk_bytes() on message in state {:?}",
                       state)
            }
        }
    }

    /// Marks a streamed body as complete without writing any
    /// finalizing bytes. Used by paths that forward a body's own
    /// terminating bytes verbatim (the raw chunked relay, and raw
    /// chunked request forwarding) instead of letting this state
    /// machine synthesize them, so the terminal `0\r\n\r\n` isn't
    /// written twice.
    ///
    /// # Panics
    ///
    /// When called outside a body-writing state.
    pub fn finish_raw(&mut self) {
        use self::MessageState::*;
        match *self {
            Bodyless | FixedBody { .. } | ChunkedBody { .. } |
            CloseDelimitedBody { .. } => *self = Done,
            Done => {}
            ref state => {
                panic!("called finish_raw() on message in state {:?}", state)
            }
        }
    }

    /// Whether headers have already been fully sent (buffered).
    pub fn is_after_headers(&self) -> bool {
        use self::MessageState::*;
        matches!(*self, Bodyless | Done | FixedBody { .. } | ChunkedBody { .. } |
            CloseDelimitedBody { .. })
    }

    /// Whether [`done`](Self::done) has already been called.
    pub fn is_complete(&self) -> bool {
        matches!(*self, MessageState::Done)
    }

    /// Finalizes the message. May be called multiple times once done.
    ///
    /// # Panics
    ///
    /// When a fixed-length body has remaining unwritten bytes.
    pub fn done(&mut self, buf: &mut Buf) {
        use self::MessageState::*;
        match *self {
            Bodyless => *self = Done,
            FixedBody { is_head: true, .. } | ChunkedBody { is_head: true } => {
                *self = Done
            }
            FixedBody { is_head: false, content_length: 0 } => *self = Done,
            FixedBody { is_head: false, content_length } => {
                panic!("tried to close message with {} bytes remaining",
                       content_length)
            }
            ChunkedBody { is_head: false } => {
                buf.write_all(b"0\r\n\r\n").unwrap();
                *self = Done;
            }
            CloseDelimitedBody { .. } => *self = Done,
            Done => {}
            ref state => {
                panic!("called done() on message in state {:?}", state)
            }
        }
    }
}
