//! Incremental parser for HTTP chunked transfer-coding.
//!
//! Unlike a typical decoder, this cursor never reconstructs or discards
//! framing bytes: it only tells the caller how many of the unconsumed
//! bytes at hand already form complete chunk framing, so the caller can
//! forward that many bytes to the other side *verbatim* and then advance
//! past them. This is what lets the response relay's chunked path copy
//! chunk-size lines and CRLFs byte-for-byte instead of re-encoding them.

use httparse::{self, InvalidChunkSize};

/// Sum-type state of the incremental chunked-body scanner. Kept as a
/// plain enum (no dynamic dispatch) per the parser's invariant that there
/// is exactly one active mode at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a `<hex-size>[;ext]CRLF` line.
    ExpectingSize,
    /// Inside a chunk body, this many bytes remain (excluding the
    /// trailing CRLF that follows every chunk).
    InsideChunk(u64),
    /// The trailing CRLF after a non-terminal chunk's data.
    ChunkTrailer,
    /// Saw the terminal `0` chunk; scanning for the trailer section's
    /// closing blank line (`CRLF` if there are no trailer headers).
    ExpectingTrailers { matched: u8 },
    /// Body fully framed; no further bytes belong to this body.
    Done,
}

/// Opaque cursor over a chunked body's framing. Carries no buffer of its
/// own — it scans whatever byte slice the caller currently has buffered.
#[derive(Debug, Clone)]
pub struct Cursor {
    state: State,
}

const TRAILER_END: &[u8] = b"\r\n\r\n";

impl Cursor {
    pub fn new() -> Cursor {
        Cursor { state: State::ExpectingSize }
    }

    /// True once the terminal chunk and trailer section have both been
    /// scanned; no more body bytes will follow on this connection.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Scans `buf` from the start and returns how many leading bytes are
    /// part of complete chunk framing ready to be forwarded verbatim.
    /// Returns `Ok(0)` (without error) when more bytes are needed to
    /// complete the frame currently in progress.
    ///
    /// `buf` must be the bytes not yet forwarded: once the caller
    /// forwards the first `n` bytes of a scan, it must drop them before
    /// the next call and pass only what remains.
    pub fn scan(&mut self, buf: &[u8]) -> Result<usize, InvalidChunkSize> {
        let mut pos = 0;
        loop {
            match self.state {
                State::Done => return Ok(pos),
                State::ExpectingSize => {
                    match httparse::parse_chunk_size(&buf[pos..])? {
                        httparse::Status::Complete((used, 0)) => {
                            pos += used;
                            // `used` already includes the size line's own
                            // trailing CRLF, which is the first half of
                            // the blank line terminating the trailers.
                            self.state = State::ExpectingTrailers { matched: 2 };
                        }
                        httparse::Status::Complete((used, size)) => {
                            pos += used;
                            self.state = State::InsideChunk(size);
                        }
                        httparse::Status::Partial => return Ok(pos),
                    }
                }
                State::InsideChunk(remaining) => {
                    let available = (buf.len() - pos) as u64;
                    if available == 0 {
                        return Ok(pos);
                    }
                    if available < remaining {
                        pos += available as usize;
                        self.state = State::InsideChunk(remaining - available);
                        return Ok(pos);
                    }
                    pos += remaining as usize;
                    self.state = State::ChunkTrailer;
                }
                State::ChunkTrailer => {
                    let rest = &buf[pos..];
                    if rest.len() < 2 {
                        return Ok(pos);
                    }
                    if &rest[..2] != b"\r\n" {
                        return Err(InvalidChunkSize);
                    }
                    pos += 2;
                    self.state = State::ExpectingSize;
                }
                State::ExpectingTrailers { mut matched } => {
                    while pos < buf.len() {
                        if buf[pos] == TRAILER_END[matched as usize] {
                            matched += 1;
                            pos += 1;
                            if matched as usize == TRAILER_END.len() {
                                self.state = State::Done;
                                break;
                            }
                        } else {
                            // A mismatch restarts the pattern; a bare
                            // '\r' still matches as the pattern's prefix.
                            matched = if buf[pos] == TRAILER_END[0] { 1 } else { 0 };
                            pos += 1;
                        }
                    }
                    if !matches!(self.state, State::Done) {
                        self.state = State::ExpectingTrailers { matched };
                        return Ok(pos);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Cursor;

    #[test]
    fn single_chunk_single_buffer() {
        let mut cur = Cursor::new();
        let data = b"5\r\nhello\r\n0\r\n\r\n";
        let n = cur.scan(data).unwrap();
        assert_eq!(n, data.len());
        assert!(cur.is_done());
    }

    #[test]
    fn partial_size_line() {
        let mut cur = Cursor::new();
        assert_eq!(cur.scan(b"5").unwrap(), 0);
        assert!(!cur.is_done());
        let full = b"5\r\nhello\r\n0\r\n\r\n";
        assert_eq!(cur.scan(full).unwrap(), full.len());
        assert!(cur.is_done());
    }

    #[test]
    fn multiple_chunks_fed_incrementally() {
        let mut cur = Cursor::new();
        let data = b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        let mut forwarded = 0;
        for end in 1..=data.len() {
            if end <= forwarded {
                continue;
            }
            let n = cur.scan(&data[forwarded..end]).unwrap();
            forwarded += n;
        }
        assert_eq!(forwarded, data.len());
        assert!(cur.is_done());
    }

    #[test]
    fn invalid_chunk_size_errors() {
        let mut cur = Cursor::new();
        assert!(cur.scan(b"zzz\r\n").is_err());
    }
}
