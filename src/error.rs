//! The relay's single error type, covering every failure kind a cycle can
//! surface (see `§7 Error Handling Design`).

use std::io;

use httparse::InvalidChunkSize;

quick_error! {
    /// Error surfaced from a relay cycle.
    ///
    /// The propagation policy is uniform: the first error aborts the
    /// cycle, the backend connection is always closed before returning,
    /// and there is no automatic retry.
    #[derive(Debug)]
    pub enum Error {
        /// The inbound request asserted `Connection: upgrade` without a
        /// well-formed `Upgrade` header. Maps to a client-visible `400`
        /// without ever contacting a backend.
        MalformedUpgrade {
            description("malformed upgrade request")
        }
        /// `TcpStream::connect` to the backend failed or timed out.
        UpstreamUnreachable(err: io::Error) {
            description("upstream unreachable")
            display("upstream unreachable: {}", err)
            from()
        }
        /// A read or write against the backend failed during any phase
        /// of the cycle (request forwarding, response reading, byte
        /// pipe).
        UpstreamIo(err: io::Error) {
            description("upstream I/O error")
            display("upstream I/O error: {}", err)
        }
        /// A write to the client socket failed while streaming a
        /// response.
        ClientIo(err: io::Error) {
            description("client I/O error")
            display("client I/O error: {}", err)
        }
        /// The backend sent a non-terminal (1xx) status after it had
        /// already sent a `100 Continue` that was forwarded to the
        /// client.
        NonTerminalStatusAfterContinue {
            description("backend sent another interim status \
                after 100 Continue was already forwarded")
        }
        /// Bad chunk-size line in the backend's (or client's) chunked
        /// body.
        InvalidChunkSize(err: InvalidChunkSize) {
            description("invalid chunk size")
            display("invalid chunk size: {}", err)
            from()
        }
        /// Bad status line or header block from the backend.
        InvalidResponse(err: httparse::Error) {
            description("invalid response from backend")
            display("invalid response from backend: {}", err)
            from()
        }
        /// The `Expect: 100-continue` race was not resolved within the
        /// configured deadline.
        ContinueTimeout {
            description("100-continue negotiation timed out")
        }
        /// The upgraded byte pipe sat idle (no bytes either direction)
        /// past the configured idle timeout.
        IdleTimeout {
            description("byte pipe idle timeout")
        }
    }
}

impl Error {
    /// Whether headers have definitely not reached the client yet, so
    /// the caller may still map this error to a synthetic status (502,
    /// 504, ...) instead of just closing the connection.
    pub fn is_pre_response(&self) -> bool {
        matches!(*self,
            Error::MalformedUpgrade |
            Error::UpstreamUnreachable(..) |
            Error::ContinueTimeout)
    }

    /// A reasonable status code to report to the client when
    /// `is_pre_response()` holds.
    pub fn synthetic_status(&self) -> u16 {
        match *self {
            Error::MalformedUpgrade => 400,
            Error::UpstreamUnreachable(..) => 502,
            Error::ContinueTimeout => 504,
            _ => 502,
        }
    }
}
