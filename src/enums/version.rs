use std::fmt;

/// Enum representing the HTTP version of a message.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Version {
    /// Version 1.0 of the HTTP protocol
    Http10,
    /// Version 1.1 of the HTTP protocol
    Http11,
}

impl Version {
    /// Converts the numeric version byte used by `httparse` (0 or 1).
    pub fn from_httparse(v: u8) -> Version {
        match v {
            0 => Version::Http10,
            _ => Version::Http11,
        }
    }

    /// HTTP/1.0 requests never advertise `Expect: 100-continue` support
    /// and any interim `100` response from the backend must be swallowed
    /// rather than forwarded (RFC 7231 section 5.1.1).
    pub fn is_http10(&self) -> bool {
        matches!(*self, Version::Http10)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}
