/// A status line as relayed between the two connections.
///
/// Unlike a full enumeration of RFC 7231 status codes, the relay only ever
/// needs to classify a status it has *read* (to pick a body-framing mode)
/// or format a status it *synthesizes itself* (400, 502, ...). `Status`
/// keeps the raw code plus a reason string for both purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: u16,
    reason: String,
}

impl Status {
    /// Wraps a status code read from the wire together with its reason
    /// phrase (taken verbatim from the response, not looked up).
    pub fn from_wire(code: u16, reason: &str) -> Status {
        Status { code, reason: reason.to_string() }
    }

    /// A status this crate synthesizes on a client-visible error path.
    pub fn synthetic(code: u16) -> Status {
        Status { code, reason: reason_phrase(code).to_string() }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// `1xx` informational.
    pub fn is_informational(&self) -> bool {
        self.code >= 100 && self.code < 200
    }

    /// `100 Continue` specifically.
    pub fn is_continue(&self) -> bool {
        self.code == 100
    }

    /// `101 Switching Protocols` specifically.
    pub fn is_switching_protocols(&self) -> bool {
        self.code == 101
    }

    /// Status codes for which a response must never carry a body
    /// (1xx, 204, 304), independent of the request method.
    pub fn forbids_body(&self) -> bool {
        self.is_informational() || self.code == 204 || self.code == 304
    }
}

/// Best-effort reason phrase for statuses this crate itself produces.
/// Anything the backend sends keeps its own reason verbatim instead.
fn reason_phrase(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        408 => "Request Timeout",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Error",
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn classifies_no_body_statuses() {
        assert!(Status::from_wire(100, "Continue").forbids_body());
        assert!(Status::from_wire(204, "No Content").forbids_body());
        assert!(Status::from_wire(304, "Not Modified").forbids_body());
        assert!(!Status::from_wire(200, "OK").forbids_body());
    }

    #[test]
    fn recognizes_continue_and_upgrade() {
        assert!(Status::from_wire(100, "Continue").is_continue());
        assert!(Status::from_wire(101, "Switching Protocols")
            .is_switching_protocols());
    }

    #[test]
    fn synthetic_statuses_have_reason_phrases() {
        assert_eq!(Status::synthetic(400).reason(), "Bad Request");
        assert_eq!(Status::synthetic(502).reason(), "Bad Gateway");
    }
}
