//! Upgrade middleware: the first thing a relay cycle runs against an
//! inbound request, per §4.1.

use crate::error::Error;
use crate::headers::{self, HeaderList};

/// Inspects `Connection`/`Upgrade` on an inbound request and decides
/// whether this cycle is an upgrade candidate.
///
/// Returns `Ok(true)` when the request is a well-formed upgrade
/// candidate, `Ok(false)` when it is an ordinary request, and `Err` when
/// `Connection: upgrade` was asserted without a usable `Upgrade` header
/// — the caller must short-circuit with `400` before contacting any
/// backend.
pub fn check(headers: &HeaderList) -> Result<bool, Error> {
    let wants_upgrade = headers.get("Connection")
        .map(headers::connection_requests_upgrade)
        .unwrap_or(false);
    if !wants_upgrade {
        return Ok(false);
    }
    match headers.get("Upgrade") {
        Some(value) if !headers::tokens(value).is_empty() => Ok(true),
        _ => Err(Error::MalformedUpgrade),
    }
}

#[cfg(test)]
mod test {
    use super::check;
    use crate::error::Error;
    use crate::headers::HeaderList;

    fn headers(pairs: &[(&str, &str)]) -> HeaderList {
        let mut list = HeaderList::new();
        for &(name, value) in pairs {
            list.push(name.to_string(), value.as_bytes());
        }
        list
    }

    #[test]
    fn plain_request_passes_through() {
        let h = headers(&[("Host", "example.com")]);
        assert_eq!(check(&h).unwrap(), false);
    }

    #[test]
    fn well_formed_upgrade_is_flagged() {
        let h = headers(&[("Connection", "upgrade"), ("Upgrade", "websocket")]);
        assert_eq!(check(&h).unwrap(), true);
    }

    #[test]
    fn upgrade_token_among_others_is_recognized() {
        let h = headers(&[("Connection", "keep-alive, Upgrade"), ("Upgrade", "websocket")]);
        assert_eq!(check(&h).unwrap(), true);
    }

    #[test]
    fn missing_upgrade_header_is_malformed() {
        let h = headers(&[("Connection", "upgrade")]);
        assert!(matches!(check(&h), Err(Error::MalformedUpgrade)));
    }

    #[test]
    fn empty_upgrade_header_is_malformed() {
        let h = headers(&[("Connection", "upgrade"), ("Upgrade", "")]);
        assert!(matches!(check(&h), Err(Error::MalformedUpgrade)));
    }
}
