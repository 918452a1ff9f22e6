//! Header-value token helpers and the ordered header-list type shared by
//! the request forwarder and the response relay.

/// header value is byte sequence
/// we need case insensitive comparison and strip out of the whitespace
pub fn is_close(val: &[u8]) -> bool {
    if val.len() < "close".len() {
        return false;
    }
    let mut iter = val.iter();
    for (idx, &ch) in iter.by_ref().enumerate() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => continue,
            b'c' | b'C' => {
                if idx + "close".len() > val.len() {
                    return false;
                }
                break;
            }
            _ => return false,
        }
    }
    for (idx, ch) in iter.by_ref().take(4).enumerate() {
        if b"lose"[idx] != ch.to_ascii_lowercase() {
            return false;
        }
    }
    for &ch in iter {
        if !matches!(ch, b'\r' | b'\n' | b' ' | b'\t') {
            return false;
        }
    }
    return true;
}

/// header value is byte sequence
/// we need case insensitive comparison and strip out of the whitespace
pub fn is_chunked(val: &[u8]) -> bool {
    if val.len() < "chunked".len() {
        return false;
    }
    let mut iter = val.iter();
    for (idx, &ch) in iter.by_ref().enumerate() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => continue,
            b'c' | b'C' => {
                if idx + "chunked".len() > val.len() {
                    return false;
                }
                break;
            }
            _ => return false,
        }
    }
    for (idx, ch) in iter.by_ref().take(6).enumerate() {
        if b"hunked"[idx] != ch.to_ascii_lowercase() {
            return false;
        }
    }
    for &ch in iter {
        if !matches!(ch, b'\r' | b'\n' | b' ' | b'\t') {
            return false;
        }
    }
    return true;
}

/// header value is byte sequence
/// we need case insensitive comparison and strip out of the whitespace
pub fn is_continue(val: &[u8]) -> bool {
    if val.len() < "100-continue".len() {
        return false;
    }
    let mut iter = val.iter();
    for (idx, &ch) in iter.by_ref().enumerate() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => continue,
            b'1' => {
                if idx + "100-continue".len() > val.len() {
                    return false;
                }
                break;
            }
            _ => return false,
        }
    }
    for (idx, ch) in iter.by_ref().take(11).enumerate() {
        if b"00-continue"[idx] != ch.to_ascii_lowercase() {
            return false;
        }
    }
    for &ch in iter {
        if !matches!(ch, b'\r' | b'\n' | b' ' | b'\t') {
            return false;
        }
    }
    return true;
}

/// Splits a header value on commas into trimmed, lowercased tokens. Used
/// for `Connection` (hop-by-hop header list) and `Upgrade` (protocol list).
pub fn tokens(val: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(val)
        .split(',')
        .map(|tok| tok.trim().to_ascii_lowercase())
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Whether a `Connection` header value contains the `upgrade` token.
pub fn connection_requests_upgrade(val: &[u8]) -> bool {
    tokens(val).iter().any(|tok| tok == "upgrade")
}

/// A single header as forwarded or rewritten: an ASCII name and an
/// opaque byte-string value (values are not assumed to be UTF-8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: Vec<u8>,
}

impl HeaderEntry {
    pub fn new<N: Into<String>, V: Into<Vec<u8>>>(name: N, value: V) -> Self {
        HeaderEntry { name: name.into(), value: value.into() }
    }

    pub fn name_eq(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// An ordered sequence of `(name, value)` pairs, as described by the
/// "Header list" data model: names compare case-insensitively, and the
/// wire order is preserved across rewriting except where explicitly
/// dropped or appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> HeaderList {
        HeaderList(Vec::new())
    }

    pub fn from_httparse(headers: &[httparse::Header]) -> HeaderList {
        HeaderList(headers.iter().map(|h| {
            HeaderEntry::new(h.name.to_string(), h.value.to_vec())
        }).collect())
    }

    pub fn push<N: Into<String>, V: Into<Vec<u8>>>(&mut self, name: N, value: V) {
        self.0.push(HeaderEntry::new(name, value));
    }

    /// Removes every header whose name matches (case-insensitively).
    /// Returns the removed values, in their original order.
    pub fn remove_all(&mut self, name: &str) -> Vec<Vec<u8>> {
        let mut removed = Vec::new();
        self.0.retain(|h| {
            if h.name_eq(name) {
                removed.push(h.value.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// First value for a header name, if present.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0.iter().find(|h| h.name_eq(name)).map(|h| h.value.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|h| h.name_eq(name))
    }

    /// Ensures exactly one occurrence of `name: value` is present, adding
    /// it if absent. Does not disturb any other header's position.
    pub fn ensure<V: Into<Vec<u8>>>(&mut self, name: &str, value: V) {
        if !self.contains(name) {
            self.push(name.to_string(), value);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<HeaderEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A single step of a [`HeaderRewrite`] pass.
#[derive(Debug, Clone)]
enum RewriteOp {
    DropAll(&'static str),
    Ensure(&'static str, Vec<u8>),
}

/// A fixed, ordered sequence of drop/ensure operations applied to a
/// [`HeaderList`]. Shared by the request forwarder and the response
/// relay so the two header-rewrite pipelines named in the component
/// design are one implementation instead of two ad hoc filters.
///
/// Applying the same `HeaderRewrite` twice to its own output is a
/// no-op: every op is either an idempotent removal or an `ensure`
/// (add-if-absent), so the rewrite pipeline satisfies the
/// header-rewrite idempotence property by construction.
#[derive(Debug, Clone, Default)]
pub struct HeaderRewrite(Vec<RewriteOp>);

impl HeaderRewrite {
    pub fn new() -> HeaderRewrite {
        HeaderRewrite(Vec::new())
    }

    /// Removes every occurrence of `name`.
    pub fn drop_all(mut self, name: &'static str) -> Self {
        self.0.push(RewriteOp::DropAll(name));
        self
    }

    /// Ensures `name: value` is present, without disturbing an existing
    /// occurrence.
    pub fn ensure(mut self, name: &'static str, value: Vec<u8>) -> Self {
        self.0.push(RewriteOp::Ensure(name, value));
        self
    }

    pub fn apply(&self, list: &mut HeaderList) {
        for op in &self.0 {
            match *op {
                RewriteOp::DropAll(name) => {
                    list.remove_all(name);
                }
                RewriteOp::Ensure(name, ref value) => {
                    list.ensure(name, value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{connection_requests_upgrade, is_chunked, is_close, is_continue,
                tokens, HeaderList, HeaderRewrite};

    #[test]
    fn test_chunked() {
        assert!(is_chunked(b"chunked"));
        assert!(is_chunked(b"Chunked"));
        assert!(is_chunked(b"chuNKED"));
        assert!(is_chunked(b"CHUNKED"));
        assert!(is_chunked(b"   CHUNKED"));
        assert!(is_chunked(b"   CHUNKED  "));
        assert!(is_chunked(b"chunked  "));
        assert!(is_chunked(b"   CHUNKED"));
        assert!(!is_chunked(b"   CHUNKED 1 "));
    }

    #[test]
    fn test_close() {
        assert!(is_close(b"close"));
        assert!(is_close(b"Close"));
        assert!(is_close(b"clOSE"));
        assert!(is_close(b"CLOSE"));
        assert!(is_close(b" CLOSE"));
        assert!(is_close(b"   close   "));
        assert!(!is_close(b"Close  1 "));
        assert!(!is_close(b" xclose   "));
    }

    #[test]
    fn test_continue() {
        assert!(is_continue(b"100-continue"));
        assert!(is_continue(b"100-Continue"));
        assert!(is_continue(b"100-conTINUE"));
        assert!(is_continue(b"100-CONTINUE"));
        assert!(is_continue(b"  100-CONTINUE"));
        assert!(is_continue(b"   100-continue   "));
        assert!(!is_continue(b"100-continue y  "));
        assert!(!is_continue(b"100-coztinue   "));
    }

    #[test]
    fn test_tokens() {
        assert_eq!(tokens(b"keep-alive, Upgrade"),
                   vec!["keep-alive".to_string(), "upgrade".to_string()]);
        assert_eq!(tokens(b""), Vec::<String>::new());
    }

    #[test]
    fn test_connection_requests_upgrade() {
        assert!(connection_requests_upgrade(b"Upgrade"));
        assert!(connection_requests_upgrade(b"keep-alive, upgrade"));
        assert!(!connection_requests_upgrade(b"keep-alive"));
    }

    #[test]
    fn header_list_remove_and_ensure() {
        let mut list = HeaderList::new();
        list.push("Host", &b"example.com"[..]);
        list.push("Connection", &b"keep-alive"[..]);
        list.push("X-Req-Id", &b"1"[..]);

        assert_eq!(list.remove_all("connection"), vec![b"keep-alive".to_vec()]);
        assert_eq!(list.len(), 2);

        list.ensure("Connection", &b"close"[..]);
        assert_eq!(list.get("Connection"), Some(&b"close"[..]));
        // ensure() is a no-op when the header is already present
        list.ensure("Connection", &b"keep-alive"[..]);
        assert_eq!(list.get("Connection"), Some(&b"close"[..]));
    }

    #[test]
    fn header_rewrite_is_idempotent() {
        let rewrite = HeaderRewrite::new()
            .drop_all("Connection")
            .drop_all("Host")
            .ensure("Connection", b"close".to_vec());

        let mut once = HeaderList::new();
        once.push("Host", &b"example.com"[..]);
        once.push("Connection", &b"keep-alive"[..]);
        once.push("X-Req-Id", &b"1"[..]);
        rewrite.apply(&mut once);

        let mut twice = once.clone();
        rewrite.apply(&mut twice);

        assert_eq!(once, twice);
        assert_eq!(once.get("Connection"), Some(&b"close"[..]));
        assert!(!once.contains("Host"));
    }
}
