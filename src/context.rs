//! Per-cycle request metadata.
//!
//! Modeled as first-class fields rather than an opaque key-value map, per
//! the Design Notes: the only recognized keys are `continue` and
//! `upgraded`, so they are plain struct fields instead of a map lookup.

/// Where the `Expect: 100-continue` negotiation stands for the current
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    /// The request did not send `Expect: 100-continue`, or negotiation
    /// has not started yet.
    None,
    /// The client sent body bytes before the backend spoke; any `100`
    /// the backend later sends must be swallowed.
    Pending,
    /// A `100 Continue` was written to the client; no further interim
    /// response may be forwarded for this request.
    Forwarded,
}

impl Default for Continue {
    fn default() -> Continue {
        Continue::None
    }
}

/// Mutable metadata threaded through a single relay cycle.
///
/// Owned by the relay for the cycle's duration; mutated only by the
/// continue arbiter and the upgrade middleware.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    continue_state: Continue,
    upgraded: bool,
    is_http10: bool,
    is_head: bool,
}

impl RequestContext {
    pub fn new(is_http10: bool, is_head: bool) -> RequestContext {
        RequestContext {
            continue_state: Continue::None,
            upgraded: false,
            is_http10,
            is_head,
        }
    }

    pub fn continue_state(&self) -> Continue {
        self.continue_state
    }

    pub fn set_continue(&mut self, state: Continue) {
        self.continue_state = state;
    }

    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    pub fn set_upgraded(&mut self, value: bool) {
        self.upgraded = value;
    }

    pub fn is_http10(&self) -> bool {
        self.is_http10
    }

    pub fn is_head(&self) -> bool {
        self.is_head
    }

    /// Whether the response must carry `Connection: close`: the request
    /// used `Expect: 100-continue` without a forwarded `100`, and the
    /// caller has confirmed the final status is `>= 200` (checked by
    /// the response relay, not here, since that depends on the status
    /// this context does not track).
    pub fn continue_without_interim(&self) -> bool {
        matches!(self.continue_state, Continue::Pending)
    }
}
