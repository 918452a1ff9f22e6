//! Resolves the `Expect: 100-continue` race between client-body
//! arrival and backend interim responses, per §4.3.

use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::context::Continue;
use crate::enums::{Status, Version};
use crate::error::Error;
use crate::headers::HeaderList;
use crate::inbound::Inbound;

/// Result of racing the continue negotiation to a conclusion.
pub enum Outcome {
    /// Body forwarding should proceed; `continue_state` records whether
    /// a `100 Continue` was written to the client.
    Proceed(Continue),
    /// The backend sent a non-interim final response before the body
    /// was forwarded — the backend chose to short-circuit. The caller
    /// must not forward the body and should hand this head straight to
    /// the response relay.
    BackendRespondedEarly(Version, Status, HeaderList),
}

/// Precondition: request headers have already been sent to `backend`
/// and the body has not yet been forwarded.
pub fn arbitrate(
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
    deadline: Duration,
    poll_interval: Duration,
) -> Result<Outcome, Error> {
    let start = Instant::now();
    loop {
        let buffered = inbound.poll_buffered(1, Duration::from_secs(0))
            .map_err(Error::ClientIo)?;
        if !buffered.is_empty() {
            trace!("client body bytes arrived before backend interim response");
            return Ok(Outcome::Proceed(Continue::Pending));
        }

        let elapsed = start.elapsed();
        if elapsed >= deadline {
            warn!("100-continue negotiation exceeded {:?} deadline", deadline);
            return Err(Error::ContinueTimeout);
        }
        let wait = std::cmp::min(poll_interval, deadline - elapsed);

        if let Some((version, status, headers)) = backend.try_read_head(wait)? {
            if status.is_continue() {
                trace!("backend sent 100 Continue, forwarding to client");
                let line = format!("{} 100 Continue\r\n\r\n", version);
                inbound.send_continue(line.as_bytes()).map_err(Error::ClientIo)?;
                return Ok(Outcome::Proceed(Continue::Forwarded));
            }
            debug!("backend responded with {} before request body was forwarded",
                   status.code());
            return Ok(Outcome::BackendRespondedEarly(version, status, headers));
        }
    }
}
