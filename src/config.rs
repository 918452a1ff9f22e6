//! Relay configuration knobs.
//!
//! This is a plain struct with chainable setters, in the shape of
//! `tk-http`'s own `client::Config` — there is no serde/toml document
//! behind it. Parsing configuration *sources* (files, env, CLI flags)
//! is an external concern the relay never touches.

use std::time::Duration;

/// Fine-grained configuration of a single relay cycle.
#[derive(Debug, Clone)]
pub struct Config {
    connect_timeout: Duration,
    continue_deadline: Duration,
    continue_poll_interval: Duration,
    idle_timeout: Duration,
    inline_body_limit: usize,
}

impl Config {
    /// Defaults matching §5 of the specification: a 100ms fail-fast
    /// backend connect, a 55s `Expect: 100-continue` deadline polled
    /// every second, and a 55s idle timeout on the upgraded byte pipe.
    pub fn new() -> Config {
        Config {
            connect_timeout: Duration::from_millis(100),
            continue_deadline: Duration::from_secs(55),
            continue_poll_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(55),
            inline_body_limit: 1024,
        }
    }

    /// Backend connect timeout. Treated as a configuration knob rather
    /// than a hardcoded constant per the spec's open question: the
    /// 100ms default is too aggressive for some deployments.
    pub fn connect_timeout(&mut self, value: Duration) -> &mut Self {
        self.connect_timeout = value;
        self
    }

    /// Overall deadline for the `Expect: 100-continue` race.
    pub fn continue_deadline(&mut self, value: Duration) -> &mut Self {
        self.continue_deadline = value;
        self
    }

    /// How long each inner poll of the continue arbiter waits on the
    /// backend before re-checking the client socket.
    pub fn continue_poll_interval(&mut self, value: Duration) -> &mut Self {
        self.continue_poll_interval = value;
        self
    }

    /// Idle timeout for the post-upgrade byte pipe.
    pub fn idle_timeout(&mut self, value: Duration) -> &mut Self {
        self.idle_timeout = value;
        self
    }

    /// Upper bound (bytes) on a known-length response body that is read
    /// fully into memory and sent as one reply, instead of streamed.
    pub fn inline_body_limit(&mut self, value: usize) -> &mut Self {
        self.inline_body_limit = value;
        self
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_continue_deadline(&self) -> Duration {
        self.continue_deadline
    }

    pub fn get_continue_poll_interval(&self) -> Duration {
        self.continue_poll_interval
    }

    pub fn get_idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn get_inline_body_limit(&self) -> usize {
        self.inline_body_limit
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
