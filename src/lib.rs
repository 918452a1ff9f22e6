//! Request/response relay engine for an HTTP/1.1 reverse proxy.
//!
//! This crate owns exactly the part of a reverse proxy that sits between
//! an already-parsed downstream request and a resolved upstream backend:
//! forwarding the request body, negotiating `Expect: 100-continue`,
//! reading and re-framing the backend's response, and promoting the
//! connection pair to a raw byte pipe on a successful protocol upgrade.
//!
//! Routing, authentication, TLS termination, request-line/header parsing
//! and inbound connection lifecycle are all external collaborators whose
//! interfaces this crate merely consumes (see [`inbound`]).

#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod backend;
pub mod chunked;
pub mod config;
pub mod context;
pub mod cycle;
pub mod enums;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod inbound;
pub mod pipe;
pub mod relay;
pub mod serializer;
pub mod upgrade;

mod continue_arbiter;

pub use crate::backend::{Backend, BodyKind, StreamChunk};
pub use crate::config::Config;
pub use crate::context::{Continue, RequestContext};
pub use crate::cycle::{run_cycle, Disposition};
pub use crate::enums::Version;
pub use crate::error::Error;
