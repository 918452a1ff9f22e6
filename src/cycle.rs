//! Top-level orchestrator tying the upgrade middleware, request
//! forwarder, continue arbiter, backend response reader, response
//! relay, and byte pipe into one request/response cycle.

use std::net::IpAddr;

use netbuf::Buf;

use crate::backend::Backend;
use crate::config::Config;
use crate::context::{Continue, RequestContext};
use crate::continue_arbiter::{self, Outcome};
use crate::enums::{Status, Version};
use crate::error::Error;
use crate::forwarder::{self, RequestBody};
use crate::headers::HeaderList;
use crate::inbound::Inbound;
use crate::pipe;
use crate::relay;
use crate::serializer::{Body, MessageState};
use crate::upgrade;

/// How a cycle ended.
#[derive(Debug)]
pub enum Disposition {
    /// An ordinary HTTP response was relayed to the client. `close`
    /// says whether the caller must not reuse the client connection
    /// for another request.
    Completed { close: bool },
    /// The connection was promoted to a byte pipe and has since ended;
    /// never reusable regardless of `Completed`'s `close` flag.
    Upgraded,
    /// A client-visible error was written before any backend response
    /// reached the client (malformed upgrade, unreachable backend,
    /// continue timeout). The connection must not be reused.
    ClientError(Status),
}

/// The backend's terminal status was read; this is what remains to be
/// decided once it has.
enum Landing {
    /// Relay the response to the client using ordinary HTTP framing.
    Ordinary { backend: Backend, version: Version, status: Status, headers: HeaderList },
    /// The backend honored the upgrade; promote both sockets to a byte
    /// pipe.
    Upgraded { backend: Backend, version: Version, status: Status, headers: HeaderList },
}

/// Runs one full relay cycle against `inbound`, connecting to the
/// backend at `ip:port`. Consumes `inbound`: on a successful upgrade it
/// is handed over to the byte pipe and the caller must not touch it
/// again.
pub fn run_cycle(
    mut inbound: Box<dyn Inbound>,
    ip: IpAddr,
    port: u16,
    config: &Config,
) -> Result<Disposition, Error> {
    let method = inbound.method().to_string();
    let path = inbound.path().to_string();
    let version = inbound.version();
    let headers = inbound.headers().clone();
    let is_head = method.eq_ignore_ascii_case("HEAD");
    let mut ctx = RequestContext::new(version.is_http10(), is_head);

    let upgrade_requested = match upgrade::check(&headers) {
        Ok(v) => v,
        Err(err) => {
            debug!("malformed upgrade request: {}", err);
            return reply_with_synthetic_error(&mut *inbound, &err);
        }
    };
    ctx.set_upgraded(upgrade_requested);

    let landing = drive_to_landing(&mut *inbound, ip, port, config,
                                    &method, &path, version, headers, &mut ctx);

    match landing {
        Ok(Landing::Ordinary { mut backend, version, status, headers }) => {
            let close = relay::should_close(&ctx, &status);
            relay::deliver(&mut backend, &mut *inbound, &ctx, version, status,
                            headers, config.get_inline_body_limit())?;
            Ok(Disposition::Completed { close })
        }
        Ok(Landing::Upgraded { backend, version, status, headers }) => {
            info!("promoting connection to byte pipe after 101 from backend");
            let head = relay::build_switching_protocols_head(version, &status, &headers);
            let (backend_sock, backend_residual) = backend.raw_socket();
            let (client_sock, client_residual) = inbound.into_raw_parts();
            pipe::run(client_sock, client_residual, backend_sock, backend_residual,
                      &head, config.get_idle_timeout())?;
            Ok(Disposition::Upgraded)
        }
        Err(err) => {
            if err.is_pre_response() {
                reply_with_synthetic_error(&mut *inbound, &err)
            } else {
                Err(err)
            }
        }
    }
}

/// Connects to the backend, forwards the request (racing the continue
/// arbiter when applicable), and reads the backend's terminal response
/// head, deciding whether it lands as an ordinary response or an
/// upgrade.
fn drive_to_landing(
    inbound: &mut dyn Inbound,
    ip: IpAddr,
    port: u16,
    config: &Config,
    method: &str,
    path: &str,
    version: Version,
    headers: HeaderList,
    ctx: &mut RequestContext,
) -> Result<Landing, Error> {
    let mut backend = Backend::connect(ip, port, config.get_connect_timeout())?;
    backend.set_request_is_head(ctx.is_head());
    debug!("connected to backend {}:{}", ip, port);

    let body_kind = forwarder::classify_request_body(&headers);
    let wants_continue = forwarder::expects_continue(&headers);

    let mut req_msg = MessageState::RequestStart;
    let mut head_buf = Buf::new();
    forwarder::write_head(&mut req_msg, &mut head_buf, method, path, version,
                           headers, body_kind);
    backend.raw_request(&head_buf[..])?;

    let early_response = if wants_continue && body_kind != RequestBody::Empty {
        match continue_arbiter::arbitrate(&mut backend, inbound,
                config.get_continue_deadline(), config.get_continue_poll_interval())? {
            Outcome::Proceed(state) => {
                ctx.set_continue(state);
                None
            }
            Outcome::BackendRespondedEarly(v, status, h) => {
                // The backend answered before the body was forwarded and
                // no `100` was ever sent to the client, so this is the
                // same "no interim response" situation as `Pending`: the
                // should_close law must see it that way too.
                ctx.set_continue(Continue::Pending);
                Some((v, status, h))
            }
        }
    } else {
        None
    };

    if early_response.is_none() {
        if body_kind != RequestBody::Empty {
            forwarder::forward_body(&mut req_msg, &mut backend, inbound,
                                     body_kind == RequestBody::Chunked)?;
        } else {
            // A bodyless request's framing (`Content-Length: 0`) was
            // already declared and flushed above; finalizing writes no
            // further bytes.
            let mut scratch = Buf::new();
            req_msg.done(&mut scratch);
        }
    }

    let (version, status, response_headers) = match early_response {
        Some(head) => head,
        None => relay::read_terminal_response(&mut backend, inbound, ctx)?,
    };

    if ctx.is_upgraded() && status.is_switching_protocols() {
        Ok(Landing::Upgraded { backend, version, status, headers: response_headers })
    } else {
        Ok(Landing::Ordinary { backend, version, status, headers: response_headers })
    }
}

fn reply_with_synthetic_error(
    inbound: &mut dyn Inbound,
    err: &Error,
) -> Result<Disposition, Error> {
    let status = Status::synthetic(err.synthetic_status());
    error!("cycle aborted before any response reached the client: {}", err);
    let mut buf = Buf::new();
    let mut msg = MessageState::ResponseStart {
        version: Version::Http11,
        body: Body::Normal,
        close: true,
    };
    msg.response_status(&mut buf, status.code(), status.reason());
    msg.add_length(&mut buf, 0).unwrap();
    msg.done_headers(&mut buf).unwrap();
    msg.done(&mut buf);
    inbound.send_reply(&buf[..], &[]).map_err(Error::ClientIo)?;
    Ok(Disposition::ClientError(status))
}
