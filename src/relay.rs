//! Backend response reader and response relay, per §4.4 and §4.5.

use netbuf::Buf;

use crate::backend::{Backend, BodyKind};
use crate::context::{Continue, RequestContext};
use crate::enums::{Status, Version};
use crate::error::Error;
use crate::headers::{HeaderList, HeaderRewrite};
use crate::inbound::Inbound;
use crate::serializer::{Body, MessageState};

/// Reads the backend's terminal (non-1xx) status and headers,
/// swallowing or forwarding interim `100 Continue` responses per the
/// rules in §4.4. `ctx.continue_state()` reflects what the continue
/// arbiter already decided for this request, if anything.
pub fn read_terminal_response(
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
    ctx: &mut RequestContext,
) -> Result<(Version, Status, HeaderList), Error> {
    loop {
        let (version, status, headers) = backend.response()?;
        if !status.is_continue() {
            return Ok((version, status, headers));
        }
        match ctx.continue_state() {
            Continue::Pending => continue,
            Continue::Forwarded => return Err(Error::NonTerminalStatusAfterContinue),
            Continue::None => {
                if ctx.is_http10() {
                    continue;
                }
                let line = format!("{} 100 Continue\r\n\r\n", version);
                inbound.send_continue(line.as_bytes()).map_err(Error::ClientIo)?;
                ctx.set_continue(Continue::Forwarded);
                continue;
            }
        }
    }
}

/// The `should_close` law (§8): a response closes the connection iff
/// the request used `Expect: 100-continue` without ever forwarding a
/// `100`, and the final status is `>= 200`.
pub fn should_close(ctx: &RequestContext, status: &Status) -> bool {
    ctx.continue_without_interim() && status.code() >= 200
}

fn response_header_rewrite(close: bool) -> HeaderRewrite {
    let rewrite = HeaderRewrite::new().drop_all("Connection");
    if close {
        rewrite.ensure("Connection", b"close".to_vec())
    } else {
        rewrite
    }
}

fn body_tag(status: &Status, is_head: bool) -> Body {
    if is_head {
        Body::Head
    } else if status.forbids_body() {
        Body::Denied
    } else {
        Body::Normal
    }
}

/// Delivers the backend's response to the client using the framing
/// mode appropriate for its classified body, then closes the backend
/// connection. `inline_limit` is `Config::inline_body_limit`.
pub fn deliver(
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
    ctx: &RequestContext,
    version: Version,
    status: Status,
    mut headers: HeaderList,
    inline_limit: usize,
) -> Result<(), Error> {
    let close = should_close(ctx, &status);
    response_header_rewrite(close).apply(&mut headers);

    let mut head_buf = Buf::new();
    let mut msg = MessageState::ResponseStart {
        version,
        body: body_tag(&status, ctx.is_head()),
        close,
    };
    msg.response_status(&mut head_buf, status.code(), status.reason());
    for h in headers.iter() {
        msg.add_header(&mut head_buf, &h.name, &h.value).unwrap();
    }

    let body_type = backend.body_type();
    debug!("relaying {} response, body {:?}, close={}", status.code(), body_type, close);
    let result = match body_type {
        BodyKind::NoBody => deliver_empty(&mut msg, &mut head_buf, inbound),
        BodyKind::ContentSize(n) if n as usize <= inline_limit => {
            deliver_inline(&mut msg, &mut head_buf, backend, inbound, n)
        }
        BodyKind::ContentSize(n) => {
            deliver_streamed_fixed(&mut msg, &mut head_buf, backend, inbound, n)
        }
        BodyKind::StreamClose => deliver_streamed_close(&mut msg, &mut head_buf, backend, inbound),
        BodyKind::Chunked => deliver_chunked_raw(&mut msg, &mut head_buf, backend, inbound),
    };
    if let Err(ref err) = result {
        warn!("response relay aborted: {}", err);
    }

    backend.close();
    result
}

fn deliver_empty(
    msg: &mut MessageState,
    head_buf: &mut Buf,
    inbound: &mut dyn Inbound,
) -> Result<(), Error> {
    msg.done_headers(head_buf).unwrap();
    msg.done(head_buf);
    inbound.send_reply(&head_buf[..], &[]).map_err(Error::ClientIo)
}

fn deliver_inline(
    msg: &mut MessageState,
    head_buf: &mut Buf,
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
    n: u64,
) -> Result<(), Error> {
    msg.add_length(head_buf, n).unwrap();
    msg.done_headers(head_buf).unwrap();
    let head_len = head_buf.len();
    let body = backend.response_body()?;
    msg.write_body(head_buf, &body);
    msg.done(head_buf);
    inbound.send_reply(&head_buf[..head_len], &head_buf[head_len..])
        .map_err(Error::ClientIo)
}

fn deliver_streamed_fixed(
    msg: &mut MessageState,
    head_buf: &mut Buf,
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
    n: u64,
) -> Result<(), Error> {
    msg.add_length(head_buf, n).unwrap();
    msg.done_headers(head_buf).unwrap();
    inbound.send_reply_head(&head_buf[..]).map_err(Error::ClientIo)?;

    let mut scratch = Buf::new();
    loop {
        let chunk = backend.next_chunk()?;
        let done = chunk.is_done();
        if !chunk.data().is_empty() {
            msg.write_body(&mut scratch, chunk.data());
            inbound.write_body_chunk(&scratch[..]).map_err(Error::ClientIo)?;
            scratch.consume(scratch.len());
        }
        if done {
            msg.done(&mut scratch);
            if scratch.len() != 0 {
                inbound.write_body_chunk(&scratch[..]).map_err(Error::ClientIo)?;
            }
            return Ok(());
        }
    }
}

fn deliver_streamed_close(
    msg: &mut MessageState,
    head_buf: &mut Buf,
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
) -> Result<(), Error> {
    msg.add_close_delimited();
    msg.done_headers(head_buf).unwrap();
    inbound.send_reply_head(&head_buf[..]).map_err(Error::ClientIo)?;

    let mut scratch = Buf::new();
    loop {
        let chunk = backend.next_chunk()?;
        let done = chunk.is_done();
        if !chunk.data().is_empty() {
            msg.write_body(&mut scratch, chunk.data());
            inbound.write_body_chunk(&scratch[..]).map_err(Error::ClientIo)?;
            scratch.consume(scratch.len());
        }
        if done {
            msg.done(&mut scratch);
            return Ok(());
        }
    }
}

fn deliver_chunked_raw(
    msg: &mut MessageState,
    head_buf: &mut Buf,
    backend: &mut Backend,
    inbound: &mut dyn Inbound,
) -> Result<(), Error> {
    msg.add_chunked(head_buf).unwrap();
    msg.done_headers(head_buf).unwrap();
    inbound.send_reply_head(&head_buf[..]).map_err(Error::ClientIo)?;

    let mut scratch = Buf::new();
    loop {
        let chunk = backend.next_chunk()?;
        let done = chunk.is_done();
        if !chunk.data().is_empty() {
            msg.write_raw_chunk_bytes(&mut scratch, chunk.data());
            inbound.write_body_chunk(&scratch[..]).map_err(Error::ClientIo)?;
            scratch.consume(scratch.len());
        }
        if done {
            // The backend's own bytes already carried the terminal
            // `0\r\n\r\n` trailer verbatim; don't synthesize another.
            msg.finish_raw();
            return Ok(());
        }
    }
}

/// Serializes a `101 Switching Protocols` head verbatim — no header
/// rewrite, since `Connection: Upgrade`/`Upgrade: <protocol>` are the
/// client's confirmation that the switch happened and must survive
/// untouched, unlike an ordinary response's hop-by-hop headers.
pub fn build_switching_protocols_head(
    version: Version,
    status: &Status,
    headers: &HeaderList,
) -> Vec<u8> {
    let mut buf = Buf::new();
    let mut msg = MessageState::ResponseStart { version, body: Body::Denied, close: false };
    msg.response_status(&mut buf, status.code(), status.reason());
    for h in headers.iter() {
        msg.add_header(&mut buf, &h.name, &h.value).unwrap();
    }
    msg.done_headers(&mut buf).unwrap();
    msg.done(&mut buf);
    buf[..].to_vec()
}
