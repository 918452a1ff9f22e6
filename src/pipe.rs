//! Byte pipe: what the relay becomes after a `101 Switching Protocols`
//! upgrade is honored, per §4.6. From this point on neither socket is
//! interpreted as HTTP; bytes are shuttled verbatim in both directions
//! until either side closes or the pipe sits idle past the configured
//! timeout.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

use netbuf::Buf;

use crate::error::Error;

/// Writes the `101` response head and any bytes already buffered past
/// it on either side, then shuttles bytes bidirectionally until the
/// pipe exits. `client_residual` is client bytes read ahead of the
/// request body's end (not yet forwarded); `backend_residual` is
/// backend bytes read past its response headers. Consumes both
/// sockets: the caller must not reuse either afterward.
pub fn run(
    mut client: TcpStream,
    client_residual: Buf,
    mut backend: TcpStream,
    backend_residual: Buf,
    response_head: &[u8],
    idle_timeout: Duration,
) -> Result<(), Error> {
    client.write_all(response_head).map_err(Error::ClientIo)?;
    if backend_residual.len() != 0 {
        client.write_all(&backend_residual[..]).map_err(Error::ClientIo)?;
    }
    if client_residual.len() != 0 {
        backend.write_all(&client_residual[..]).map_err(Error::UpstreamIo)?;
    }

    // Each direction runs on its own thread with its own handle pair;
    // `TcpStream::try_clone` shares the underlying socket, so shutting one
    // clone down is visible to every other clone of the same socket. Each
    // thread also carries a closer pair for *both* sockets, so whichever
    // direction finishes first — clean EOF, error, or idle timeout — forces
    // the other direction's blocking read to unblock immediately, instead
    // of only signaling after both directions have already returned.
    let backend_to_client_src = backend.try_clone().map_err(Error::UpstreamIo)?;
    let backend_to_client_dst = client.try_clone().map_err(Error::ClientIo)?;
    let client_to_backend_src = client.try_clone().map_err(Error::ClientIo)?;
    let client_to_backend_dst = backend.try_clone().map_err(Error::UpstreamIo)?;
    let closer_a_client = client.try_clone().map_err(Error::ClientIo)?;
    let closer_a_backend = backend.try_clone().map_err(Error::UpstreamIo)?;
    let closer_b_client = client.try_clone().map_err(Error::ClientIo)?;
    let closer_b_backend = backend.try_clone().map_err(Error::UpstreamIo)?;

    let backend_to_client = thread::spawn(move || {
        let result = shuttle(backend_to_client_src, backend_to_client_dst,
                              idle_timeout, Error::UpstreamIo, Error::ClientIo);
        let _ = closer_a_client.shutdown(Shutdown::Both);
        let _ = closer_a_backend.shutdown(Shutdown::Both);
        result
    });

    let client_to_backend = thread::spawn(move || {
        let result = shuttle(client_to_backend_src, client_to_backend_dst,
                              idle_timeout, Error::ClientIo, Error::UpstreamIo);
        let _ = closer_b_client.shutdown(Shutdown::Both);
        let _ = closer_b_backend.shutdown(Shutdown::Both);
        result
    });

    let panicked = || Err(Error::UpstreamIo(std::io::Error::new(
        std::io::ErrorKind::Other, "byte pipe thread panicked")));
    let backend_to_client = backend_to_client.join().unwrap_or_else(|_| panicked());
    let client_to_backend = client_to_backend.join().unwrap_or_else(|_| panicked());

    // One side closing cleanly ends the pipe; the other direction's
    // result after the forced shutdown above is just teardown noise.
    let result = match (client_to_backend, backend_to_client) {
        (Ok(()), _) | (_, Ok(())) => Ok(()),
        (Err(e), _) => Err(e),
    };
    match result {
        Ok(()) => info!("byte pipe closed"),
        Err(ref err) => warn!("byte pipe closed with error: {}", err),
    }
    result
}

/// Reads from `src` until EOF, an error, or `idle` passes with nothing
/// read, writing every span read to `dst`. On EOF, half-closes `dst`'s
/// write side so the peer observes end-of-stream on its own read.
fn shuttle(
    mut src: TcpStream,
    mut dst: TcpStream,
    idle: Duration,
    on_read_err: fn(std::io::Error) -> Error,
    on_write_err: fn(std::io::Error) -> Error,
) -> Result<(), Error> {
    src.set_read_timeout(Some(idle)).map_err(on_read_err)?;
    let mut buf = [0u8; 8192];
    loop {
        match src.read(&mut buf) {
            Ok(0) => {
                let _ = dst.shutdown(Shutdown::Write);
                return Ok(());
            }
            Ok(n) => {
                dst.write_all(&buf[..n]).map_err(on_write_err)?;
            }
            Err(ref e) if matches!(e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                return Err(Error::IdleTimeout);
            }
            Err(e) => return Err(on_read_err(e)),
        }
    }
}
