//! End-to-end cycles against an in-process fake backend listener,
//! matching the style of the teacher's `tests/server_simple.rs` but
//! over real blocking sockets instead of a mock reactor, since this
//! crate drives real `TcpStream`s rather than `tk-bufstream` mocks.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use netbuf::Buf;

use relay_core::enums::Version;
use relay_core::headers::HeaderList;
use relay_core::inbound::{Inbound, InboundChunk};
use relay_core::{run_cycle, Config, Disposition};

struct FakeInbound {
    method: String,
    path: String,
    version: Version,
    headers: HeaderList,
    stream: TcpStream,
    body_done: bool,
}

impl FakeInbound {
    fn new(method: &str, path: &str, headers: HeaderList, stream: TcpStream) -> FakeInbound {
        FakeInbound {
            method: method.to_string(),
            path: path.to_string(),
            version: Version::Http11,
            headers,
            stream,
            body_done: false,
        }
    }
}

impl Inbound for FakeInbound {
    fn method(&self) -> &str { &self.method }
    fn path(&self) -> &str { &self.path }
    fn version(&self) -> Version { self.version }
    fn headers(&self) -> &HeaderList { &self.headers }

    fn next_body_chunk(&mut self) -> std::io::Result<InboundChunk> {
        if self.body_done {
            return Ok(InboundChunk::Done(Vec::new()));
        }
        let len = self.headers.get("Content-Length")
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut data = vec![0u8; len];
        if len > 0 {
            self.stream.read_exact(&mut data)?;
        }
        self.body_done = true;
        Ok(InboundChunk::Done(data))
    }

    fn poll_buffered(&mut self, max: usize, timeout: Duration) -> std::io::Result<Vec<u8>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        self.stream.set_read_timeout(Some(timeout))?;
        let mut buf = vec![0u8; max];
        match self.stream.peek(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(ref e) if matches!(e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn send_continue(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(line)
    }

    fn send_reply(&mut self, head: &[u8], body: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(head)?;
        self.stream.write_all(body)
    }

    fn send_reply_head(&mut self, head: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(head)
    }

    fn write_body_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data)
    }

    fn into_raw_parts(self: Box<Self>) -> (TcpStream, Buf) {
        (self.stream, Buf::new())
    }
}

/// Spawns a one-shot fake backend that accepts a single connection,
/// reads until the request head ends, then writes `response` verbatim.
/// Returns the backend's listening address.
fn spawn_backend(response: &'static [u8]) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        read_request_head(&mut sock);
        sock.write_all(response).unwrap();
    });
    addr
}

fn read_request_head(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        sock.read_exact(&mut byte).unwrap();
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            return;
        }
    }
}

fn client_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let relay_side = thread::spawn(move || listener.accept().unwrap().0);
    let client_side = TcpStream::connect(addr).unwrap();
    (client_side, relay_side.join().unwrap())
}

fn read_all_available(stream: &mut TcpStream, timeout: Duration) -> Vec<u8> {
    stream.set_read_timeout(Some(timeout)).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return out,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => return out,
        }
    }
}

#[test]
fn simple_get_is_relayed_inline() {
    let backend_addr = spawn_backend(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let (mut client_side, relay_side) = client_pair();

    let inbound = Box::new(FakeInbound::new(
        "GET", "/", HeaderList::new(), relay_side));
    let disposition = run_cycle(inbound, backend_addr.ip(), backend_addr.port(),
                                 &Config::new()).unwrap();

    assert!(matches!(disposition, Disposition::Completed { close: false }));
    let received = read_all_available(&mut client_side, Duration::from_millis(500));
    assert_eq!(&received[..],
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
}

#[test]
fn chunked_backend_body_is_forwarded_verbatim() {
    let backend_addr = spawn_backend(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nfoo\r\n0\r\n\r\n");
    let (mut client_side, relay_side) = client_pair();

    let inbound = Box::new(FakeInbound::new(
        "GET", "/stream", HeaderList::new(), relay_side));
    let disposition = run_cycle(inbound, backend_addr.ip(), backend_addr.port(),
                                 &Config::new()).unwrap();

    assert!(matches!(disposition, Disposition::Completed { close: false }));
    let received = read_all_available(&mut client_side, Duration::from_millis(500));
    assert_eq!(&received[..],
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nfoo\r\n0\r\n\r\n");
}

#[test]
fn continue_client_first_forces_connection_close() {
    // The backend never sends its own `100 Continue`; the client's body
    // is already sitting in the socket by the time the arbiter checks,
    // so it must win the race without a round trip.
    let backend_addr = spawn_backend(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    let (mut client_side, relay_side) = client_pair();
    client_side.write_all(b"hi").unwrap();

    let mut headers = HeaderList::new();
    headers.push("Expect", &b"100-continue"[..]);
    headers.push("Content-Length", &b"2"[..]);
    let inbound = Box::new(FakeInbound::new("PUT", "/upload", headers, relay_side));

    let disposition = run_cycle(inbound, backend_addr.ip(), backend_addr.port(),
                                 &Config::new()).unwrap();

    assert!(matches!(disposition, Disposition::Completed { close: true }));
    let received = read_all_available(&mut client_side, Duration::from_millis(500));
    assert_eq!(&received[..],
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
}

#[test]
fn continue_backend_first_forwards_single_hundred_continue() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let backend_addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        read_request_head(&mut sock);
        sock.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").unwrap();
        let mut body = [0u8; 10];
        sock.read_exact(&mut body).unwrap();
        assert_eq!(&body, b"0123456789");
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").unwrap();
    });

    let (mut client_side, relay_side) = client_pair();
    // The client hasn't sent its body yet; it only does so once it has
    // seen the forwarded `100 Continue`, simulating the backend-first race.
    thread::spawn(move || {
        let mut buf = [0u8; "HTTP/1.1 100 Continue\r\n\r\n".len()];
        client_side.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], b"HTTP/1.1 100 Continue\r\n\r\n");
        client_side.write_all(b"0123456789").unwrap();
        let reply = read_all_available(&mut client_side, Duration::from_millis(500));
        assert_eq!(&reply[..], b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    });

    let mut headers = HeaderList::new();
    headers.push("Expect", &b"100-continue"[..]);
    headers.push("Content-Length", &b"10"[..]);
    let inbound = Box::new(FakeInbound::new("POST", "/upload", headers, relay_side));

    let disposition = run_cycle(inbound, backend_addr.ip(), backend_addr.port(),
                                 &Config::new()).unwrap();
    assert!(matches!(disposition, Disposition::Completed { close: false }));
}

#[test]
fn malformed_upgrade_short_circuits_without_contacting_backend() {
    // Port 1 is never listened on; if the relay tried to dial a backend
    // here the cycle would fail with `UpstreamUnreachable`, not return
    // cleanly, so a clean 400 here proves no connection was attempted.
    let (mut client_side, relay_side) = client_pair();
    let mut headers = HeaderList::new();
    headers.push("Connection", &b"upgrade"[..]);
    let inbound = Box::new(FakeInbound::new("GET", "/ws", headers, relay_side));

    let disposition = run_cycle(inbound, "127.0.0.1".parse().unwrap(), 1,
                                 &Config::new()).unwrap();

    match disposition {
        Disposition::ClientError(status) => assert_eq!(status.code(), 400),
        other => panic!("expected ClientError(400), got {:?}", other),
    }
    let received = read_all_available(&mut client_side, Duration::from_millis(500));
    assert!(received.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn successful_upgrade_relays_head_and_shuttles_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let backend_addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        read_request_head(&mut sock);
        sock.write_all(
            b"HTTP/1.1 101 Switching Protocols\r\n\
              Connection: Upgrade\r\nUpgrade: websocket\r\n\r\npayload").unwrap();
        thread::sleep(Duration::from_millis(100));
        let _ = sock.shutdown(std::net::Shutdown::Both);
    });

    let (mut client_side, relay_side) = client_pair();
    let mut headers = HeaderList::new();
    headers.push("Connection", &b"upgrade"[..]);
    headers.push("Upgrade", &b"websocket"[..]);
    let inbound = Box::new(FakeInbound::new("GET", "/ws", headers, relay_side));

    let mut config = Config::new();
    config.idle_timeout(Duration::from_millis(300));
    let disposition = run_cycle(inbound, backend_addr.ip(), backend_addr.port(),
                                 &config).unwrap();

    assert!(matches!(disposition, Disposition::Upgraded));
    let received = read_all_available(&mut client_side, Duration::from_millis(500));
    assert_eq!(&received[..],
        &b"HTTP/1.1 101 Switching Protocols\r\n\
           Connection: Upgrade\r\nUpgrade: websocket\r\n\r\npayload"[..]);
}
