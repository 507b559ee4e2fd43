//! End-to-end tests for the client command surface, spoken over real
//! sockets against an in-process server.

use mirrordb::config::ReplicaOf;
use mirrordb::server::{self, ServerContext};
use mirrordb::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

async fn spawn_server(replica_of: Option<ReplicaOf>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let ctx = Arc::new(ServerContext::new(Config {
        port: addr.port(),
        replica_of,
    }));
    tokio::spawn(async move {
        let _ = server::run(listener, ctx).await;
    });
    addr
}

fn command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0_u8; n];
    timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

async fn read_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut line = Vec::new();
    loop {
        let byte = read_exact(stream, 1).await[0];
        line.push(byte);
        if byte == b'\n' {
            return line;
        }
    }
}

/// Read a bulk-string reply, returning its payload
async fn read_bulk(stream: &mut TcpStream) -> Vec<u8> {
    let header = read_line(stream).await;
    assert_eq!(header[0], b'$', "expected a bulk reply, got {header:?}");
    let len: usize = std::str::from_utf8(&header[1..header.len() - 2])
        .expect("bulk length")
        .parse()
        .expect("bulk length");
    let mut body = read_exact(stream, len + 2).await;
    body.truncate(len);
    body
}

async fn roundtrip(stream: &mut TcpStream, parts: &[&str], expected: &[u8]) {
    stream.write_all(&command(parts)).await.expect("write");
    let reply = read_exact(stream, expected.len()).await;
    assert_eq!(
        reply,
        expected,
        "reply to {parts:?}: {}",
        String::from_utf8_lossy(&reply)
    );
}

#[tokio::test]
async fn ping_and_echo() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    roundtrip(&mut client, &["PING"], b"+PONG\r\n").await;
    roundtrip(&mut client, &["ping"], b"+PONG\r\n").await;
    roundtrip(&mut client, &["ECHO", "hello"], b"$5\r\nhello\r\n").await;
    roundtrip(&mut client, &["ECHO", ""], b"$0\r\n\r\n").await;
}

#[tokio::test]
async fn set_get_and_missing_keys() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    roundtrip(&mut client, &["SET", "fruit", "mango"], b"+OK\r\n").await;
    roundtrip(&mut client, &["GET", "fruit"], b"$5\r\nmango\r\n").await;
    roundtrip(&mut client, &["GET", "vegetable"], b"$-1\r\n").await;

    // Overwrites take the latest value.
    roundtrip(&mut client, &["SET", "fruit", "fig"], b"+OK\r\n").await;
    roundtrip(&mut client, &["GET", "fruit"], b"$3\r\nfig\r\n").await;
}

#[tokio::test]
async fn px_expiry_is_passive() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    // Already expired at read time.
    roundtrip(&mut client, &["SET", "gone", "x", "PX", "0"], b"+OK\r\n").await;
    roundtrip(&mut client, &["GET", "gone"], b"$-1\r\n").await;

    // Far-future deadline is still live.
    roundtrip(&mut client, &["SET", "kept", "x", "px", "100000"], b"+OK\r\n").await;
    roundtrip(&mut client, &["GET", "kept"], b"$1\r\nx\r\n").await;

    // A short deadline lapses.
    roundtrip(&mut client, &["SET", "brief", "x", "PX", "50"], b"+OK\r\n").await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    roundtrip(&mut client, &["GET", "brief"], b"$-1\r\n").await;
}

#[tokio::test]
async fn command_errors_keep_the_connection_open() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    roundtrip(
        &mut client,
        &["FLUSHALL"],
        b"-ERR unknown command 'FLUSHALL'\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        &["GET"],
        b"-ERR wrong number of arguments for 'GET' command\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        &["SET", "k", "v", "EX", "10"],
        b"-ERR SET supports only the PX option\r\n",
    )
    .await;

    // The connection survived all of the above.
    roundtrip(&mut client, &["PING"], b"+PONG\r\n").await;
}

#[tokio::test]
async fn info_reports_primary_replication_state() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(&command(&["INFO"])).await.expect("write");
    let info = String::from_utf8(read_bulk(&mut client).await).expect("utf8");

    assert!(info.starts_with("# Replication"), "info: {info}");
    assert!(info.contains("role:master"));
    assert!(info.contains("master_repl_offset:0"));

    let replid_line = info
        .split("\r\n")
        .find(|line| line.starts_with("master_replid:"))
        .expect("replid line");
    let replid = &replid_line["master_replid:".len()..];
    assert_eq!(replid.len(), 40);
    assert!(replid.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn info_reports_replica_role() {
    // The replica role is read from configuration; no live primary is
    // needed to answer INFO.
    let addr = spawn_server(Some(ReplicaOf {
        host: "localhost".to_string(),
        port: 1,
    }))
    .await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(&command(&["INFO", "replication"])).await.expect("write");
    let info = String::from_utf8(read_bulk(&mut client).await).expect("utf8");

    assert!(info.contains("role:slave"));
    assert!(!info.contains("role:master"));
}

#[tokio::test]
async fn framing_error_closes_the_connection() {
    let addr = spawn_server(None).await;
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(b"hello there\r\n").await.expect("write");

    // The server closes without replying.
    let mut buf = [0_u8; 16];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    assert_eq!(n, 0, "expected EOF, got {:?}", &buf[..n]);

    // Other connections are unaffected.
    let mut other = TcpStream::connect(addr).await.expect("connect");
    roundtrip(&mut other, &["PING"], b"+PONG\r\n").await;
}
