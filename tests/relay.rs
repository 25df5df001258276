//! End-to-end relay tests over loopback sockets

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use splitter::registry::ConnectionRegistry;
use splitter::stats::RelayStats;
use splitter::{RelayConfig, RelayServer, Transform};

const WAIT: Duration = Duration::from_secs(3);

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

struct Relay {
    reader_addr: SocketAddr,
    writer_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<splitter::Result<()>>,
}

impl Relay {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let result = tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("relay should stop")
            .expect("relay task panicked");
        assert!(result.is_ok());
    }

    async fn wait_for_writers(&self, count: usize) {
        let registry = Arc::clone(&self.registry);
        wait_until(move || {
            let registry = Arc::clone(&registry);
            async move { registry.len().await == count }
        })
        .await;
    }
}

fn loopback() -> RelayConfig {
    RelayConfig::with_ports(0, 0).bind_host("127.0.0.1".parse().unwrap())
}

async fn start(config: RelayConfig) -> Relay {
    start_with(RelayServer::bind(config).await.expect("bind relay")).await
}

async fn start_with(server: RelayServer) -> Relay {
    init_tracing();

    let reader_addr = server.reader_addr().unwrap();
    let writer_addr = server.writer_addr().unwrap();
    let registry = Arc::clone(server.registry());
    let stats = Arc::clone(server.stats());
    let (shutdown, stopped) = oneshot::channel();

    let handle = tokio::spawn(server.run_until(async {
        let _ = stopped.await;
    }));

    Relay {
        reader_addr,
        writer_addr,
        registry,
        stats,
        shutdown,
        handle,
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for relayed bytes")
        .expect("read relayed bytes");
    buf
}

async fn assert_silent(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
    assert!(read.is_err(), "unexpected bytes: {:?}", read);
}

#[tokio::test]
async fn test_hello_reaches_subscriber() {
    let relay = start(loopback()).await;

    let mut subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;

    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    reader.write_all(b"hello").await.unwrap();

    assert_eq!(read_exactly(&mut subscriber, 5).await, b"hello");
    assert_silent(&mut subscriber).await;

    relay.stop().await;
}

#[tokio::test]
async fn test_transform_changes_delivered_bytes() {
    let upper = |chunk: Bytes| Bytes::from(chunk.to_ascii_uppercase());
    let server = RelayServer::bind(loopback()).await.unwrap().with_transform(upper);
    let relay = start_with(server).await;

    let mut subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;

    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    reader.write_all(b"hello").await.unwrap();

    assert_eq!(read_exactly(&mut subscriber, 5).await, b"HELLO");

    relay.stop().await;
}

#[tokio::test]
async fn test_every_subscriber_gets_a_copy() {
    let relay = start(loopback()).await;

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        subscribers.push(TcpStream::connect(relay.writer_addr).await.unwrap());
    }
    relay.wait_for_writers(3).await;

    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    reader.write_all(&payload).await.unwrap();

    for subscriber in &mut subscribers {
        assert_eq!(read_exactly(subscriber, payload.len()).await, payload);
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_default_writer_is_dialed_without_reader_activity() {
    let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = loopback().default_writers([target.local_addr().unwrap().to_string()]);
    let relay = start(config).await;

    let (mut inbound, _) = tokio::time::timeout(WAIT, target.accept())
        .await
        .expect("relay should dial the default writer")
        .unwrap();
    relay.wait_for_writers(1).await;

    // Dialed writers are broadcast targets like any subscriber.
    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    reader.write_all(b"fan-out").await.unwrap();
    assert_eq!(read_exactly(&mut inbound, 7).await, b"fan-out");

    relay.stop().await;
}

#[tokio::test]
async fn test_unreachable_default_writer_does_not_block_startup() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = loopback()
        .default_writers([closed, target.local_addr().unwrap().to_string()])
        .dial_timeout(Duration::from_secs(1));
    let relay = start(config).await;

    let accepted = tokio::time::timeout(WAIT, target.accept()).await;
    assert!(accepted.is_ok(), "second default writer was not dialed");

    let _subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(2).await;
    assert_eq!(relay.stats.snapshot().dial_failures, 1);

    relay.stop().await;
}

#[tokio::test]
async fn test_closed_subscriber_is_pruned_and_others_keep_receiving() {
    let relay = start(loopback()).await;

    let mut survivor = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;
    let leaver = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(2).await;
    drop(leaver);

    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    let mut sent = Vec::new();

    // The first writes to a closed peer may still succeed; keep sending
    // until the relay notices.
    for i in 0..100u32 {
        let part = format!("<{i}>");
        reader.write_all(part.as_bytes()).await.unwrap();
        sent.extend_from_slice(part.as_bytes());
        tokio::time::sleep(Duration::from_millis(10)).await;
        if relay.registry.len().await == 1 {
            break;
        }
    }
    assert_eq!(relay.registry.len().await, 1);
    assert!(relay.stats.snapshot().writers_pruned >= 1);

    reader.write_all(b"<end>").await.unwrap();
    sent.extend_from_slice(b"<end>");

    assert_eq!(read_exactly(&mut survivor, sent.len()).await, sent);

    relay.stop().await;
}

#[tokio::test]
async fn test_concurrent_readers_keep_their_own_order() {
    let relay = start(loopback()).await;

    let mut subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;

    // Reader A sends even bytes, reader B odd bytes, both ascending.
    let mut writers = Vec::new();
    for parity in 0..2u8 {
        let addr = relay.reader_addr;
        writers.push(tokio::spawn(async move {
            let mut reader = TcpStream::connect(addr).await.unwrap();
            for i in 0..100u8 {
                reader.write_all(&[i * 2 + parity]).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let received = read_exactly(&mut subscriber, 200).await;
    let evens: Vec<u8> = received.iter().copied().filter(|b| b % 2 == 0).collect();
    let odds: Vec<u8> = received.iter().copied().filter(|b| b % 2 == 1).collect();

    assert_eq!(evens, (0..100u8).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(odds, (0..100u8).map(|i| i * 2 + 1).collect::<Vec<_>>());

    relay.stop().await;
}

#[tokio::test]
async fn test_chunks_sent_before_any_writer_are_not_replayed() {
    let relay = start(loopback()).await;

    let mut reader = TcpStream::connect(relay.reader_addr).await.unwrap();
    reader.write_all(b"early").await.unwrap();

    let stats = Arc::clone(&relay.stats);
    wait_until(move || {
        let stats = Arc::clone(&stats);
        async move { stats.snapshot().chunks_discarded >= 1 }
    })
    .await;

    let mut subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;

    reader.write_all(b"late").await.unwrap();
    assert_eq!(read_exactly(&mut subscriber, 4).await, b"late");
    assert_silent(&mut subscriber).await;

    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_writer_connections() {
    let relay = start(loopback()).await;

    let mut subscriber = TcpStream::connect(relay.writer_addr).await.unwrap();
    relay.wait_for_writers(1).await;

    relay.stop().await;

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(WAIT, subscriber.read(&mut buf))
        .await
        .expect("subscriber should see the relay close");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[test]
fn test_closure_is_a_transform() {
    fn assert_transform<T: Transform>(_: &T) {}

    let reverse = |chunk: Bytes| Bytes::from(chunk.iter().rev().copied().collect::<Vec<u8>>());
    assert_transform(&reverse);
}
