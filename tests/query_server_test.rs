//! Integration tests for the UDP query server over loopback.

use light_sampler::config::ServerConfig;
use light_sampler::sampler::{SharedStream, StreamSettings};
use light_sampler::server::{QueryServer, MAX_DATAGRAM};
use light_sampler::shutdown::Shutdown;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn loopback_config() -> ServerConfig {
    ServerConfig {
        bind_addr: [127, 0, 0, 1].into(),
        port: 0,
        ..Default::default()
    }
}

/// Start a server over `stream`; returns its address, stop handle and task.
async fn start_server(stream: SharedStream) -> (SocketAddr, Shutdown, JoinHandle<u64>) {
    let server = QueryServer::bind(&loopback_config(), stream)
        .await
        .expect("bind loopback");
    let addr = server.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown, task)
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn recv(client: &UdpSocket) -> String {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let len = timeout(REPLY_TIMEOUT, client.recv(&mut buf))
        .await
        .expect("reply in time")
        .unwrap();
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

async fn query(client: &UdpSocket, server: SocketAddr, request: &str) -> String {
    client.send_to(request.as_bytes(), server).await.unwrap();
    recv(client).await
}

fn stream_with(samples: &[f64]) -> SharedStream {
    let stream = SharedStream::new(StreamSettings::default());
    for &s in samples {
        stream.record(s);
    }
    stream
}

#[tokio::test]
async fn test_count_and_length() {
    let stream = stream_with(&[1.0; 25]);
    stream.rollover();
    stream.record(1.0);
    let (addr, shutdown, task) = start_server(stream).await;
    let client = client().await;

    assert_eq!(
        query(&client, addr, "count").await,
        "# samples taken total: 26\n"
    );
    assert_eq!(
        query(&client, addr, "length\n").await,
        "# samples taken last second: 25\n"
    );
    assert_eq!(query(&client, addr, "dips").await, "# Dips: 0\n");

    shutdown.trigger();
    assert_eq!(task.await.unwrap(), 3);
}

#[tokio::test]
async fn test_help_lists_commands() {
    let (addr, shutdown, _task) = start_server(stream_with(&[])).await;
    let client = client().await;

    let help = query(&client, addr, "?").await;
    for command in ["count", "length", "dips", "history", "stop"] {
        assert!(help.contains(command), "help is missing {command}");
    }
    assert_eq!(query(&client, addr, "help").await, help);
    shutdown.trigger();
}

#[tokio::test]
async fn test_empty_request_repeats_last_command() {
    let (addr, shutdown, _task) = start_server(stream_with(&[1.0, 1.1, 1.2])).await;
    let client = client().await;

    let explicit = query(&client, addr, "count").await;
    let replayed = query(&client, addr, "").await;
    assert_eq!(replayed, explicit);

    // A newline alone is an empty request too
    assert_eq!(query(&client, addr, "\n").await, explicit);
    shutdown.trigger();
}

#[tokio::test]
async fn test_empty_request_without_history() {
    let (addr, shutdown, _task) = start_server(stream_with(&[])).await;
    let client = client().await;

    assert_eq!(query(&client, addr, "").await, "Unknown command: \n");
    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_command_is_echoed() {
    let (addr, shutdown, _task) = start_server(stream_with(&[])).await;
    let client = client().await;

    let reply = query(&client, addr, "foobar").await;
    assert!(reply.contains("Unknown"));
    assert!(reply.contains("foobar"));

    // Server keeps serving after a bad request
    assert!(query(&client, addr, "count").await.starts_with("# samples"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_long_unknown_command_is_truncated() {
    let (addr, shutdown, _task) = start_server(stream_with(&[])).await;
    let client = client().await;

    let long = "x".repeat(400);
    let reply = query(&client, addr, &long).await;
    assert_eq!(reply, format!("Unknown command: {}\n", "x".repeat(100)));
    shutdown.trigger();
}

#[tokio::test]
async fn test_history_spans_datagrams() {
    let stream = SharedStream::new(StreamSettings::default());
    for i in 0..2000 {
        stream.record(f64::from(i % 7) / 4.0);
    }
    stream.rollover();
    let (addr, shutdown, _task) = start_server(stream).await;
    let client = client().await;

    client.send_to(b"history", addr).await.unwrap();
    let mut values = Vec::new();
    while values.len() < 2000 {
        let datagram = recv(&client).await;
        assert!(datagram.len() <= MAX_DATAGRAM);
        values.extend(
            datagram
                .split(|c: char| c == ',' || c == '\n')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| v.parse::<f64>().unwrap()),
        );
    }
    assert_eq!(values.len(), 2000);
    assert_eq!(values[5], 1.25);
    shutdown.trigger();
}

#[tokio::test]
async fn test_history_never_torn_during_rollover() {
    let stream = SharedStream::new(StreamSettings::default());
    let (addr, shutdown, _task) = start_server(stream.clone()).await;

    // Interval k holds k % 100 + 1 copies of the value (k % 100 + 1) / 1000.
    let writer = {
        let stream = stream.clone();
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            let mut k = 0u32;
            while !shutdown.is_triggered() {
                let len = k % 100 + 1;
                for _ in 0..len {
                    stream.record(f64::from(len) / 1000.0);
                }
                stream.rollover();
                k += 1;
            }
        })
    };

    let client = client().await;
    for _ in 0..200 {
        let reply = query(&client, addr, "history").await;
        let values: Vec<f64> = reply
            .split(|c: char| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.parse().unwrap())
            .collect();
        if values.is_empty() {
            continue;
        }
        let first = values[0];
        assert!(values.iter().all(|&v| v == first), "mixed intervals: {reply}");
        assert_eq!(values.len(), (first * 1000.0).round() as usize);
    }

    shutdown.trigger();
    writer.join().unwrap();
}

#[tokio::test]
async fn test_peers_have_separate_replay() {
    let (addr, shutdown, _task) = start_server(stream_with(&[1.0])).await;
    let alice = client().await;
    let bob = client().await;

    query(&alice, addr, "dips").await;
    query(&bob, addr, "count").await;

    assert_eq!(query(&alice, addr, "").await, "# Dips: 0\n");
    assert_eq!(query(&bob, addr, "").await, "# samples taken total: 1\n");
    shutdown.trigger();
}

#[tokio::test]
async fn test_stop_replies_then_triggers_shutdown() {
    let (addr, shutdown, task) = start_server(stream_with(&[])).await;
    let client = client().await;

    assert_eq!(query(&client, addr, "stop").await, "Program terminating.\n");
    timeout(REPLY_TIMEOUT, shutdown.wait())
        .await
        .expect("stop should trigger shutdown");
    timeout(REPLY_TIMEOUT, task)
        .await
        .expect("server should exit")
        .unwrap();
}
