//! UDP query server loop.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{AppResult, SamplerError};
use crate::sampler::SharedStream;
use crate::server::protocol::{self, Command, MAX_DATAGRAM};
use crate::server::session::SessionTable;
use crate::shutdown::Shutdown;

/// Idle sessions are swept at most this often.
const SESSION_SWEEP_EVERY: Duration = Duration::from_secs(10);

/// Replies to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Datagram payloads, sent in order.
    pub datagrams: Vec<String>,
    /// The request asked the program to stop.
    pub stop: bool,
}

impl Reply {
    fn single(text: impl Into<String>) -> Self {
        Self {
            datagrams: vec![text.into()],
            stop: false,
        }
    }
}

/// Answer `command` from the shared stream.
///
/// Only `count` reads a live scalar; everything else reads the published snapshot,
/// which is cloned under the lock and formatted after it is released.
pub fn answer(command: &Command, stream: &SharedStream, max_echo_len: usize) -> Reply {
    match command {
        Command::Help => Reply::single(protocol::HELP_TEXT),
        Command::Count => Reply::single(protocol::count_reply(stream.total_count())),
        Command::Length => Reply::single(protocol::length_reply(&stream.snapshot())),
        Command::Dips => Reply::single(protocol::dips_reply(&stream.snapshot())),
        Command::History => {
            let snapshot = stream.snapshot();
            Reply {
                datagrams: protocol::history_datagrams(snapshot.samples(), MAX_DATAGRAM),
                stop: false,
            }
        }
        Command::Stop => Reply {
            datagrams: vec![protocol::STOP_REPLY.to_string()],
            stop: true,
        },
        Command::Unknown(text) => Reply::single(protocol::unknown_reply(text, max_echo_len)),
    }
}

/// Bound query server, not yet serving.
#[derive(Debug)]
pub struct QueryServer {
    socket: UdpSocket,
    stream: SharedStream,
    sessions: SessionTable,
    max_echo_len: usize,
}

impl QueryServer {
    /// Bind the configured address. Failing to bind is a startup error.
    pub async fn bind(config: &ServerConfig, stream: SharedStream) -> AppResult<Self> {
        let addr = config.socket_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| SamplerError::Bind { addr, source })?;
        info!(addr = %socket.local_addr().unwrap_or(addr), "Query server listening");

        Ok(Self {
            socket,
            stream,
            sessions: SessionTable::new(Duration::from_secs(config.session_idle_secs)),
            max_echo_len: config.max_echo_len,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests one at a time until `shutdown` fires or a peer sends `stop`.
    ///
    /// Returns the number of requests handled. The socket is closed when the server is
    /// dropped on return.
    pub async fn run(mut self, shutdown: Shutdown) -> u64 {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut handled = 0u64;
        let mut last_sweep = Instant::now();

        loop {
            let (len, peer) = tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port-unreachable from a vanished peer surfaces here
                        warn!(error = %e, "Query receive failed");
                        continue;
                    }
                },
                _ = shutdown.wait() => break,
            };

            handled += 1;
            let now = Instant::now();
            if now.duration_since(last_sweep) >= SESSION_SWEEP_EVERY {
                let expired = self.sessions.expire(now.into_std());
                if expired > 0 {
                    debug!(expired, "Expired idle query sessions");
                }
                last_sweep = now;
            }

            let line = protocol::request_line(&buf[..len]);
            let line = self.sessions.resolve(peer, line, now.into_std());
            let command = Command::parse(&line);
            debug!(%peer, ?command, "Query received");

            let reply = answer(&command, &self.stream, self.max_echo_len);
            for datagram in &reply.datagrams {
                if let Err(e) = self.socket.send_to(datagram.as_bytes(), peer).await {
                    warn!(%peer, error = %e, "Query reply failed");
                    break;
                }
            }

            if reply.stop {
                info!(%peer, "Stop requested over UDP");
                shutdown.trigger();
                break;
            }
        }

        info!(requests = handled, "Query server stopped");
        handled
    }
}
