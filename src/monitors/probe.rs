//! Probes decide whether an address is reachable right now

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

/// Result of probing one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency: Duration },
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

/// A way of checking reachability
///
/// An unreachable host is a normal outcome, not an error.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// TCP connect probe
///
/// A refused connection still proves the host answered, so it counts as
/// reachable; only timeouts and network errors count as unreachable.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let started = Instant::now();
        let result = time::timeout(self.timeout, TcpStream::connect((address, self.port))).await;

        let outcome = match result {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable {
                latency: started.elapsed(),
            },
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => ProbeOutcome::Reachable {
                latency: started.elapsed(),
            },
            Ok(Err(e)) => ProbeOutcome::Unreachable {
                reason: e.to_string(),
            },
            Err(_) => ProbeOutcome::Unreachable {
                reason: format!("no answer within {:?}", self.timeout),
            },
        };

        trace!("{address}:{} -> {outcome:?}", self.port);
        outcome
    }
}
