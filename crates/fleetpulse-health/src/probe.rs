//! Single-attempt HTTP health probe.
//!
//! One call is one network attempt. Every failure is returned as a
//! [`FailureKind`]; nothing escapes as an error or a panic.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Why a probe attempt did not count as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// No response head within the timeout.
    Timeout,
    /// The device actively refused the TCP connection.
    ConnectionRefused,
    /// A response arrived with a non-2xx status.
    BadStatus(u16),
    /// Anything else (DNS, reset, protocol error, ...).
    Other(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("Timeout"),
            FailureKind::ConnectionRefused => f.write_str("ConnectionRefused"),
            FailureKind::BadStatus(code) => write!(f, "HTTP {code}"),
            FailureKind::Other(description) => f.write_str(description),
        }
    }
}

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx within the timeout, with the observed latency.
    Success(Duration),
    Failure(FailureKind),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }
}

/// One bounded health request against a device address (`ip:port`).
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, address: &str, timeout: Duration)
    -> impl Future<Output = ProbeOutcome> + Send;
}

/// HTTP/1 `GET {path}` probe over a fresh TCP connection.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_PATH)
    }
}

impl HttpProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn attempt(&self, address: &str, started: Instant) -> ProbeOutcome {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!(%address, "health probe connection refused");
                return ProbeOutcome::Failure(FailureKind::ConnectionRefused);
            }
            Err(e) => {
                debug!(error = %e, %address, "health probe connection failed");
                return ProbeOutcome::Failure(FailureKind::Other(e.to_string()));
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %address, "health probe handshake failed");
                return ProbeOutcome::Failure(FailureKind::Other(e.to_string()));
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method(http::Method::GET)
            .uri(self.path.as_str())
            .header(http::header::HOST, address)
            .header(http::header::USER_AGENT, "fleetpulse-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => return ProbeOutcome::Failure(FailureKind::Other(e.to_string())),
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Success(started.elapsed()),
            Ok(resp) => {
                debug!(status = %resp.status(), %address, "health probe non-2xx");
                ProbeOutcome::Failure(FailureKind::BadStatus(resp.status().as_u16()))
            }
            Err(e) => {
                debug!(error = %e, %address, "health probe request failed");
                ProbeOutcome::Failure(FailureKind::Other(e.to_string()))
            }
        }
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.attempt(address, started)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(%address, ?timeout, "health probe timed out");
                ProbeOutcome::Failure(FailureKind::Timeout)
            }
        }
    }
}
