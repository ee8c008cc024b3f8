use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time;

/// Longest a banner read may take regardless of the connect timeout.
const BANNER_READ_CAP: Duration = Duration::from_millis(200);

/// Largest banner we bother keeping.
const BANNER_MAX_BYTES: usize = 256;

/// Why a port was classified as filtered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// No response within the connect timeout.
    Timeout,
    /// The network stack reported the host or network as unreachable.
    Unreachable,
}

/// Terminal outcome of a single connect attempt against one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The connection was accepted. `banner` holds whatever the service
    /// volunteered within the banner read window, raw, capped at 256 bytes.
    Open { port: u16, banner: Option<Vec<u8>> },
    /// The connection was actively refused.
    Closed { port: u16 },
    /// No conclusive answer: timed out or unreachable.
    Filtered { port: u16, reason: FilterReason },
    /// Some other OS-level failure (resource exhaustion, invalid address, ...).
    Error { port: u16, cause: String },
}

impl ProbeOutcome {
    pub fn port(&self) -> u16 {
        match *self {
            ProbeOutcome::Open { port, .. }
            | ProbeOutcome::Closed { port }
            | ProbeOutcome::Filtered { port, .. }
            | ProbeOutcome::Error { port, .. } => port,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open { .. })
    }
}

/// Attempt one TCP connection to `addr:port`, bounded by `timeout`.
///
/// On success a short, passive banner read follows with its own sub-timeout
/// (at most half the connect timeout); a silent service is still `Open`.
/// Exactly one socket is opened per call and dropped on every exit path.
/// Retries are the caller's business.
pub async fn probe(addr: IpAddr, port: u16, timeout: Duration) -> ProbeOutcome {
    let sock = SocketAddr::new(addr, port);
    match time::timeout(timeout, TcpStream::connect(sock)).await {
        Ok(Ok(mut stream)) => {
            let banner = read_banner(&mut stream, banner_timeout(timeout)).await;
            ProbeOutcome::Open { port, banner }
        }
        Ok(Err(e)) => classify_connect_error(port, &e),
        Err(_) => ProbeOutcome::Filtered {
            port,
            reason: FilterReason::Timeout,
        },
    }
}

/// Map a connect-time `io::Error` onto a probe outcome.
fn classify_connect_error(port: u16, e: &io::Error) -> ProbeOutcome {
    use io::ErrorKind::*;
    match e.kind() {
        ConnectionRefused | ConnectionReset => ProbeOutcome::Closed { port },
        TimedOut => ProbeOutcome::Filtered {
            port,
            reason: FilterReason::Timeout,
        },
        HostUnreachable | NetworkUnreachable => ProbeOutcome::Filtered {
            port,
            reason: FilterReason::Unreachable,
        },
        _ => ProbeOutcome::Error {
            port,
            cause: e.to_string(),
        },
    }
}

fn banner_timeout(connect_timeout: Duration) -> Duration {
    (connect_timeout / 2).min(BANNER_READ_CAP)
}

/// Try a single read of up to [`BANNER_MAX_BYTES`] within `window`.
/// Returns `None` when the service stays silent or the peer misbehaves.
async fn read_banner(stream: &mut TcpStream, window: Duration) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; BANNER_MAX_BYTES];
    match time::timeout(window, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            Some(buf)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_and_reset_are_closed() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(
            classify_connect_error(80, &refused),
            ProbeOutcome::Closed { port: 80 }
        );
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(
            classify_connect_error(80, &reset),
            ProbeOutcome::Closed { port: 80 }
        );
    }

    #[test]
    fn os_timeout_is_filtered() {
        let e = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(
            classify_connect_error(443, &e),
            ProbeOutcome::Filtered {
                port: 443,
                reason: FilterReason::Timeout
            }
        );
    }

    #[test]
    fn unreachable_is_filtered() {
        for kind in [
            io::ErrorKind::HostUnreachable,
            io::ErrorKind::NetworkUnreachable,
        ] {
            let e = io::Error::from(kind);
            assert_eq!(
                classify_connect_error(22, &e),
                ProbeOutcome::Filtered {
                    port: 22,
                    reason: FilterReason::Unreachable
                }
            );
        }
    }

    #[test]
    fn other_failures_are_errors() {
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        match classify_connect_error(1, &e) {
            ProbeOutcome::Error { port, cause } => {
                assert_eq!(port, 1);
                assert!(cause.contains("denied"));
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[test]
    fn banner_window_never_exceeds_half_timeout() {
        assert_eq!(
            banner_timeout(Duration::from_millis(100)),
            Duration::from_millis(50)
        );
        assert_eq!(banner_timeout(Duration::from_secs(2)), BANNER_READ_CAP);
    }
}
