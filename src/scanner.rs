use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use ::time::{format_description::well_known, OffsetDateTime};

use crate::ports::PortSpec;
use crate::probe::{self, ProbeOutcome};
use crate::services;
use crate::types::{ScanReport, ScanResult, ScanStatus};

/// Configuration-time failures. Any of these aborts before a single worker
/// starts; per-port failures are recorded in the report instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to resolve host `{host}`")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("host `{host}` resolved to no addresses")]
    NoAddress { host: String },
    #[error("no ports to scan")]
    EmptyPortSpec,
}

/// Live counters shared with whoever wants to watch a scan in flight.
#[derive(Clone, Debug)]
pub struct ScanProgress {
    pub total: Arc<AtomicU64>,
    pub scanned: Arc<AtomicU64>,
    pub open: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            scanned: Arc::new(AtomicU64::new(0)),
            open: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `ports` on `host` with a fixed-size worker pool and per-connection
/// timeouts. Runs to completion.
pub async fn scan(
    host: &str,
    ports: &PortSpec,
    concurrency: usize,
    timeout: Duration,
) -> Result<ScanReport, ScanError> {
    scan_internal(host, ports, concurrency, timeout, None, None).await
}

/// Variant that accepts a `CancellationToken`. Cancellation is cooperative:
/// workers finish their in-flight probe, stop pulling new ports, and the
/// report comes back `Cancelled` with every finished port present.
pub async fn scan_with_cancel(
    host: &str,
    ports: &PortSpec,
    concurrency: usize,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<ScanReport, ScanError> {
    scan_internal(host, ports, concurrency, timeout, Some(cancel), None).await
}

/// Variant that additionally publishes progress counters while running.
pub async fn scan_with_progress(
    host: &str,
    ports: &PortSpec,
    concurrency: usize,
    timeout: Duration,
    cancel: CancellationToken,
    progress: ScanProgress,
) -> Result<ScanReport, ScanError> {
    scan_internal(
        host,
        ports,
        concurrency,
        timeout,
        Some(cancel),
        Some(progress),
    )
    .await
}

async fn scan_internal(
    host: &str,
    ports: &PortSpec,
    concurrency: usize,
    timeout: Duration,
    cancel_opt: Option<CancellationToken>,
    progress_opt: Option<ScanProgress>,
) -> Result<ScanReport, ScanError> {
    if ports.is_empty() {
        return Err(ScanError::EmptyPortSpec);
    }

    // Resolve exactly once, before committing to the scan. Multi-address
    // hosts scan their first address; looping over the rest is the caller's
    // decision.
    let addr = resolve_host(host).await?;

    let progress = progress_opt.unwrap_or_default();
    progress.total.store(ports.len() as u64, Ordering::Relaxed);
    let cancel = cancel_opt.unwrap_or_default();

    let started_at = OffsetDateTime::now_utc();
    let scan_start = Instant::now();

    // Shared work queue: the ascending port list plus a dequeue cursor.
    // fetch_add hands each index to exactly one worker, in FIFO order.
    let port_list: Arc<[u16]> = Arc::from(ports.ports());
    let cursor = Arc::new(AtomicUsize::new(0));

    // One result slot per port, indexed by queue position. Workers only ever
    // write their own slot, and only hold the lock for the write itself.
    let slots: Arc<Mutex<Vec<Option<ScanResult>>>> =
        Arc::new(Mutex::new((0..port_list.len()).map(|_| None).collect()));

    let worker_count = concurrency.clamp(1, port_list.len());
    let mut set = JoinSet::new();
    for _ in 0..worker_count {
        let port_list = port_list.clone();
        let cursor = cursor.clone();
        let slots = slots.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();

        set.spawn(async move {
            loop {
                // The only cancellation point: between pulls, never mid-probe.
                if cancel.is_cancelled() {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                if idx >= port_list.len() {
                    break;
                }
                let port = port_list[idx];

                let probe_start = Instant::now();
                let outcome = probe::probe(addr, port, timeout).await;
                let latency_ms = probe_start.elapsed().as_millis() as u64;

                let service = match &outcome {
                    ProbeOutcome::Open { port, banner } => {
                        Some(services::identify(*port, banner.as_deref()))
                    }
                    _ => None,
                };
                if outcome.is_open() {
                    progress.open.fetch_add(1, Ordering::Relaxed);
                }

                let entry = ScanResult::from_outcome(outcome, service, latency_ms);
                {
                    let mut guard = slots.lock().await;
                    guard[idx] = Some(entry);
                }
                progress.scanned.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    while set.join_next().await.is_some() {}

    let finished_at = OffsetDateTime::now_utc();
    let duration_ms = scan_start.elapsed().as_millis() as u64;

    // Slot order is port order, so dropping unfilled slots keeps the
    // ascending invariant for partial (cancelled) runs too.
    let entries: Vec<ScanResult> = {
        let mut guard = slots.lock().await;
        guard.drain(..).flatten().collect()
    };

    let status = if entries.len() == port_list.len() {
        ScanStatus::Completed
    } else {
        ScanStatus::Cancelled
    };
    let open_count = entries.iter().filter(|e| e.is_open()).count() as u64;

    Ok(ScanReport {
        host: host.to_string(),
        addr,
        status,
        requested: port_list.len() as u64,
        scanned: entries.len() as u64,
        open_count,
        started_at: format_rfc3339(started_at),
        finished_at: format_rfc3339(finished_at),
        duration_ms,
        entries,
    })
}

async fn resolve_host(host: &str) -> Result<IpAddr, ScanError> {
    let mut addrs = lookup_host((host, 0u16))
        .await
        .map_err(|e| ScanError::Resolution {
            host: host.to_string(),
            source: e,
        })?;
    addrs
        .next()
        .map(|sock| sock.ip())
        .ok_or_else(|| ScanError::NoAddress {
            host: host.to_string(),
        })
}

fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
