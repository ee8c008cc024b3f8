use serde::{Deserialize, Serialize};

use crate::probe::{FilterReason, ProbeOutcome};

/// How a service guess was reached.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// The banner matched a known protocol greeting.
    BannerMatch,
    /// The port number is in the well-known-port table.
    PortTable,
    /// Neither banner nor port gave a hint.
    Unknown,
}

/// Best guess at the service behind an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceGuess {
    pub port: u16,
    pub name: String,
    pub confidence: Confidence,
}

/// Final classification of one port, in its reportable form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PortState {
    Open {
        /// Banner text, lossily decoded with CR/LF escaped for single-line display.
        #[serde(skip_serializing_if = "Option::is_none")]
        banner: Option<String>,
    },
    Closed,
    Filtered {
        reason: FilterReason,
    },
    Error {
        cause: String,
    },
}

impl PortState {
    pub fn label(&self) -> &'static str {
        match self {
            PortState::Open { .. } => "open",
            PortState::Closed => "closed",
            PortState::Filtered { .. } => "filtered",
            PortState::Error { .. } => "error",
        }
    }
}

/// One scanned port's final record: the unit stored in a [`ScanReport`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub port: u16,
    #[serde(flatten)]
    pub state: PortState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceGuess>,
    pub latency_ms: u64,
}

impl ScanResult {
    /// Fold a probe outcome and an optional service guess into the stored form.
    pub fn from_outcome(
        outcome: ProbeOutcome,
        service: Option<ServiceGuess>,
        latency_ms: u64,
    ) -> Self {
        let (port, state) = match outcome {
            ProbeOutcome::Open { port, banner } => (
                port,
                PortState::Open {
                    banner: banner.as_deref().map(printable_banner),
                },
            ),
            ProbeOutcome::Closed { port } => (port, PortState::Closed),
            ProbeOutcome::Filtered { port, reason } => (port, PortState::Filtered { reason }),
            ProbeOutcome::Error { port, cause } => (port, PortState::Error { cause }),
        };
        Self {
            port,
            state,
            service,
            latency_ms,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PortState::Open { .. })
    }
}

/// Terminal state of a scan run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Every requested port has a result.
    Completed,
    /// The cancellation token fired; `entries` holds the finished subset.
    Cancelled,
}

/// The ordered outcome of one scan: exactly one entry per scanned port,
/// ascending by port number regardless of completion order. Read-only once
/// the engine hands it back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub host: String,
    /// Address actually scanned (first resolution result).
    pub addr: std::net::IpAddr,
    pub status: ScanStatus,
    /// Ports requested in the spec.
    pub requested: u64,
    /// Ports with a recorded result; equals `requested` unless cancelled.
    pub scanned: u64,
    pub open_count: u64,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub entries: Vec<ScanResult>,
}

impl ScanReport {
    pub fn open_entries(&self) -> impl Iterator<Item = &ScanResult> {
        self.entries.iter().filter(|e| e.is_open())
    }
}

/// Lossy banner-to-text conversion matching what reports can show on one line.
fn printable_banner(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}
