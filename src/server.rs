use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    ports::PortSpec,
    scanner::{self, ScanProgress},
    types::ScanReport,
};

const DEFAULT_CONCURRENCY: usize = 16;
const DEFAULT_TIMEOUT_MS: u64 = 1000;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug)]
struct ServerState {
    status: Status,
    report: Option<ScanReport>,
    progress: Option<ScanProgress>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub total: u64,
    pub scanned: u64,
    pub open: u64,
    pub state: String, // "idle" | "running" | "done" | "cancelled"
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub host: String,
    /// Port spec string, e.g. `"1-1024"` or `"443"`.
    pub ports: String,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let state = AppState {
        inner: Arc::new(RwLock::new(ServerState {
            status: Status {
                total: 0,
                scanned: 0,
                open: 0,
                state: "idle".into(),
            },
            report: None,
            progress: None,
            cancel: None,
        })),
    };

    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/report", get(get_report))
        .route("/cancel", post(post_cancel))
        .with_state(state.clone());

    let app = Router::new().nest("/api", api);

    println!("Serving scan API on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let (scanned, open) = if let Some(p) = s.progress.as_ref() {
        (
            p.scanned.load(std::sync::atomic::Ordering::Relaxed),
            p.open.load(std::sync::atomic::Ordering::Relaxed),
        )
    } else {
        (s.status.scanned, s.status.open)
    };
    let out = Status {
        total: s.status.total,
        scanned,
        open,
        state: s.status.state.clone(),
    };
    (StatusCode::OK, Json(out))
}

async fn get_report(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.report.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    if let Some(c) = s.cancel.take() {
        c.cancel();
        s.status.state = "cancelled".into();
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let ports = match PortSpec::parse(&req.ports) {
        Ok(p) => p,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid port spec: {e}")).into_response()
        }
    };
    if req.host.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "empty host".to_string()).into_response();
    }

    let total = ports.len() as u64;
    let concurrency = req.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    // Prepare shared progress and cancel token
    let progress = ScanProgress::new();
    let cancel = CancellationToken::new();

    // Update state
    {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.status = Status {
            total,
            scanned: 0,
            open: 0,
            state: "running".into(),
        };
        s.report = None;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
    }

    // Spawn scan task
    let app2 = app.clone();
    let host = req.host.clone();
    tokio::spawn(async move {
        let res = scanner::scan_with_progress(
            &host,
            &ports,
            concurrency,
            timeout,
            cancel.clone(),
            progress.clone(),
        )
        .await;

        let mut s = app2.inner.write().await;
        match res {
            Ok(report) => {
                s.status.scanned = report.scanned;
                s.status.open = report.open_count;
                s.status.state = match report.status {
                    crate::types::ScanStatus::Completed => "done".into(),
                    crate::types::ScanStatus::Cancelled => "cancelled".into(),
                };
                s.report = Some(report);
                s.progress = None;
                s.cancel = None;
            }
            Err(e) => {
                s.status.state = "idle".into();
                s.progress = None;
                s.cancel = None;
                eprintln!("scan error: {e}");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(Status {
            total,
            scanned: 0,
            open: 0,
            state: "running".into(),
        }),
    )
        .into_response()
}
