use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use portscout::ports::PortSpec;
use portscout::report;
use portscout::scanner;
use portscout::server;
use portscout::types::{PortState, ScanReport, ScanStatus};

/// portscout — concurrent TCP connect scanner with service identification.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portscout",
    version,
    about = "Concurrent TCP connect scanner with service identification.",
    long_about = None
)]
struct Cli {
    /// Target host to scan (hostname or IP address). Not needed with --serve.
    host: Option<String>,

    /// Port spec: a single port (`443`) or an inclusive range (`1-1024`).
    #[arg(short = 'p', long, default_value = "1-65535")]
    ports: String,

    /// Number of concurrent scan workers.
    #[arg(short = 'c', long, default_value_t = 16)]
    concurrency: usize,

    /// Per-connection timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Overall deadline in milliseconds; the scan is cancelled when it expires.
    #[arg(long = "deadline-ms")]
    deadline_ms: Option<u64>,

    /// Write the report to this path (.html and .json switch the format).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Serve the scan HTTP API instead of scanning once.
    #[arg(long, default_value_t = false)]
    serve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.serve {
        let bind = "127.0.0.1:8080";
        println!("portscout API starting at http://{bind} (Ctrl+C to stop)");
        server::spawn_server(bind).await?;
        return Ok(());
    }

    let host = cli
        .host
        .clone()
        .context("a target host is required unless --serve is given")?;
    let ports = PortSpec::parse(&cli.ports)
        .map_err(|e| anyhow::anyhow!("bad --ports value `{}`: {e}", cli.ports))?;
    let timeout = Duration::from_millis(cli.timeout_ms);

    println!("portscout configuration:");
    println!("  host         : {}", host);
    println!("  ports        : {}", ports);
    println!("  concurrency  : {}", cli.concurrency);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!(
        "  deadline_ms  : {}",
        cli.deadline_ms
            .map(|d| d.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    let cancel = CancellationToken::new();

    // Ctrl-C asks for a cooperative stop; in-flight probes still finish.
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    if let Some(ms) = cli.deadline_ms {
        let cancel_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            cancel_deadline.cancel();
        });
    }

    let report = scanner::scan_with_cancel(&host, &ports, cli.concurrency, timeout, cancel).await?;

    print_report_table(&report);

    if let Some(path) = cli.output.as_deref() {
        report::write_report(path, &report)?;
        println!("Wrote report to {}", path.display());
    }

    Ok(())
}

fn print_report_table(report: &ScanReport) {
    println!(
        "\nScan of {} ({}) {} in {} ms: {} open, {}/{} scanned",
        report.host,
        report.addr,
        match report.status {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
        },
        report.duration_ms,
        report.open_count,
        report.scanned,
        report.requested
    );

    if report.open_count == 0 {
        println!("No open ports found");
        return;
    }

    let mut service_w = "service".len();
    let mut banner_w = "banner".len();
    for e in report.open_entries() {
        if let Some(s) = &e.service {
            service_w = service_w.max(s.name.len());
        }
        if let PortState::Open {
            banner: Some(banner),
        } = &e.state
        {
            banner_w = banner_w.max(banner.chars().count().min(60));
        }
    }
    let port_w = 5usize.max("port".len());
    let lat_w = "latency_ms".len();

    println!(
        "{:<port_w$}  {:<service_w$}  {:>lat_w$}  {:<banner_w$}",
        "port",
        "service",
        "latency_ms",
        "banner",
        port_w = port_w,
        service_w = service_w,
        lat_w = lat_w,
        banner_w = banner_w
    );
    println!(
        "{:-<port_w$}  {:-<service_w$}  {:-<lat_w$}  {:-<banner_w$}",
        "",
        "",
        "",
        "",
        port_w = port_w,
        service_w = service_w,
        lat_w = lat_w,
        banner_w = banner_w
    );
    for e in report.open_entries() {
        let service = e
            .service
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("unknown");
        let banner: String = match &e.state {
            PortState::Open {
                banner: Some(banner),
            } => banner.chars().take(60).collect(),
            _ => String::new(),
        };
        println!(
            "{:<port_w$}  {:<service_w$}  {:>lat_w$}  {:<banner_w$}",
            e.port,
            service,
            e.latency_ms,
            banner,
            port_w = port_w,
            service_w = service_w,
            lat_w = lat_w,
            banner_w = banner_w
        );
    }
}
