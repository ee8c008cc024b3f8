use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};

use crate::types::{PortState, ScanReport, ScanStatus};

/// Render a report as plain text: a summary block plus one line per open port.
pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Port scan report for {} ({})", report.host, report.addr);
    let _ = writeln!(
        out,
        "Status: {}",
        match report.status {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled (partial results)",
        }
    );
    let _ = writeln!(
        out,
        "Scanned {}/{} ports in {} ms ({} -> {})",
        report.scanned, report.requested, report.duration_ms, report.started_at, report.finished_at
    );
    let _ = writeln!(out, "Open ports: {}", report.open_count);
    let _ = writeln!(out);

    for entry in report.open_entries() {
        let service = entry
            .service
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("unknown");
        match &entry.state {
            PortState::Open {
                banner: Some(banner),
            } => {
                let _ = writeln!(out, "Port {}: open - {service} [{banner}]", entry.port);
            }
            _ => {
                let _ = writeln!(out, "Port {}: open - {service}", entry.port);
            }
        }
    }
    out
}

/// Render a report as a standalone HTML document with a table of open ports.
pub fn render_html(report: &ScanReport) -> String {
    let mut html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Port Scan Report - {host}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        table {{ border-collapse: collapse; width: 100%; }}
        th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
        th {{ background-color: #f2f2f2; }}
        tr:nth-child(even) {{ background-color: #f9f9f9; }}
        .header {{ margin-bottom: 20px; }}
    </style>
</head>
<body>
    <div class="header">
        <h1>Port Scan Report</h1>
        <p>Target Host: {host} ({addr})</p>
        <p>Status: {status}</p>
        <p>Start Time: {start}</p>
        <p>End Time: {end}</p>
        <p>Duration: {duration} ms</p>
        <p>Open Ports: {open} of {requested} scanned</p>
    </div>
    <table>
        <tr>
            <th>Port</th>
            <th>State</th>
            <th>Service</th>
            <th>Banner</th>
        </tr>
"#,
        host = escape_html(&report.host),
        addr = report.addr,
        status = match report.status {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled (partial results)",
        },
        start = escape_html(&report.started_at),
        end = escape_html(&report.finished_at),
        duration = report.duration_ms,
        open = report.open_count,
        requested = report.requested,
    );

    for entry in report.open_entries() {
        let service = entry
            .service
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("unknown");
        let banner = match &entry.state {
            PortState::Open {
                banner: Some(banner),
            } => escape_html(banner),
            _ => String::new(),
        };
        let _ = writeln!(
            html,
            "        <tr>\n            <td>{}</td>\n            <td>{}</td>\n            <td>{}</td>\n            <td>{}</td>\n        </tr>",
            entry.port,
            entry.state.label(),
            escape_html(service),
            banner
        );
    }

    html.push_str("    </table>\n</body>\n</html>\n");
    html
}

/// Write the report to `path`, choosing the format from the extension:
/// `.html` renders HTML, `.json` pretty JSON, anything else plain text.
pub fn write_report(path: &Path, report: &ScanReport) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => std::fs::write(path, render_html(report))
            .with_context(|| format!("failed to write HTML report to {}", path.display())),
        Some("json") => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, report)
                .with_context(|| format!("failed to write JSON report to {}", path.display()))
        }
        _ => std::fs::write(path, render_text(report))
            .with_context(|| format!("failed to write text report to {}", path.display())),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, ScanResult, ServiceGuess};

    fn sample_report() -> ScanReport {
        ScanReport {
            host: "example.com".to_string(),
            addr: "93.184.216.34".parse().unwrap(),
            status: ScanStatus::Completed,
            requested: 3,
            scanned: 3,
            open_count: 1,
            started_at: "2023-01-01T12:00:00Z".to_string(),
            finished_at: "2023-01-01T12:00:10Z".to_string(),
            duration_ms: 10_000,
            entries: vec![
                ScanResult {
                    port: 79,
                    state: PortState::Closed,
                    service: None,
                    latency_ms: 1,
                },
                ScanResult {
                    port: 80,
                    state: PortState::Open {
                        banner: Some("HTTP/1.1 200 <ok>".to_string()),
                    },
                    service: Some(ServiceGuess {
                        port: 80,
                        name: "http".to_string(),
                        confidence: Confidence::BannerMatch,
                    }),
                    latency_ms: 12,
                },
                ScanResult {
                    port: 81,
                    state: PortState::Closed,
                    service: None,
                    latency_ms: 1,
                },
            ],
        }
    }

    #[test]
    fn text_report_lists_open_ports_only() {
        let text = render_text(&sample_report());
        assert!(text.contains("Port scan report for example.com"));
        assert!(text.contains("Open ports: 1"));
        assert!(text.contains("Port 80: open - http"));
        assert!(!text.contains("Port 79"));
    }

    #[test]
    fn html_report_has_title_and_row() {
        let html = render_html(&sample_report());
        assert!(html.contains("<title>Port Scan Report - example.com</title>"));
        assert!(html.contains("<td>80</td>"));
        assert!(html.contains("<td>open</td>"));
        assert!(html.contains("<td>http</td>"));
    }

    #[test]
    fn html_report_escapes_banner_text() {
        let html = render_html(&sample_report());
        assert!(html.contains("HTTP/1.1 200 &lt;ok&gt;"));
        assert!(!html.contains("<ok>"));
    }

    #[test]
    fn write_report_dispatches_on_extension() {
        let dir = std::env::temp_dir();
        let report = sample_report();

        let html_path = dir.join("portscout_test_report.html");
        write_report(&html_path, &report).unwrap();
        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        std::fs::remove_file(&html_path).ok();

        let json_path = dir.join("portscout_test_report.json");
        write_report(&json_path, &report).unwrap();
        let parsed: ScanReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed, report);
        std::fs::remove_file(&json_path).ok();

        let txt_path = dir.join("portscout_test_report.txt");
        write_report(&txt_path, &report).unwrap();
        let text = std::fs::read_to_string(&txt_path).unwrap();
        assert!(text.contains("Port 80: open - http"));
        std::fs::remove_file(&txt_path).ok();
    }
}
