use clap::Parser;

/// netvigil — passive network traffic security monitor.
///
/// Captures live traffic on an interface, classifies every frame, and runs
/// stateful detectors for port scans, traffic surges, cleartext credential
/// leakage, known-bad ports and DNS tunneling.
#[derive(Parser, Debug, Clone)]
#[command(
    name    = "netvigil",
    version = "0.2.0",
    about   = "Passive network traffic security monitor",
    long_about = None,
)]
pub struct Cli {
    // ── Capture ──────────────────────────────────────────────────────────────

    /// Network interface to capture on.
    ///
    /// If omitted, the default capture device selected by libpcap is used.
    /// Use --list-interfaces to see what is available.
    #[arg(short = 'i', long = "interface", value_name = "IFACE")]
    pub interface: Option<String>,

    /// BPF capture filter, e.g. "tcp port 80" or "not host 10.0.0.1".
    #[arg(short = 'f', long = "filter", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Stop the capture after this many parsed packets.
    #[arg(short = 'n', long = "max-packets", value_name = "N", default_value_t = 1000)]
    pub max_packets: u64,

    /// List capture-capable interfaces and exit.
    #[arg(long = "list-interfaces")]
    pub list_interfaces: bool,

    // ── Alerts ───────────────────────────────────────────────────────────────

    /// In-memory alert store capacity. When full, the oldest acknowledged
    /// alerts are evicted; unacknowledged alerts are never dropped.
    #[arg(long = "max-alerts", value_name = "N", default_value_t = 1000)]
    pub max_alerts: usize,

    // ── Logging ──────────────────────────────────────────────────────────────

    /// Write log output to this file in addition to stdout.
    ///
    /// The file is created if it does not exist and appended to if it does.
    /// JSON mode (--json) affects the format written to this file as well.
    #[arg(short = 'o', long = "log-file", value_name = "PATH")]
    pub log_file: Option<String>,

    /// Emit log entries as newline-delimited JSON (NDJSON).
    ///
    /// Each event is a self-contained JSON object on its own line, suitable
    /// for ingestion by log shippers or SIEM platforms.
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Log every captured packet, not just alerts and DNS activity.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
