//! Structured logging for netvigil.
//!
//! Provides a [`Logger`] that writes events to stdout and optionally to a
//! log file. Output is either human-readable plain text or newline-delimited
//! JSON (NDJSON), making it easy to ingest into log shippers and SIEM
//! platforms.

use crate::alerts::types::{AlertSeverity, AlertType};
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

// ── Event types ──────────────────────────────────────────────────────────────

/// All distinct event kinds that netvigil can emit.
///
/// The `#[serde(tag = "event")]` attribute ensures JSON output includes an
/// `"event"` key so consumers can filter by type without inspecting structure.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    /// Informational startup / status message.
    Info { message: &'a str },

    /// A capture session started on an interface.
    CaptureStarted { interface: &'a str, filter: &'a str },

    /// A capture session ended (flag, max-packets cap, or device error).
    CaptureStopped { packets: u64 },

    /// A record passed through the pipeline (verbose mode only).
    Packet {
        src: &'a str,
        dst: &'a str,
        protocol: &'a str,
        length: usize,
    },

    /// A DNS query was processed by the analyzer.
    DnsQuery {
        src: &'a str,
        domain: &'a str,
        suspicious: bool,
    },

    /// A detector or analyzer raised an alert.
    AlertRaised {
        severity: AlertSeverity,
        kind: AlertType,
        title: &'a str,
    },

    /// A detector panicked while analyzing a record; siblings continued.
    DetectorFailed { detector: &'a str },

    /// An alert subscriber callback panicked; publishing continued.
    SubscriberFailed { message: &'a str },

    /// Session summary emitted on graceful shutdown.
    SessionSummary {
        duration_secs: u64,
        packets_total: u64,
        alerts_total: u64,
        dns_queries: u64,
    },
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Shared, thread-safe structured logger.
///
/// Constructed once and passed as an `Arc<Logger>` to every component that
/// emits events. The internal `Mutex` serialises file writes so that output
/// lines are never interleaved across threads.
pub struct Logger {
    /// Whether to format events as NDJSON instead of plain text.
    json: bool,
    /// Optional buffered file writer. `None` when no log file was given.
    file: Option<Mutex<BufWriter<std::fs::File>>>,
}

/// Type alias used throughout the codebase for convenience.
pub type SharedLogger = Arc<Logger>;

impl Logger {
    /// Creates a new logger.
    ///
    /// # Errors
    /// Returns an `io::Error` if the log file cannot be opened or created.
    pub fn new(json: bool, log_path: Option<&str>) -> io::Result<Self> {
        let file = match log_path {
            Some(path) => {
                let f = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Mutex::new(BufWriter::new(f)))
            }
            None => None,
        };

        Ok(Self { json, file })
    }

    /// Logs a single [`Event`], writing to stdout and optionally to the file.
    pub fn log(&self, event: &Event) {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

        let line = if self.json {
            // Serialise the event to a JSON Value so we can inject the timestamp.
            let mut val = serde_json::to_value(event).unwrap_or_default();
            if let Some(obj) = val.as_object_mut() {
                obj.insert(
                    "timestamp".to_string(),
                    serde_json::Value::String(timestamp.clone()),
                );
            }
            serde_json::to_string(&val).unwrap_or_default()
        } else {
            format!("[{}] {}", timestamp, self.plain_text(event))
        };

        println!("{}", line);

        if let Some(mutex) = &self.file {
            if let Ok(mut writer) = mutex.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }

    /// Formats an [`Event`] as a human-readable plain-text string.
    fn plain_text(&self, event: &Event) -> String {
        match event {
            Event::Info { message } => format!("[INFO] {}", message),

            Event::CaptureStarted { interface, filter } =>
                format!("[CAPTURE] started on {} (filter: {})", interface, filter),

            Event::CaptureStopped { packets } =>
                format!("[CAPTURE] stopped after {} packets", packets),

            Event::Packet { src, dst, protocol, length } =>
                format!("[PKT] {} -> {} {} {}B", src, dst, protocol, length),

            Event::DnsQuery { src, domain, suspicious } => {
                let marker = if *suspicious { " (suspicious)" } else { "" };
                format!("[DNS] {} queried {}{}", src, domain, marker)
            }

            Event::AlertRaised { severity, kind, title } =>
                format!("[ALERT] [{}] {}: {}", severity, kind, title),

            Event::DetectorFailed { detector } =>
                format!("[DETECTOR] {} failed; remaining detectors continued", detector),

            Event::SubscriberFailed { message } =>
                format!("[SUBSCRIBER] {}", message),

            Event::SessionSummary { duration_secs, packets_total, alerts_total, dns_queries } =>
                format!(
                    "[SUMMARY] duration={}s packets={} alerts={} dns_queries={}",
                    duration_secs, packets_total, alerts_total, dns_queries
                ),
        }
    }
}
