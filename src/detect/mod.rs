//! Stateful pattern detectors scanning the packet-record stream.
//!
//! Each detector keeps its own time-windowed state behind its own lock and
//! answers one question per record: "is this anomalous?". The
//! [`PatternDetectorSet`] runs every detector on every record, isolates
//! detector failures from each other, and converts surviving findings into
//! alerts.

pub mod config;
pub mod high_traffic;
pub mod port_scan;
pub mod sensitive_data;
pub mod suspicious_port;

pub use high_traffic::HighTrafficDetector;
pub use port_scan::PortScanDetector;
pub use sensitive_data::SensitiveDataDetector;
pub use suspicious_port::SuspiciousPortDetector;

use crate::alerts::types::{Alert, AlertSeverity, AlertSource, AlertType};
use crate::alerts::AlertStore;
use crate::logger::{Event, SharedLogger};
use crate::record::PacketRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a detector reports when a record trips its threshold.
#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Uniform contract for all pattern detectors.
///
/// Implementations own their state behind interior locks so the set can
/// hold them as shared trait objects.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Examines one record, returning a finding when a threshold is crossed
    /// and the correlation key is not in cooldown.
    fn analyze(&self, record: &PacketRecord) -> Option<Finding>;

    /// Drops all windowed state and cooldowns.
    fn reset(&self);
}

/// Counters over the detector set's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectorStats {
    pub packets_analyzed: u64,
    pub alerts_generated: u64,
    pub last_alert_time: Option<DateTime<Utc>>,
}

/// Snapshot returned by [`PatternDetectorSet::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct DetectorSetStats {
    #[serde(flatten)]
    pub counters: DetectorStats,
    pub enabled: bool,
    pub detectors: Vec<&'static str>,
}

/// Runs every registered detector over each record and turns findings into
/// alerts. A panic inside one detector is caught and logged; the remaining
/// detectors still see the record.
pub struct PatternDetectorSet {
    detectors: Vec<Box<dyn Detector>>,
    enabled: AtomicBool,
    stats: Mutex<DetectorStats>,
    alerts: Arc<AlertStore>,
    logger: SharedLogger,
}

impl PatternDetectorSet {
    pub fn new(
        detectors: Vec<Box<dyn Detector>>,
        alerts: Arc<AlertStore>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            detectors,
            enabled: AtomicBool::new(true),
            stats: Mutex::new(DetectorStats::default()),
            alerts,
            logger,
        }
    }

    /// The standard four-detector configuration.
    pub fn with_default_detectors(alerts: Arc<AlertStore>, logger: SharedLogger) -> Self {
        Self::new(
            vec![
                Box::new(PortScanDetector::default()),
                Box::new(HighTrafficDetector::default()),
                Box::new(SensitiveDataDetector::default()),
                Box::new(SuspiciousPortDetector::default()),
            ],
            alerts,
            logger,
        )
    }

    /// Runs all detectors on one record and returns the alerts created.
    pub fn analyze(&self, record: &PacketRecord) -> Vec<Alert> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Vec::new();
        }

        self.stats.lock().packets_analyzed += 1;

        let mut raised = Vec::new();
        for detector in &self.detectors {
            match catch_unwind(AssertUnwindSafe(|| detector.analyze(record))) {
                Ok(Some(finding)) => {
                    let alert = self.alerts.add(
                        finding.kind,
                        finding.severity,
                        finding.title,
                        finding.description,
                        AlertSource::from_record(record),
                        finding.metadata,
                    );
                    {
                        let mut stats = self.stats.lock();
                        stats.alerts_generated += 1;
                        stats.last_alert_time = Some(alert.timestamp);
                    }
                    raised.push(alert);
                }
                Ok(None) => {}
                Err(_) => {
                    self.logger.log(&Event::DetectorFailed {
                        detector: detector.name(),
                    });
                }
            }
        }

        raised
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Resets every detector's state and the set-level counters.
    pub fn reset(&self) {
        for detector in &self.detectors {
            detector.reset();
        }
        *self.stats.lock() = DetectorStats::default();
    }

    pub fn get_stats(&self) -> DetectorSetStats {
        DetectorSetStats {
            counters: self.stats.lock().clone(),
            enabled: self.is_enabled(),
            detectors: self.detectors.iter().map(|d| d.name()).collect(),
        }
    }
}
