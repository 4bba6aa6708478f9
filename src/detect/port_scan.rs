//! Port scan detection: one source probing many distinct ports on one
//! destination within a short window.

use crate::alerts::types::{AlertSeverity, AlertType};
use crate::detect::config::*;
use crate::detect::{Detector, Finding};
use crate::record::{PacketRecord, Protocol};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

type PairKey = (String, String);

#[derive(Default)]
struct State {
    /// Per (src, dst) pair: time-ordered (timestamp, dst_port) observations.
    windows: HashMap<PairKey, Vec<(DateTime<Utc>, u16)>>,
    /// Per (src, dst) pair: when the last alert fired.
    cooldowns: HashMap<PairKey, DateTime<Utc>>,
}

pub struct PortScanDetector {
    threshold: usize,
    window: Duration,
    cooldown: Duration,
    state: Mutex<State>,
}

impl PortScanDetector {
    pub fn new(threshold: usize, window_secs: i64, cooldown_secs: i64) -> Self {
        Self {
            threshold,
            window: Duration::seconds(window_secs),
            cooldown: Duration::seconds(cooldown_secs),
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for PortScanDetector {
    fn default() -> Self {
        Self::new(
            PORT_SCAN_THRESHOLD,
            PORT_SCAN_WINDOW_SECS,
            PORT_SCAN_COOLDOWN_SECS,
        )
    }
}

impl Detector for PortScanDetector {
    fn name(&self) -> &'static str {
        "port_scan"
    }

    fn analyze(&self, record: &PacketRecord) -> Option<Finding> {
        // Only connection attempts count: SYN-flagged TCP, or any ported
        // UDP/ICMP record.
        let dst_port = record.dst_port?;
        match record.protocol {
            Protocol::Tcp => {
                if let Some(flags) = &record.flags {
                    if !flags.contains('S') {
                        return None;
                    }
                }
            }
            Protocol::Udp | Protocol::Icmp => {}
            Protocol::Dns | Protocol::Unknown => return None,
        }

        let key = (record.src_ip.clone(), record.dst_ip.clone());
        let now = record.timestamp;
        let mut state = self.state.lock();
        let state = &mut *state;

        let window = state.windows.entry(key.clone()).or_default();
        window.retain(|(ts, _)| now.signed_duration_since(*ts) < self.window);
        window.push((now, dst_port));

        let unique: HashSet<u16> = window.iter().map(|&(_, port)| port).collect();
        if unique.len() < self.threshold {
            return None;
        }

        if let Some(last) = state.cooldowns.get(&key) {
            if now.signed_duration_since(*last) < self.cooldown {
                return None;
            }
        }
        state.cooldowns.insert(key, now);

        let mut sample: Vec<u16> = unique.iter().copied().collect();
        sample.sort_unstable();
        sample.truncate(PORT_SCAN_SAMPLE_LIMIT);

        let mut metadata = HashMap::new();
        metadata.insert("unique_ports".into(), unique.len().into());
        metadata.insert("sample_ports".into(), serde_json::json!(sample));
        metadata.insert(
            "time_window_seconds".into(),
            self.window.num_seconds().into(),
        );
        metadata.insert("protocol".into(), record.protocol.to_string().into());

        Some(Finding {
            kind: AlertType::PortScan,
            severity: AlertSeverity::High,
            title: format!("Possible port scan from {}", record.src_ip),
            description: format!(
                "{} distinct ports probed within {}s toward {}. Sample ports: {:?}",
                unique.len(),
                self.window.num_seconds(),
                record.dst_ip,
                sample,
            ),
            metadata,
        })
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.windows.clear();
        state.cooldowns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn syn_to_port(port: u16, at: DateTime<Utc>) -> PacketRecord {
        PacketRecord {
            timestamp: at,
            src_ip: "192.168.1.50".into(),
            dst_ip: "10.0.0.1".into(),
            src_port: Some(40000),
            dst_port: Some(port),
            protocol: Protocol::Tcp,
            length: 60,
            payload_preview: None,
            flags: Some("S".into()),
            process_name: None,
            pid: None,
            dns_query_id: None,
            dns_domain: None,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn below_threshold_stays_silent_tenth_port_fires_high() {
        let detector = PortScanDetector::default();
        let t0 = base_time();

        for port in 1..=9u16 {
            assert!(detector.analyze(&syn_to_port(port, t0)).is_none());
        }

        let finding = detector.analyze(&syn_to_port(10, t0)).unwrap();
        assert_eq!(finding.kind, AlertType::PortScan);
        assert_eq!(finding.severity, AlertSeverity::High);
        assert_eq!(finding.metadata["unique_ports"], serde_json::json!(10));
    }

    #[test]
    fn cooldown_suppresses_then_expires() {
        let detector = PortScanDetector::default();
        let t0 = base_time();

        for port in 1..=10u16 {
            detector.analyze(&syn_to_port(port, t0));
        }
        // Repeat inside the cooldown: suppressed.
        assert!(detector
            .analyze(&syn_to_port(10, t0 + Duration::seconds(30)))
            .is_none());

        // After the cooldown: a fresh burst may fire again.
        let later = t0 + Duration::seconds(301);
        for port in 1..=9u16 {
            assert!(detector.analyze(&syn_to_port(port, later)).is_none());
        }
        assert!(detector.analyze(&syn_to_port(10, later)).is_some());
    }

    #[test]
    fn repeated_ports_do_not_count_as_distinct() {
        let detector = PortScanDetector::default();
        let t0 = base_time();
        for _ in 0..50 {
            assert!(detector.analyze(&syn_to_port(80, t0)).is_none());
        }
    }

    #[test]
    fn non_syn_tcp_is_ignored() {
        let detector = PortScanDetector::default();
        let t0 = base_time();
        for port in 1..=20u16 {
            let mut record = syn_to_port(port, t0);
            record.flags = Some("A".into());
            assert!(detector.analyze(&record).is_none());
        }
    }

    #[test]
    fn observations_age_out_of_the_window() {
        let detector = PortScanDetector::default();
        let t0 = base_time();
        for port in 1..=9u16 {
            detector.analyze(&syn_to_port(port, t0));
        }
        // The tenth distinct port arrives after the first nine expired.
        let late = t0 + Duration::seconds(61);
        assert!(detector.analyze(&syn_to_port(10, late)).is_none());
    }
}
