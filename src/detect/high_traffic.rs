//! Traffic-surge detection: packet volume per endpoint IP over a sliding
//! window, with severity escalating as the volume climbs past multiples of
//! the threshold.

use crate::alerts::types::{AlertSeverity, AlertType};
use crate::detect::config::*;
use crate::detect::{Detector, Finding};
use crate::record::PacketRecord;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    /// Per IP: time-ordered (timestamp, wire length) observations.
    windows: HashMap<String, Vec<(DateTime<Utc>, usize)>>,
    cooldowns: HashMap<String, DateTime<Utc>>,
}

pub struct HighTrafficDetector {
    threshold: usize,
    window: Duration,
    cooldown: Duration,
    state: Mutex<State>,
}

impl HighTrafficDetector {
    pub fn new(threshold: usize, window_secs: i64, cooldown_secs: i64) -> Self {
        Self {
            threshold,
            window: Duration::seconds(window_secs),
            cooldown: Duration::seconds(cooldown_secs),
            state: Mutex::new(State::default()),
        }
    }

    fn severity_for(&self, packets: usize) -> AlertSeverity {
        if packets > self.threshold * 3 {
            AlertSeverity::Critical
        } else if packets > self.threshold * 2 {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        }
    }
}

impl Default for HighTrafficDetector {
    fn default() -> Self {
        Self::new(
            HIGH_TRAFFIC_THRESHOLD,
            HIGH_TRAFFIC_WINDOW_SECS,
            HIGH_TRAFFIC_COOLDOWN_SECS,
        )
    }
}

impl Detector for HighTrafficDetector {
    fn name(&self) -> &'static str {
        "high_traffic"
    }

    fn analyze(&self, record: &PacketRecord) -> Option<Finding> {
        let now = record.timestamp;
        let mut state = self.state.lock();
        let state = &mut *state;

        // A record is traffic for both of its endpoints; update both windows
        // before evaluating either so neither key misses an observation.
        for ip in [&record.src_ip, &record.dst_ip] {
            let window = state.windows.entry(ip.clone()).or_default();
            window.retain(|(ts, _)| now.signed_duration_since(*ts) < self.window);
            window.push((now, record.length));
        }

        for ip in [&record.src_ip, &record.dst_ip] {
            let window = match state.windows.get(ip) {
                Some(w) => w,
                None => continue,
            };
            let packets = window.len();
            if packets < self.threshold {
                continue;
            }
            let bytes: usize = window.iter().map(|&(_, len)| len).sum();

            if let Some(last) = state.cooldowns.get(ip) {
                if now.signed_duration_since(*last) < self.cooldown {
                    continue;
                }
            }
            state.cooldowns.insert(ip.clone(), now);

            let outbound = ip == &record.src_ip;
            let direction = if outbound { "outbound from" } else { "inbound to" };

            let mut metadata = HashMap::new();
            metadata.insert("ip".into(), ip.as_str().into());
            metadata.insert(
                "direction".into(),
                if outbound { "outbound" } else { "inbound" }.into(),
            );
            metadata.insert("packet_count".into(), packets.into());
            metadata.insert("total_bytes".into(), bytes.into());
            metadata.insert(
                "packets_per_second".into(),
                (packets as f64 / self.window.num_seconds() as f64).into(),
            );

            return Some(Finding {
                kind: AlertType::HighTraffic,
                severity: self.severity_for(packets),
                title: format!("High traffic volume {} {}", direction, ip),
                description: format!(
                    "{} packets ({} bytes) observed in the last {}s. This may \
                     indicate a DDoS attack, data exfiltration or a bulk transfer.",
                    packets,
                    bytes,
                    self.window.num_seconds(),
                ),
                metadata,
            });
        }

        None
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.windows.clear();
        state.cooldowns.clear();
    }
}
