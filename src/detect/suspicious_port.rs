//! Known-bad port detection: connections touching ports associated with
//! malware defaults, anonymization proxies or legacy insecure services.

use crate::alerts::types::{AlertSeverity, AlertType};
use crate::detect::config::SUSPICIOUS_PORT_COOLDOWN_SECS;
use crate::detect::{Detector, Finding};
use crate::record::PacketRecord;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Port → reason table. Severity is HIGH for the remote-access trojan
/// defaults, MEDIUM for the rest.
const SUSPICIOUS_PORTS: [(u16, &str); 13] = [
    (4444, "Metasploit default handler"),
    (5555, "Android ADB remote"),
    (6666, "IRC botnet"),
    (6667, "IRC (possible botnet)"),
    (31337, "Back Orifice"),
    (12345, "NetBus"),
    (27374, "SubSeven"),
    (1080, "SOCKS proxy (possible C2)"),
    (9001, "Tor relay"),
    (9050, "Tor SOCKS"),
    (23, "Telnet (insecure)"),
    (513, "rlogin (insecure)"),
    (514, "rsh (insecure)"),
];

const HIGH_SEVERITY_PORTS: [u16; 4] = [4444, 31337, 27374, 12345];

fn port_reason(port: u16) -> Option<&'static str> {
    SUSPICIOUS_PORTS
        .iter()
        .find(|&&(p, _)| p == port)
        .map(|&(_, reason)| reason)
}

pub struct SuspiciousPortDetector {
    cooldown: Duration,
    cooldowns: Mutex<HashMap<(String, u16), DateTime<Utc>>>,
}

impl SuspiciousPortDetector {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SuspiciousPortDetector {
    fn default() -> Self {
        Self::new(SUSPICIOUS_PORT_COOLDOWN_SECS)
    }
}

impl Detector for SuspiciousPortDetector {
    fn name(&self) -> &'static str {
        "suspicious_port"
    }

    fn analyze(&self, record: &PacketRecord) -> Option<Finding> {
        for port in [record.src_port, record.dst_port].into_iter().flatten() {
            let reason = match port_reason(port) {
                Some(r) => r,
                None => continue,
            };

            let outgoing = record.dst_port == Some(port);
            let remote_ip = if outgoing { &record.dst_ip } else { &record.src_ip };

            let key = (remote_ip.clone(), port);
            let now = record.timestamp;
            {
                let mut cooldowns = self.cooldowns.lock();
                if let Some(last) = cooldowns.get(&key) {
                    if now.signed_duration_since(*last) < self.cooldown {
                        return None;
                    }
                }
                cooldowns.insert(key, now);
            }

            let severity = if HIGH_SEVERITY_PORTS.contains(&port) {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };

            let mut metadata = HashMap::new();
            metadata.insert("port".into(), port.into());
            metadata.insert("reason".into(), reason.into());
            metadata.insert(
                "direction".into(),
                if outgoing { "outbound" } else { "inbound" }.into(),
            );
            metadata.insert("remote_ip".into(), remote_ip.as_str().into());
            if let Some(name) = &record.process_name {
                metadata.insert("process".into(), name.as_str().into());
            }
            if let Some(pid) = record.pid {
                metadata.insert("pid".into(), pid.into());
            }

            return Some(Finding {
                kind: AlertType::UnusualPort,
                severity,
                title: format!("Connection on suspicious port {}", port),
                description: format!(
                    "{} connection on port {} ({}). Remote endpoint: {}. Process: {}.",
                    if outgoing { "Outbound" } else { "Inbound" },
                    port,
                    reason,
                    remote_ip,
                    record.process_name.as_deref().unwrap_or("unknown"),
                ),
                metadata,
            });
        }

        None
    }

    fn reset(&self) {
        self.cooldowns.lock().clear();
    }
}
