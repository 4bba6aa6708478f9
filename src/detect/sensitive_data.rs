//! Cleartext credential detection: scans payload previews of traffic on
//! known-unencrypted ports for credential-shaped byte patterns.

use crate::alerts::types::{AlertSeverity, AlertType};
use crate::detect::config::SENSITIVE_DATA_COOLDOWN_SECS;
use crate::detect::{Detector, Finding};
use crate::record::PacketRecord;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Ports carrying protocols that transmit in cleartext.
const CLEARTEXT_PORTS: [u16; 9] = [80, 21, 23, 25, 110, 143, 8080, 8000, 3000];

/// Byte patterns scanned in order; the first match wins.
const SENSITIVE_PATTERNS: [(&[u8], &str); 10] = [
    (b"password", "Possible cleartext password"),
    (b"passwd", "Possible cleartext password"),
    (b"pwd=", "Possible cleartext password"),
    (b"token=", "Exposed authentication token"),
    (b"api_key", "Exposed API key"),
    (b"apikey", "Exposed API key"),
    (b"secret", "Exposed secret"),
    (b"authorization:", "Authorization header"),
    (b"bearer ", "Exposed bearer token"),
    (b"basic ", "Basic auth credentials"),
];

fn is_cleartext_port(port: Option<u16>) -> bool {
    matches!(port, Some(p) if CLEARTEXT_PORTS.contains(&p))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

pub struct SensitiveDataDetector {
    cooldown: Duration,
    cooldowns: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl SensitiveDataDetector {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SensitiveDataDetector {
    fn default() -> Self {
        Self::new(SENSITIVE_DATA_COOLDOWN_SECS)
    }
}

impl Detector for SensitiveDataDetector {
    fn name(&self) -> &'static str {
        "sensitive_data"
    }

    fn analyze(&self, record: &PacketRecord) -> Option<Finding> {
        if !is_cleartext_port(record.dst_port) && !is_cleartext_port(record.src_port) {
            return None;
        }

        let preview = record.payload_preview.as_deref()?;
        let payload = hex::decode(preview).ok()?;
        let payload = payload.to_ascii_lowercase();

        let (pattern, description) = SENSITIVE_PATTERNS
            .iter()
            .find(|(pattern, _)| contains(&payload, pattern))?;

        let key = (record.src_ip.clone(), record.dst_ip.clone());
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

        let port = record.dst_port.or(record.src_port).unwrap_or_default();

        let mut metadata = HashMap::new();
        metadata.insert(
            "pattern_found".into(),
            String::from_utf8_lossy(pattern).into_owned().into(),
        );
        metadata.insert("port".into(), port.into());
        metadata.insert("protocol".into(), record.protocol.to_string().into());
        if let Some(name) = &record.process_name {
            metadata.insert("process".into(), name.as_str().into());
        }

        Some(Finding {
            kind: AlertType::UnencryptedData,
            severity: AlertSeverity::High,
            title: format!("Sensitive data on unencrypted traffic (port {})", port),
            description: format!(
                "{} detected on connection {} -> {}. Traffic on port {} is not \
                 encrypted, exposing this data in transit.",
                description, record.src_ip, record.dst_ip, port,
            ),
            metadata,
        })
    }

    fn reset(&self) {
        self.cooldowns.lock().clear();
    }
}
