use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Transport classification of a captured frame.
///
/// UDP frames to or from port 53 are reclassified as [`Protocol::Dns`]
/// after the DNS analyzer has accepted the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Dns,
    Unknown,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Dns => write!(f, "DNS"),
            Protocol::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One decoded frame, immutable once constructed.
///
/// Created by the packet parser on the capture thread and then shared
/// read-only with every downstream consumer (stats, detectors, live queue,
/// recent-packet buffer).
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: Protocol,
    /// Wire length of the full frame in bytes.
    pub length: usize,
    /// First 50 payload bytes, hex encoded. `None` when the transport
    /// carried no payload.
    pub payload_preview: Option<String>,
    /// Compact string of set TCP flags, e.g. `"S"` or `"SA"`.
    pub flags: Option<String>,
    pub process_name: Option<String>,
    pub pid: Option<u32>,
    /// Linkage to the DNS analyzer's query history.
    pub dns_query_id: Option<String>,
    pub dns_domain: Option<String>,
}

/// 8-character hex id used for alerts and DNS query records.
pub(crate) fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_eight_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn protocol_serializes_uppercase() {
        let json = serde_json::to_string(&Protocol::Tcp).unwrap();
        assert_eq!(json, "\"TCP\"");
    }
}
