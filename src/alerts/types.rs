use crate::record::PacketRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Alert severity levels, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "LOW"),
            AlertSeverity::Medium => write!(f, "MEDIUM"),
            AlertSeverity::High => write!(f, "HIGH"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Alert categories produced by the detectors and the DNS analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DnsTunneling,
    DnsUnusual,
    PortScan,
    HighTraffic,
    UnencryptedData,
    UnusualPort,
    Custom,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::DnsTunneling => write!(f, "dns_tunneling"),
            AlertType::DnsUnusual => write!(f, "dns_unusual"),
            AlertType::PortScan => write!(f, "port_scan"),
            AlertType::HighTraffic => write!(f, "high_traffic"),
            AlertType::UnencryptedData => write!(f, "unencrypted_data"),
            AlertType::UnusualPort => write!(f, "unusual_port"),
            AlertType::Custom => write!(f, "custom"),
        }
    }
}

/// What the alert is about. Every field is optional; detectors fill in
/// whatever the triggering record carried.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertSource {
    pub process_name: Option<String>,
    pub pid: Option<u32>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub domain: Option<String>,
}

impl AlertSource {
    /// Populates the source from the record that triggered a finding.
    pub fn from_record(record: &PacketRecord) -> Self {
        Self {
            process_name: record.process_name.clone(),
            pid: record.pid,
            src_ip: Some(record.src_ip.clone()),
            dst_ip: Some(record.dst_ip.clone()),
            src_port: record.src_port,
            dst_port: record.dst_port,
            domain: record.dns_domain.clone(),
        }
    }
}

/// A single security alert. Mutable only through acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub source: AlertSource,
    pub metadata: HashMap<String, serde_json::Value>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

/// Aggregate counters over the stored alerts.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub unacknowledged: usize,
    pub by_severity: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
    pub recent_24h: usize,
}

/// Filters for [`AlertStore::list`](crate::alerts::AlertStore::list).
/// Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub types: Option<Vec<AlertType>>,
    pub severities: Option<Vec<AlertSeverity>>,
    pub acknowledged: Option<bool>,
    /// Case-insensitive substring match against the source process name.
    pub process_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn alert_type_serializes_snake_case() {
        let json = serde_json::to_string(&AlertType::DnsTunneling).unwrap();
        assert_eq!(json, "\"dns_tunneling\"");
    }
}
