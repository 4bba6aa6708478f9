//! Running counters over the captured record stream.

use crate::record::{PacketRecord, Protocol};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Count plus the insertion sequence of the key, so top-N output is
/// deterministic: ties break toward the key seen first.
#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    first_seen: u64,
}

#[derive(Default)]
struct StatsInner {
    total: u64,
    tcp: u64,
    udp: u64,
    icmp: u64,
    dns: u64,
    other: u64,
    src_ips: HashMap<String, Counter>,
    dst_ips: HashMap<String, Counter>,
    ports: HashMap<u16, Counter>,
    connections: HashMap<String, Counter>,
    /// Monotonic insertion sequence shared by all counter maps.
    seq: u64,
}

/// One key's share of a top-N breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

/// One port's share of a top-N breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct PortCount {
    pub port: u16,
    pub count: u64,
}

/// Summary returned when a capture session stops.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStats {
    pub total_packets: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    pub dns_packets: u64,
    pub other_packets: u64,
    pub top_src_ips: Vec<KeyCount>,
    pub top_dst_ips: Vec<KeyCount>,
    pub top_ports: Vec<PortCount>,
    pub capture_duration: f64,
}

/// Count and percentage share for one protocol.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProtocolSlice {
    pub count: u64,
    pub percentage: f64,
}

/// Per-protocol distribution of the capture so far.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolBreakdown {
    pub tcp: ProtocolSlice,
    pub udp: ProtocolSlice,
    pub icmp: ProtocolSlice,
    pub dns: ProtocolSlice,
    pub other: ProtocolSlice,
}

/// Thread-safe aggregator updated once per parsed record by the capture
/// thread and read concurrently by the status/stats surfaces.
pub struct StatsAggregator {
    inner: Mutex<StatsInner>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner::default()),
        }
    }

    pub fn update(&self, record: &PacketRecord) {
        let mut inner = self.inner.lock();
        let seq = inner.seq;
        inner.seq += 1;

        bump(&mut inner.src_ips, record.src_ip.clone(), seq);
        bump(&mut inner.dst_ips, record.dst_ip.clone(), seq);
        bump(
            &mut inner.connections,
            format!("{}->{}", record.src_ip, record.dst_ip),
            seq,
        );

        // Both endpoints' ports are counted independently.
        if let Some(port) = record.src_port {
            bump(&mut inner.ports, port, seq);
        }
        if let Some(port) = record.dst_port {
            bump(&mut inner.ports, port, seq);
        }

        match record.protocol {
            Protocol::Tcp => inner.tcp += 1,
            Protocol::Udp => inner.udp += 1,
            Protocol::Icmp => inner.icmp += 1,
            Protocol::Dns => inner.dns += 1,
            Protocol::Unknown => inner.other += 1,
        }
        inner.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }

    /// Top-N summary of the session so far.
    pub fn summary(&self, duration_secs: f64) -> CaptureStats {
        let inner = self.inner.lock();

        CaptureStats {
            total_packets: inner.total,
            tcp_packets: inner.tcp,
            udp_packets: inner.udp,
            icmp_packets: inner.icmp,
            dns_packets: inner.dns,
            other_packets: inner.other,
            top_src_ips: top_n(&inner.src_ips, 10)
                .into_iter()
                .map(|(key, count)| KeyCount { key, count })
                .collect(),
            top_dst_ips: top_n(&inner.dst_ips, 10)
                .into_iter()
                .map(|(key, count)| KeyCount { key, count })
                .collect(),
            top_ports: top_n(&inner.ports, 10)
                .into_iter()
                .map(|(port, count)| PortCount { port, count })
                .collect(),
            capture_duration: duration_secs,
        }
    }

    /// Per-protocol counts and percentages. An empty capture yields 0.0%
    /// for every protocol rather than a division error.
    pub fn protocol_breakdown(&self) -> ProtocolBreakdown {
        let inner = self.inner.lock();
        let divisor = inner.total.max(1) as f64;
        let slice = |count: u64| ProtocolSlice {
            count,
            percentage: count as f64 / divisor * 100.0,
        };

        ProtocolBreakdown {
            tcp: slice(inner.tcp),
            udp: slice(inner.udp),
            icmp: slice(inner.icmp),
            dns: slice(inner.dns),
            other: slice(inner.other),
        }
    }

    /// Ordered connection-pair counters (`"src->dst"`), busiest first.
    pub fn top_connections(&self, limit: usize) -> Vec<KeyCount> {
        let inner = self.inner.lock();
        top_n(&inner.connections, limit)
            .into_iter()
            .map(|(key, count)| KeyCount { key, count })
            .collect()
    }

    pub fn reset(&self) {
        *self.inner.lock() = StatsInner::default();
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn bump<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Counter>, key: K, seq: u64) {
    map.entry(key)
        .or_insert(Counter { count: 0, first_seen: seq })
        .count += 1;
}

/// Descending by count; ties break toward the first-seen key so output is
/// stable across runs.
fn top_n<K: Clone>(map: &HashMap<K, Counter>, limit: usize) -> Vec<(K, u64)> {
    let mut entries: Vec<(&K, &Counter)> = map.iter().collect();
    entries.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });
    entries
        .into_iter()
        .take(limit)
        .map(|(k, c)| (k.clone(), c.count))
        .collect()
}
