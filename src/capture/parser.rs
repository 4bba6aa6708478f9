//! Raw frame → [`PacketRecord`] decoding.
//!
//! A malformed frame yields `None` and is simply skipped; nothing on this
//! path can abort the capture loop.

use crate::dns::{wire, DnsAnalyzer};
use crate::process::ProcessLookup;
use crate::record::{PacketRecord, Protocol};
use chrono::{DateTime, Utc};
use etherparse::{InternetSlice, SlicedPacket, TcpHeaderSlice, TransportSlice};
use std::sync::Arc;

/// Payload bytes retained in the hex preview.
const PAYLOAD_PREVIEW_LEN: usize = 50;

pub struct PacketParser {
    processes: Arc<dyn ProcessLookup>,
    dns: Arc<DnsAnalyzer>,
}

impl PacketParser {
    pub fn new(processes: Arc<dyn ProcessLookup>, dns: Arc<DnsAnalyzer>) -> Self {
        Self { processes, dns }
    }

    /// Decodes one Ethernet frame. Returns `None` for frames without an
    /// IPv4 layer or with undecodable headers.
    pub fn parse(&self, frame: &[u8], now: DateTime<Utc>) -> Option<PacketRecord> {
        let sliced = SlicedPacket::from_ethernet(frame).ok()?;

        let (src_ip, dst_ip, ip_protocol) = match &sliced.ip {
            Some(InternetSlice::Ipv4(header, _)) => (
                header.source_addr().to_string(),
                header.destination_addr().to_string(),
                header.protocol(),
            ),
            _ => return None,
        };

        let mut src_port = None;
        let mut dst_port = None;
        let mut protocol = Protocol::Unknown;
        let mut flags = None;
        let mut payload_preview = None;
        let mut dns_query_id = None;
        let mut dns_domain = None;

        match &sliced.transport {
            Some(TransportSlice::Tcp(tcp)) => {
                protocol = Protocol::Tcp;
                src_port = Some(tcp.source_port());
                dst_port = Some(tcp.destination_port());
                flags = Some(flag_string(tcp));
                payload_preview = preview(sliced.payload);
            }
            Some(TransportSlice::Udp(udp)) => {
                protocol = Protocol::Udp;
                src_port = Some(udp.source_port());
                dst_port = Some(udp.destination_port());
                payload_preview = preview(sliced.payload);
            }
            _ => {
                if ip_protocol == 1 {
                    protocol = Protocol::Icmp;
                }
            }
        }

        // Process attribution by local source port; never attempted for
        // ICMP or other portless frames.
        let attribution = src_port.and_then(|port| self.processes.lookup(port));

        // UDP traffic on port 53 is handed to the DNS analyzer; its query
        // record id links the packet to the DNS history.
        if protocol == Protocol::Udp
            && (src_port == Some(53) || dst_port == Some(53))
        {
            if let Some(msg) = wire::parse_message(sliced.payload) {
                let query = self
                    .dns
                    .process(&msg, &src_ip, &dst_ip, attribution.as_ref());
                protocol = Protocol::Dns;
                dns_domain = Some(query.domain.clone());
                dns_query_id = Some(query.id);
            }
        }

        Some(PacketRecord {
            timestamp: now,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            length: frame.len(),
            payload_preview,
            flags,
            process_name: attribution.as_ref().map(|p| p.name.clone()),
            pid: attribution.map(|p| p.pid),
            dns_query_id,
            dns_domain,
        })
    }
}

/// Compact set-flag letters in FSRPAUECN order, e.g. `"S"` or `"SA"`.
fn flag_string(tcp: &TcpHeaderSlice) -> String {
    let mut flags = String::new();
    if tcp.fin() {
        flags.push('F');
    }
    if tcp.syn() {
        flags.push('S');
    }
    if tcp.rst() {
        flags.push('R');
    }
    if tcp.psh() {
        flags.push('P');
    }
    if tcp.ack() {
        flags.push('A');
    }
    if tcp.urg() {
        flags.push('U');
    }
    if tcp.ece() {
        flags.push('E');
    }
    if tcp.cwr() {
        flags.push('C');
    }
    if tcp.ns() {
        flags.push('N');
    }
    flags
}

fn preview(payload: &[u8]) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    Some(hex::encode(&payload[..payload.len().min(PAYLOAD_PREVIEW_LEN)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStore;
    use crate::clock::ManualClock;
    use crate::logger::Logger;
    use crate::process::{ProcessInfo, ProcessTable};
    use chrono::TimeZone;
    use etherparse::PacketBuilder;

    fn make_parser() -> (PacketParser, Arc<ProcessTable>, Arc<DnsAnalyzer>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let logger = Arc::new(Logger::new(false, None).unwrap());
        let alerts = Arc::new(AlertStore::new(1000, clock.clone(), logger.clone()));
        let dns = Arc::new(DnsAnalyzer::new(clock, alerts, logger));
        let processes = Arc::new(ProcessTable::new());
        (
            PacketParser::new(processes.clone(), dns.clone()),
            processes,
            dns,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn tcp_syn_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 10], [10, 0, 0, 1], 64)
            .tcp(50123, 80, 1000, 64000)
            .syn();
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 10], [8, 8, 8, 8], 64)
            .udp(src_port, dst_port);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    /// Raw DNS query payload for `example.com`, type A.
    fn dns_query_payload() -> Vec<u8> {
        let mut payload = vec![
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        payload.push(7);
        payload.extend_from_slice(b"example");
        payload.push(3);
        payload.extend_from_slice(b"com");
        payload.push(0);
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload
    }

    #[test]
    fn tcp_syn_round_trips_with_flags_and_ports() {
        let (parser, _, _) = make_parser();
        let record = parser.parse(&tcp_syn_frame(b""), now()).unwrap();

        assert_eq!(record.protocol, Protocol::Tcp);
        assert_eq!(record.src_ip, "192.168.1.10");
        assert_eq!(record.dst_ip, "10.0.0.1");
        assert_eq!(record.src_port, Some(50123));
        assert_eq!(record.dst_port, Some(80));
        assert_eq!(record.flags.as_deref(), Some("S"));
        assert!(record.payload_preview.is_none());
    }

    #[test]
    fn payload_preview_is_truncated_hex() {
        let (parser, _, _) = make_parser();
        let payload = [0xabu8; 80];
        let record = parser.parse(&tcp_syn_frame(&payload), now()).unwrap();

        let preview = record.payload_preview.unwrap();
        assert_eq!(preview.len(), PAYLOAD_PREVIEW_LEN * 2);
        assert!(preview.starts_with("abab"));
    }

    #[test]
    fn garbage_frame_is_dropped() {
        let (parser, _, _) = make_parser();
        assert!(parser.parse(&[0u8; 10], now()).is_none());
        assert!(parser.parse(&[], now()).is_none());
    }

    #[test]
    fn udp_port_53_becomes_dns_with_linkage() {
        let (parser, _, dns) = make_parser();
        let frame = udp_frame(51000, 53, &dns_query_payload());
        let record = parser.parse(&frame, now()).unwrap();

        assert_eq!(record.protocol, Protocol::Dns);
        assert_eq!(record.dns_domain.as_deref(), Some("example.com"));
        let query_id = record.dns_query_id.unwrap();
        assert!(dns.get_query_by_id(&query_id).is_some());
    }

    #[test]
    fn udp_port_53_with_non_dns_payload_stays_udp() {
        let (parser, _, _) = make_parser();
        let frame = udp_frame(51000, 53, b"nx");
        let record = parser.parse(&frame, now()).unwrap();

        assert_eq!(record.protocol, Protocol::Udp);
        assert!(record.dns_query_id.is_none());
    }

    #[test]
    fn source_port_attributes_process() {
        let (parser, processes, _) = make_parser();
        processes.insert(50123, ProcessInfo { pid: 4321, name: "curl".into() });

        let record = parser.parse(&tcp_syn_frame(b""), now()).unwrap();
        assert_eq!(record.process_name.as_deref(), Some("curl"));
        assert_eq!(record.pid, Some(4321));
    }

    #[test]
    fn unknown_source_port_leaves_attribution_empty() {
        let (parser, _, _) = make_parser();
        let record = parser.parse(&tcp_syn_frame(b""), now()).unwrap();
        assert!(record.process_name.is_none());
        assert!(record.pid.is_none());
    }
}
