//! Minimal DNS wire-format decoding.
//!
//! Decodes just enough of a UDP DNS payload for the analyzer: header flags,
//! the first question's name and type, and (for responses) the rcode plus
//! address/name answers. Anything malformed or truncated yields `None` —
//! a bad DNS payload never aborts packet processing.

/// Decoded view of one DNS message.
#[derive(Debug, Clone)]
pub struct DnsMessage {
    pub is_response: bool,
    pub qname: String,
    pub qtype: u16,
    pub rcode: u8,
    pub answers: Vec<String>,
    pub ttl: Option<u32>,
}

const HEADER_LEN: usize = 12;

fn read_u16(payload: &[u8], idx: usize) -> Option<u16> {
    Some(u16::from_be_bytes([
        *payload.get(idx)?,
        *payload.get(idx + 1)?,
    ]))
}

fn read_u32(payload: &[u8], idx: usize) -> Option<u32> {
    Some(u32::from_be_bytes([
        *payload.get(idx)?,
        *payload.get(idx + 1)?,
        *payload.get(idx + 2)?,
        *payload.get(idx + 3)?,
    ]))
}

/// Walks the dot-separated labels of a name starting at `idx`.
///
/// Returns the decoded name and the index just past it. A compression
/// pointer terminates the walk: the pointed-to labels are resolved (bounded
/// to guard against pointer loops) and the cursor advances past the two
/// pointer bytes.
fn read_name(payload: &[u8], mut idx: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut jumps = 0;
    let mut end = None;

    loop {
        let len = *payload.get(idx)? as usize;
        if len == 0 {
            idx += 1;
            break;
        }
        if len & 0xc0 == 0xc0 {
            // Compression pointer: follow it, remembering where the
            // original cursor resumes.
            let target = (read_u16(payload, idx)? & 0x3fff) as usize;
            if end.is_none() {
                end = Some(idx + 2);
            }
            jumps += 1;
            if jumps > 8 {
                return None;
            }
            idx = target;
            continue;
        }
        if idx + 1 + len > payload.len() {
            return None;
        }
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(&payload[idx + 1..idx + 1 + len]));
        idx += 1 + len;
    }

    Some((name, end.unwrap_or(idx)))
}

/// Decodes a DNS message from a UDP payload. Returns `None` when the
/// payload is too short, carries no question, or is otherwise malformed.
pub fn parse_message(payload: &[u8]) -> Option<DnsMessage> {
    if payload.len() < HEADER_LEN {
        return None;
    }

    let flags = read_u16(payload, 2)?;
    let is_response = flags & 0x8000 != 0;
    let rcode = (flags & 0x000f) as u8;
    let qdcount = read_u16(payload, 4)?;
    let ancount = read_u16(payload, 6)?;

    if qdcount == 0 {
        return None;
    }

    let (qname, after_name) = read_name(payload, HEADER_LEN)?;
    if qname.is_empty() {
        return None;
    }
    let qtype = read_u16(payload, after_name)?;
    // Skip qclass.
    let mut idx = after_name + 4;

    let mut answers = Vec::new();
    let mut ttl = None;

    if is_response {
        for _ in 0..ancount {
            let (_, after_owner) = match read_name(payload, idx) {
                Some(parsed) => parsed,
                None => break,
            };
            let rtype = match read_u16(payload, after_owner) {
                Some(t) => t,
                None => break,
            };
            let record_ttl = match read_u32(payload, after_owner + 4) {
                Some(t) => t,
                None => break,
            };
            let rdlength = match read_u16(payload, after_owner + 8) {
                Some(l) => l as usize,
                None => break,
            };
            let rdata_start = after_owner + 10;
            if rdata_start + rdlength > payload.len() {
                break;
            }
            let rdata = &payload[rdata_start..rdata_start + rdlength];

            if ttl.is_none() {
                ttl = Some(record_ttl);
            }

            match rtype {
                // A
                1 if rdlength == 4 => {
                    let ip = std::net::Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]);
                    answers.push(ip.to_string());
                }
                // AAAA
                28 if rdlength == 16 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(rdata);
                    answers.push(std::net::Ipv6Addr::from(octets).to_string());
                }
                // NS / CNAME / PTR carry a name in rdata.
                2 | 5 | 12 => {
                    if let Some((target, _)) = read_name(payload, rdata_start) {
                        answers.push(target);
                    }
                }
                // TXT: length-prefixed character strings.
                16 => {
                    if let Some(&txt_len) = rdata.first() {
                        let txt_len = txt_len as usize;
                        if 1 + txt_len <= rdata.len() {
                            answers.push(
                                String::from_utf8_lossy(&rdata[1..1 + txt_len]).into_owned(),
                            );
                        }
                    }
                }
                _ => {}
            }

            idx = rdata_start + rdlength;
        }
    }

    Some(DnsMessage {
        is_response,
        qname,
        qtype,
        rcode,
        answers,
        ttl,
    })
}

/// Human-readable record type name, `TYPE{n}` for anything unmapped.
pub fn type_name(qtype: u16) -> String {
    match qtype {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        6 => "SOA".to_string(),
        10 => "NULL".to_string(),
        12 => "PTR".to_string(),
        15 => "MX".to_string(),
        16 => "TXT".to_string(),
        28 => "AAAA".to_string(),
        33 => "SRV".to_string(),
        35 => "NAPTR".to_string(),
        43 => "DS".to_string(),
        46 => "RRSIG".to_string(),
        47 => "NSEC".to_string(),
        48 => "DNSKEY".to_string(),
        255 => "ANY".to_string(),
        256 => "URI".to_string(),
        other => format!("TYPE{}", other),
    }
}

/// Human-readable response code, `RCODE{n}` for anything unmapped.
pub fn rcode_name(rcode: u8) -> String {
    match rcode {
        0 => "NOERROR".to_string(),
        1 => "FORMERR".to_string(),
        2 => "SERVFAIL".to_string(),
        3 => "NXDOMAIN".to_string(),
        4 => "NOTIMP".to_string(),
        5 => "REFUSED".to_string(),
        other => format!("RCODE{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a DNS query payload for `labels` with the given qtype.
    fn build_query(labels: &[&str], qtype: u16) -> Vec<u8> {
        let mut payload = vec![
            0x12, 0x34, // id
            0x01, 0x00, // flags: standard query, RD
            0x00, 0x01, // qdcount
            0x00, 0x00, // ancount
            0x00, 0x00, // nscount
            0x00, 0x00, // arcount
        ];
        for label in labels {
            payload.push(label.len() as u8);
            payload.extend_from_slice(label.as_bytes());
        }
        payload.push(0);
        payload.extend_from_slice(&qtype.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes()); // qclass IN
        payload
    }

    /// Appends one A-record answer (compression pointer to the question name).
    fn with_a_answer(mut payload: Vec<u8>, ip: [u8; 4], ttl: u32) -> Vec<u8> {
        payload[2] = 0x81; // QR + RD
        payload[3] = 0x80; // RA, rcode 0
        payload[7] = 0x01; // ancount = 1
        payload.extend_from_slice(&[0xc0, 0x0c]); // pointer to offset 12
        payload.extend_from_slice(&1u16.to_be_bytes()); // type A
        payload.extend_from_slice(&1u16.to_be_bytes()); // class IN
        payload.extend_from_slice(&ttl.to_be_bytes());
        payload.extend_from_slice(&4u16.to_be_bytes()); // rdlength
        payload.extend_from_slice(&ip);
        payload
    }

    #[test]
    fn decodes_query_name_and_type() {
        let payload = build_query(&["mail", "example", "com"], 16);
        let msg = parse_message(&payload).unwrap();
        assert!(!msg.is_response);
        assert_eq!(msg.qname, "mail.example.com");
        assert_eq!(msg.qtype, 16);
        assert!(msg.answers.is_empty());
    }

    #[test]
    fn decodes_response_with_a_answer() {
        let payload = with_a_answer(build_query(&["example", "com"], 1), [93, 184, 216, 34], 300);
        let msg = parse_message(&payload).unwrap();
        assert!(msg.is_response);
        assert_eq!(msg.rcode, 0);
        assert_eq!(msg.answers, vec!["93.184.216.34".to_string()]);
        assert_eq!(msg.ttl, Some(300));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let payload = build_query(&["example", "com"], 1);
        assert!(parse_message(&payload[..8]).is_none());
        assert!(parse_message(&payload[..payload.len() - 3]).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_message(&[0xff; 6]).is_none());
    }

    #[test]
    fn type_and_rcode_names_fall_back_to_numeric() {
        assert_eq!(type_name(1), "A");
        assert_eq!(type_name(999), "TYPE999");
        assert_eq!(rcode_name(3), "NXDOMAIN");
        assert_eq!(rcode_name(9), "RCODE9");
    }
}
