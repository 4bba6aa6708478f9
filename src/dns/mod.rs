//! DNS query tracking and tunneling detection.
//!
//! Every port-53 UDP payload the parser accepts lands here. The analyzer
//! derives per-query metrics (length, subdomain count, entropy), flags
//! suspicious queries, raises tunneling alerts under a per-domain cooldown,
//! watches the aggregate query rate, and keeps a bounded history for the
//! query/stats surfaces.

pub mod wire;

pub use wire::DnsMessage;

use crate::alerts::types::{AlertSeverity, AlertSource, AlertType};
use crate::alerts::AlertStore;
use crate::clock::SharedClock;
use crate::logger::{Event, SharedLogger};
use crate::process::ProcessInfo;
use crate::record::short_id;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Query length above which a domain counts as abnormally long.
const MAX_QUERY_LENGTH: usize = 50;
/// Subdomain count above which a domain counts as abnormally deep.
const MAX_SUBDOMAINS: usize = 4;
/// Entropy (bits) above which the longest label counts as encoded-looking.
const HIGH_ENTROPY_THRESHOLD: f64 = 3.5;
/// Record types commonly abused for tunneling payloads.
const SUSPICIOUS_TYPES: [&str; 3] = ["TXT", "NULL", "CNAME"];
/// Queries per minute above which the aggregate rate counts as unusual.
const QUERIES_PER_MINUTE_THRESHOLD: usize = 60;
/// Minimum time between two tunneling alerts for the same domain.
const TUNNELING_COOLDOWN_SECS: i64 = 60;
/// Retained query history cap; the oldest 20% are dropped on overflow.
const MAX_QUERIES: usize = 5000;

// ── Models ───────────────────────────────────────────────────────────────────

/// One processed DNS query with its derived tunneling metrics.
#[derive(Debug, Clone, Serialize)]
pub struct DnsQueryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub record_type: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub process_name: Option<String>,
    pub pid: Option<u32>,
    pub length: usize,
    pub subdomain_count: usize,
    pub entropy: f64,
    pub is_suspicious: bool,
    pub suspicion_reasons: Vec<String>,
}

/// The response half of a resolved query.
#[derive(Debug, Clone, Serialize)]
pub struct DnsResponseRecord {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub response_code: String,
    pub answers: Vec<String>,
    pub ttl: Option<u32>,
}

/// A query paired with its optional response.
#[derive(Debug, Clone, Serialize)]
pub struct DnsRecord {
    pub query: DnsQueryRecord,
    pub response: Option<DnsResponseRecord>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessCount {
    pub process: String,
    pub count: u64,
}

/// Aggregate view over the retained query history.
#[derive(Debug, Clone, Serialize)]
pub struct DnsStats {
    pub total_queries: usize,
    pub unique_domains: usize,
    pub queries_by_type: HashMap<String, u64>,
    pub top_domains: Vec<DomainCount>,
    pub top_processes: Vec<ProcessCount>,
    pub suspicious_queries: usize,
    pub failed_queries: usize,
    pub queries_per_minute: f64,
}

/// Per-process DNS activity. Zeroed for a process with no recorded queries.
#[derive(Debug, Clone, Serialize)]
pub struct DnsProcessStats {
    pub process_name: String,
    pub pid: Option<u32>,
    pub total_queries: usize,
    pub unique_domains: usize,
    pub domains: Vec<String>,
    pub suspicious_count: usize,
    pub last_query: Option<DateTime<Utc>>,
}

/// Global tunneling posture over the retained history.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelingIndicators {
    pub long_queries: usize,
    pub high_entropy_queries: usize,
    pub many_subdomains: usize,
    pub unusual_types: usize,
    pub high_frequency: bool,
    /// 0–100 weighted likelihood of tunneling activity.
    pub score: f64,
}

/// Filters for [`DnsAnalyzer::get_queries`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DnsQueryFilter {
    pub limit: Option<usize>,
    /// Case-insensitive substring match against the attributed process.
    pub process_name: Option<String>,
    pub suspicious_only: bool,
    /// Case-insensitive substring match against the domain.
    pub domain: Option<String>,
}

// ── Metric helpers ───────────────────────────────────────────────────────────

/// Shannon entropy (bits) of the character distribution, case-folded and
/// rounded to two decimals.
pub fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    let mut len = 0usize;
    for c in text.to_lowercase().chars() {
        *freq.entry(c).or_default() += 1;
        len += 1;
    }

    let len = len as f64;
    let mut entropy = 0.0;
    for &count in freq.values() {
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }

    (entropy * 100.0).round() / 100.0
}

/// Number of dot-separated labels below the registrable domain. Never
/// negative: `"example.com"` → 0, `"a.b.example.com"` → 2.
pub fn subdomain_count(domain: &str) -> usize {
    domain
        .trim_end_matches('.')
        .split('.')
        .count()
        .saturating_sub(2)
}

/// The longest dot-separated label — the one most likely to carry encoded
/// payload. Ties go to the first occurrence.
fn longest_label(domain: &str) -> &str {
    let mut longest = "";
    for label in domain.split('.') {
        if label.len() > longest.len() {
            longest = label;
        }
    }
    longest
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    queries: HashMap<String, DnsRecord>,
    /// Timestamps of every processed query inside the rate window.
    query_times: Vec<DateTime<Utc>>,
    /// Per lowercased domain: when the last tunneling alert fired.
    cooldowns: HashMap<String, DateTime<Utc>>,
}

pub struct DnsAnalyzer {
    state: Mutex<State>,
    max_queries: usize,
    clock: SharedClock,
    alerts: Arc<AlertStore>,
    logger: SharedLogger,
}

impl DnsAnalyzer {
    pub fn new(clock: SharedClock, alerts: Arc<AlertStore>, logger: SharedLogger) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_queries: MAX_QUERIES,
            clock,
            alerts,
            logger,
        }
    }

    /// Processes one decoded DNS message and returns the query record that
    /// was added to the history. Raises tunneling and rate alerts as side
    /// effects.
    pub fn process(
        &self,
        msg: &DnsMessage,
        src_ip: &str,
        dst_ip: &str,
        attribution: Option<&ProcessInfo>,
    ) -> DnsQueryRecord {
        let now = self.clock.now();
        let domain = msg.qname.trim_end_matches('.').to_string();
        let record_type = wire::type_name(msg.qtype);

        let mut query = DnsQueryRecord {
            id: short_id(),
            timestamp: now,
            length: domain.len(),
            subdomain_count: subdomain_count(&domain),
            entropy: shannon_entropy(longest_label(&domain)),
            domain,
            record_type,
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
            process_name: attribution.map(|p| p.name.clone()),
            pid: attribution.map(|p| p.pid),
            is_suspicious: false,
            suspicion_reasons: Vec::new(),
        };

        let reasons = self.check_tunneling(&query);
        if !reasons.is_empty() {
            query.is_suspicious = true;
            query.suspicion_reasons = reasons.clone();
            self.raise_tunneling_alert(&query, &reasons, now);
        }

        self.logger.log(&Event::DnsQuery {
            src: &query.src_ip,
            domain: &query.domain,
            suspicious: query.is_suspicious,
        });

        let mut record = DnsRecord {
            query: query.clone(),
            response: None,
            resolved: false,
        };
        if msg.is_response {
            record.response = Some(DnsResponseRecord {
                query_id: query.id.clone(),
                timestamp: now,
                response_code: wire::rcode_name(msg.rcode),
                answers: msg.answers.clone(),
                ttl: msg.ttl,
            });
            record.resolved = msg.rcode == 0;
        }

        let rate_exceeded = {
            let mut state = self.state.lock();
            if state.queries.len() >= self.max_queries {
                Self::cleanup_old_queries(&mut state.queries);
            }
            state.queries.insert(query.id.clone(), record);
            state.query_times.push(now);

            let window_start = now - Duration::minutes(1);
            state.query_times.retain(|t| *t >= window_start);
            state.query_times.len() > QUERIES_PER_MINUTE_THRESHOLD
        };

        // The rate alert deliberately has no cooldown: it re-fires on every
        // processed query while the window stays above threshold, and
        // callers apply their own damping policy.
        if rate_exceeded {
            self.raise_rate_alert();
        }

        query
    }

    /// Evaluates the four independent suspicion heuristics.
    fn check_tunneling(&self, query: &DnsQueryRecord) -> Vec<String> {
        let mut reasons = Vec::new();

        if query.length > MAX_QUERY_LENGTH {
            reasons.push(format!("long query ({} chars)", query.length));
        }
        if query.subdomain_count > MAX_SUBDOMAINS {
            reasons.push(format!("many subdomains ({})", query.subdomain_count));
        }
        if query.entropy > HIGH_ENTROPY_THRESHOLD {
            reasons.push(format!("high entropy ({})", query.entropy));
        }
        if SUSPICIOUS_TYPES.contains(&query.record_type.as_str()) {
            reasons.push(format!("suspicious type ({})", query.record_type));
        }

        reasons
    }

    fn raise_tunneling_alert(&self, query: &DnsQueryRecord, reasons: &[String], now: DateTime<Utc>) {
        // Per-domain cooldown, case-insensitive, so repeated lookups of the
        // same suspicious name do not storm the alert store.
        let domain_key = query.domain.to_lowercase();
        {
            let mut state = self.state.lock();
            if let Some(last) = state.cooldowns.get(&domain_key) {
                if now.signed_duration_since(*last) < Duration::seconds(TUNNELING_COOLDOWN_SECS) {
                    return;
                }
            }
            state.cooldowns.insert(domain_key, now);
        }

        let severity = if reasons.len() >= 3 {
            AlertSeverity::High
        } else if reasons.len() == 1 && reasons[0].starts_with("suspicious type") {
            AlertSeverity::Low
        } else {
            AlertSeverity::Medium
        };

        let truncated: String = query.domain.chars().take(30).collect();

        let mut metadata = HashMap::new();
        metadata.insert("query_length".into(), query.length.into());
        metadata.insert("subdomain_count".into(), query.subdomain_count.into());
        metadata.insert("entropy".into(), query.entropy.into());
        metadata.insert("query_type".into(), query.record_type.as_str().into());
        metadata.insert("reasons".into(), serde_json::json!(reasons));

        self.alerts.add(
            AlertType::DnsTunneling,
            severity,
            format!("Possible DNS tunneling: {}...", truncated),
            format!(
                "Suspicious query detected. Indicators: {}",
                reasons.join(", ")
            ),
            AlertSource {
                process_name: query.process_name.clone(),
                pid: query.pid,
                src_ip: Some(query.src_ip.clone()),
                dst_ip: Some(query.dst_ip.clone()),
                domain: Some(query.domain.clone()),
                ..Default::default()
            },
            metadata,
        );
    }

    fn raise_rate_alert(&self) {
        let queries_per_minute = self.state.lock().query_times.len();

        let mut metadata = HashMap::new();
        metadata.insert("queries_per_minute".into(), queries_per_minute.into());

        self.alerts.add(
            AlertType::DnsUnusual,
            AlertSeverity::Medium,
            "High DNS query rate",
            format!(
                "More than {} queries/min observed",
                QUERIES_PER_MINUTE_THRESHOLD
            ),
            AlertSource::default(),
            metadata,
        );
    }

    /// Drops the oldest 20% (minimum 1) of the retained history.
    fn cleanup_old_queries(queries: &mut HashMap<String, DnsRecord>) {
        let mut by_age: Vec<(String, DateTime<Utc>)> = queries
            .values()
            .map(|r| (r.query.id.clone(), r.query.timestamp))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);

        let to_remove = std::cmp::max(1, by_age.len() / 5);
        for (id, _) in by_age.into_iter().take(to_remove) {
            queries.remove(&id);
        }
    }

    /// Query history matching the filter, newest first.
    pub fn get_queries(&self, filter: &DnsQueryFilter) -> Vec<DnsRecord> {
        let mut records: Vec<DnsRecord> = {
            let state = self.state.lock();
            state
                .queries
                .values()
                .filter(|r| Self::matches(r, filter))
                .cloned()
                .collect()
        };

        records.sort_by(|a, b| b.query.timestamp.cmp(&a.query.timestamp));
        records.truncate(filter.limit.unwrap_or(100));
        records
    }

    fn matches(record: &DnsRecord, filter: &DnsQueryFilter) -> bool {
        if filter.suspicious_only && !record.query.is_suspicious {
            return false;
        }
        if let Some(needle) = &filter.process_name {
            match &record.query.process_name {
                Some(name) => {
                    if !name.to_lowercase().contains(&needle.to_lowercase()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(needle) = &filter.domain {
            if !record
                .query
                .domain
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }

    pub fn get_query_by_id(&self, id: &str) -> Option<DnsRecord> {
        self.state.lock().queries.get(id).cloned()
    }

    pub fn get_stats(&self) -> DnsStats {
        let now = self.clock.now();
        let state = self.state.lock();

        let mut domains: HashMap<String, u64> = HashMap::new();
        let mut processes: HashMap<String, u64> = HashMap::new();
        let mut types: HashMap<String, u64> = HashMap::new();
        let mut suspicious = 0;
        let mut failed = 0;
        let mut recent = 0;

        let minute_ago = now - Duration::minutes(1);
        for record in state.queries.values() {
            let q = &record.query;
            *domains.entry(q.domain.clone()).or_default() += 1;
            *types.entry(q.record_type.clone()).or_default() += 1;
            if let Some(name) = &q.process_name {
                *processes.entry(name.clone()).or_default() += 1;
            }
            if q.is_suspicious {
                suspicious += 1;
            }
            if let Some(response) = &record.response {
                if response.response_code != "NOERROR" {
                    failed += 1;
                }
            }
            if q.timestamp >= minute_ago {
                recent += 1;
            }
        }

        let unique_domains = domains.len();
        let top_domains = top_counts(domains)
            .into_iter()
            .map(|(domain, count)| DomainCount { domain, count })
            .collect();
        let top_processes = top_counts(processes)
            .into_iter()
            .map(|(process, count)| ProcessCount { process, count })
            .collect();

        DnsStats {
            total_queries: state.queries.len(),
            unique_domains,
            queries_by_type: types,
            top_domains,
            top_processes,
            suspicious_queries: suspicious,
            failed_queries: failed,
            queries_per_minute: recent as f64,
        }
    }

    /// Per-process activity. Returns a zeroed record when the process has no
    /// recorded queries — this surface never errors.
    pub fn get_process_stats(&self, process_name: &str) -> DnsProcessStats {
        let needle = process_name.to_lowercase();
        let state = self.state.lock();

        let mut domains: HashSet<String> = HashSet::new();
        let mut total = 0;
        let mut suspicious = 0;
        let mut last_query: Option<DateTime<Utc>> = None;
        let mut pid = None;

        for record in state.queries.values() {
            let q = &record.query;
            let matched = q
                .process_name
                .as_ref()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !matched {
                continue;
            }

            total += 1;
            domains.insert(q.domain.clone());
            if q.is_suspicious {
                suspicious += 1;
            }
            if last_query.map(|t| q.timestamp > t).unwrap_or(true) {
                last_query = Some(q.timestamp);
                pid = q.pid;
            }
        }

        let mut domains: Vec<String> = domains.into_iter().collect();
        domains.sort();
        domains.truncate(50);

        DnsProcessStats {
            process_name: process_name.to_string(),
            pid,
            total_queries: total,
            unique_domains: domains.len(),
            domains,
            suspicious_count: suspicious,
            last_query,
        }
    }

    /// Global tunneling posture across the retained history.
    pub fn get_tunneling_indicators(&self) -> TunnelingIndicators {
        let now = self.clock.now();
        let state = self.state.lock();

        let mut long_queries = 0;
        let mut high_entropy = 0;
        let mut many_subdomains = 0;
        let mut unusual_types = 0;

        for record in state.queries.values() {
            let q = &record.query;
            if q.length > MAX_QUERY_LENGTH {
                long_queries += 1;
            }
            if q.entropy > HIGH_ENTROPY_THRESHOLD {
                high_entropy += 1;
            }
            if q.subdomain_count > MAX_SUBDOMAINS {
                many_subdomains += 1;
            }
            if SUSPICIOUS_TYPES.contains(&q.record_type.as_str()) {
                unusual_types += 1;
            }
        }

        let window_start = now - Duration::minutes(1);
        let recent = state
            .query_times
            .iter()
            .filter(|t| **t >= window_start)
            .count();
        let high_frequency = recent > QUERIES_PER_MINUTE_THRESHOLD;

        let total = state.queries.len().max(1) as f64;
        let mut score = (long_queries as f64 / total) * 25.0
            + (high_entropy as f64 / total) * 30.0
            + (many_subdomains as f64 / total) * 20.0
            + (unusual_types as f64 / total) * 15.0;
        if high_frequency {
            score += 10.0;
        }
        let score = ((score.clamp(0.0, 100.0)) * 10.0).round() / 10.0;

        TunnelingIndicators {
            long_queries,
            high_entropy_queries: high_entropy,
            many_subdomains,
            unusual_types,
            high_frequency,
            score,
        }
    }

    /// Number of retained query records.
    pub fn len(&self) -> usize {
        self.state.lock().queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queries.is_empty()
    }

    /// Drops the query history and the rate window.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.queries.clear();
        state.query_times.clear();
    }
}

/// Top-10 entries by descending count; ties broken by key for determinism.
fn top_counts(counts: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(10);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::AlertFilter;
    use crate::clock::ManualClock;
    use crate::logger::Logger;
    use chrono::TimeZone;

    fn make_analyzer() -> (DnsAnalyzer, Arc<AlertStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let logger = Arc::new(Logger::new(false, None).unwrap());
        let alerts = Arc::new(AlertStore::new(1000, clock.clone(), logger.clone()));
        (
            DnsAnalyzer::new(clock.clone(), alerts.clone(), logger),
            alerts,
            clock,
        )
    }

    fn query(domain: &str, qtype: u16) -> DnsMessage {
        DnsMessage {
            is_response: false,
            qname: domain.to_string(),
            qtype,
            rcode: 0,
            answers: Vec::new(),
            ttl: None,
        }
    }

    #[test]
    fn entropy_of_repeated_char_is_zero() {
        assert_eq!(shannon_entropy("aaaa"), 0.0);
    }

    #[test]
    fn entropy_of_four_uniform_chars_is_two_bits() {
        assert_eq!(shannon_entropy("abcd"), 2.0);
    }

    #[test]
    fn entropy_of_empty_string_is_zero() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn subdomain_count_examples() {
        assert_eq!(subdomain_count("a.b.example.com"), 2);
        assert_eq!(subdomain_count("example.com"), 0);
        assert_eq!(subdomain_count("com"), 0);
        assert_eq!(subdomain_count("x.example.com."), 1);
    }

    #[test]
    fn longest_label_keeps_first_on_ties() {
        assert_eq!(longest_label("abc.def.gh"), "abc");
        assert_eq!(longest_label("payload1234567890.evil.example"), "payload1234567890");
    }

    #[test]
    fn benign_query_is_not_suspicious() {
        let (analyzer, alerts, _) = make_analyzer();
        let record = analyzer.process(&query("example.com", 1), "192.168.1.10", "8.8.8.8", None);
        assert!(!record.is_suspicious);
        assert!(record.suspicion_reasons.is_empty());
        assert_eq!(alerts.len(), 0);
    }

    #[test]
    fn high_entropy_label_flags_and_alerts_once() {
        let (analyzer, alerts, _) = make_analyzer();
        let domain = "aGVsbG93b3JsZGhlbGxvd29ybGQ.evil.example";

        let record = analyzer.process(&query(domain, 1), "192.168.1.10", "8.8.8.8", None);
        assert!(record.is_suspicious);
        assert!(record
            .suspicion_reasons
            .iter()
            .any(|r| r.starts_with("high entropy")));
        assert_eq!(alerts.len(), 1);

        // Immediate repeat: still suspicious, but suppressed by the
        // per-domain cooldown.
        let repeat = analyzer.process(&query(domain, 1), "192.168.1.10", "8.8.8.8", None);
        assert!(repeat.is_suspicious);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn cooldown_expires_after_a_minute() {
        let (analyzer, alerts, clock) = make_analyzer();
        let domain = "aGVsbG93b3JsZGhlbGxvd29ybGQ.evil.example";

        analyzer.process(&query(domain, 1), "192.168.1.10", "8.8.8.8", None);
        clock.advance(Duration::seconds(61));
        analyzer.process(&query(domain, 1), "192.168.1.10", "8.8.8.8", None);
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn long_and_deep_and_encoded_txt_query_is_high_severity() {
        let (analyzer, alerts, _) = make_analyzer();
        // Long (>50 chars), >4 subdomains, high-entropy label, TXT type.
        let domain = "dGhpc2lzYWxvbmdlbmNvZGVkcGF5bG9hZA.a.b.c.d.e.evil.example";

        let record = analyzer.process(&query(domain, 16), "192.168.1.10", "8.8.8.8", None);
        assert!(record.suspicion_reasons.len() >= 3);

        let stored = alerts.list(&AlertFilter::default());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].severity, AlertSeverity::High);
        assert_eq!(stored[0].kind, AlertType::DnsTunneling);
    }

    #[test]
    fn suspicious_type_alone_is_low_severity() {
        let (analyzer, alerts, _) = make_analyzer();
        let record = analyzer.process(&query("example.com", 16), "192.168.1.10", "8.8.8.8", None);
        assert_eq!(record.suspicion_reasons.len(), 1);

        let stored = alerts.list(&AlertFilter::default());
        assert_eq!(stored[0].severity, AlertSeverity::Low);
    }

    #[test]
    fn rate_alert_fires_without_dedup_above_sixty_per_minute() {
        let (analyzer, alerts, _) = make_analyzer();
        for i in 0..61 {
            analyzer.process(&query(&format!("host{}.example.com", i), 1), "10.0.0.1", "8.8.8.8", None);
        }
        assert_eq!(
            alerts
                .list(&AlertFilter {
                    types: Some(vec![AlertType::DnsUnusual]),
                    ..Default::default()
                })
                .len(),
            1
        );

        // Every further call re-fires while the window stays hot.
        analyzer.process(&query("more.example.com", 1), "10.0.0.1", "8.8.8.8", None);
        assert_eq!(
            alerts
                .list(&AlertFilter {
                    types: Some(vec![AlertType::DnsUnusual]),
                    ..Default::default()
                })
                .len(),
            2
        );
    }

    #[test]
    fn history_cap_evicts_oldest_fifth() {
        let (analyzer, _, clock) = make_analyzer();
        for i in 0..MAX_QUERIES {
            clock.advance(Duration::milliseconds(1));
            analyzer.process(&query(&format!("h{}.example.com", i), 1), "10.0.0.1", "8.8.8.8", None);
        }
        assert_eq!(analyzer.len(), MAX_QUERIES);

        clock.advance(Duration::milliseconds(1));
        analyzer.process(&query("overflow.example.com", 1), "10.0.0.1", "8.8.8.8", None);
        assert_eq!(analyzer.len(), MAX_QUERIES - MAX_QUERIES / 5 + 1);
    }

    #[test]
    fn response_pairs_with_answers_and_resolution() {
        let (analyzer, _, _) = make_analyzer();
        let msg = DnsMessage {
            is_response: true,
            qname: "example.com".to_string(),
            qtype: 1,
            rcode: 0,
            answers: vec!["93.184.216.34".to_string()],
            ttl: Some(300),
        };
        let record = analyzer.process(&msg, "8.8.8.8", "192.168.1.10", None);

        let stored = analyzer.get_query_by_id(&record.id).unwrap();
        assert!(stored.resolved);
        let response = stored.response.unwrap();
        assert_eq!(response.response_code, "NOERROR");
        assert_eq!(response.answers, vec!["93.184.216.34".to_string()]);
        assert_eq!(response.ttl, Some(300));
    }

    #[test]
    fn stats_and_filters_over_history() {
        let (analyzer, _, clock) = make_analyzer();
        let attribution = ProcessInfo { pid: 99, name: "firefox".into() };

        analyzer.process(&query("example.com", 1), "10.0.0.1", "8.8.8.8", Some(&attribution));
        clock.advance(Duration::seconds(1));
        analyzer.process(&query("example.com", 1), "10.0.0.1", "8.8.8.8", Some(&attribution));
        clock.advance(Duration::seconds(1));
        analyzer.process(&query("example.org", 16), "10.0.0.1", "8.8.8.8", None);

        let stats = analyzer.get_stats();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.unique_domains, 2);
        assert_eq!(stats.queries_by_type.get("A"), Some(&2));
        assert_eq!(stats.queries_by_type.get("TXT"), Some(&1));
        assert_eq!(stats.top_domains[0].domain, "example.com");
        assert_eq!(stats.suspicious_queries, 1);

        let suspicious = analyzer.get_queries(&DnsQueryFilter {
            suspicious_only: true,
            ..Default::default()
        });
        assert_eq!(suspicious.len(), 1);
        assert_eq!(suspicious[0].query.domain, "example.org");

        let by_process = analyzer.get_queries(&DnsQueryFilter {
            process_name: Some("FIRE".into()),
            ..Default::default()
        });
        assert_eq!(by_process.len(), 2);
    }

    #[test]
    fn process_stats_for_unknown_process_is_zeroed() {
        let (analyzer, _, _) = make_analyzer();
        let stats = analyzer.get_process_stats("ghost");
        assert_eq!(stats.process_name, "ghost");
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.unique_domains, 0);
        assert!(stats.domains.is_empty());
        assert!(stats.last_query.is_none());
    }

    #[test]
    fn tunneling_indicators_score_stays_in_bounds() {
        let (analyzer, _, _) = make_analyzer();
        assert_eq!(analyzer.get_tunneling_indicators().score, 0.0);

        analyzer.process(
            &query("dGhpc2lzYWxvbmdlbmNvZGVkcGF5bG9hZA.a.b.c.d.e.evil.example", 16),
            "10.0.0.1",
            "8.8.8.8",
            None,
        );
        let indicators = analyzer.get_tunneling_indicators();
        assert_eq!(indicators.long_queries, 1);
        assert_eq!(indicators.high_entropy_queries, 1);
        assert_eq!(indicators.many_subdomains, 1);
        assert_eq!(indicators.unusual_types, 1);
        assert!(!indicators.high_frequency);
        // All four ratios are 1/1: 25 + 30 + 20 + 15 = 90.
        assert_eq!(indicators.score, 90.0);

        analyzer.clear();
        assert!(analyzer.is_empty());
    }
}
