//! Detection thresholds, windows and cooldowns.
//!
//! All intervals are expressed in seconds and compared against packet
//! timestamps with `chrono::Duration`, so tests can drive the detectors
//! with synthetic timestamps instead of sleeping.

/// Sliding window over which distinct destination ports are counted for
/// port scan detection. Entries older than this are pruned before every
/// threshold decision.
pub const PORT_SCAN_WINDOW_SECS: i64 = 60;

/// Minimum distinct in-window destination ports before a scan alert fires.
pub const PORT_SCAN_THRESHOLD: usize = 10;

/// Minimum time between two port-scan alerts for the same (src, dst) pair.
pub const PORT_SCAN_COOLDOWN_SECS: i64 = 300;

/// Maximum ports included in a port-scan finding's sample list.
pub const PORT_SCAN_SAMPLE_LIMIT: usize = 20;

/// Sliding window over which per-IP packet volume is measured.
pub const HIGH_TRAFFIC_WINDOW_SECS: i64 = 60;

/// In-window packet count at which a high-traffic alert fires. Severity
/// escalates past 2x (HIGH) and 3x (CRITICAL) of this value.
pub const HIGH_TRAFFIC_THRESHOLD: usize = 500;

/// Minimum time between two high-traffic alerts for the same IP.
pub const HIGH_TRAFFIC_COOLDOWN_SECS: i64 = 120;

/// Minimum time between two sensitive-data alerts for the same
/// (src, dst) pair.
pub const SENSITIVE_DATA_COOLDOWN_SECS: i64 = 60;

/// Minimum time between two suspicious-port alerts for the same
/// (remote IP, port) pair.
pub const SUSPICIOUS_PORT_COOLDOWN_SECS: i64 = 300;
