//! netvigil — passive network traffic security monitor.
//!
//! A capture thread decodes live frames into [`PacketRecord`]s and fans
//! them out to a stats aggregator, a DNS analyzer and a set of stateful
//! pattern detectors. Findings land in a bounded, subscribable
//! [`AlertStore`]; a drop-oldest live queue exposes the record stream to
//! external consumers. All state is in-memory and bounded.

pub mod alerts;
pub mod capture;
pub mod clock;
pub mod detect;
pub mod dns;
pub mod error;
pub mod logger;
pub mod process;
pub mod record;

pub use alerts::types::{Alert, AlertFilter, AlertSeverity, AlertSource, AlertStats, AlertType};
pub use alerts::{AlertFanout, AlertStore};
pub use capture::parser::PacketParser;
pub use capture::stats::StatsAggregator;
pub use capture::{CaptureEngine, CaptureState, CaptureStatus};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use detect::{Detector, Finding, PatternDetectorSet};
pub use dns::DnsAnalyzer;
pub use error::{Error, Result};
pub use logger::{Event, Logger, SharedLogger};
pub use process::{ProcessInfo, ProcessLookup, ProcessTable};
pub use record::{PacketRecord, Protocol};
