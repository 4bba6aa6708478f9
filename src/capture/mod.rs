//! Capture engine: owns the capture thread, the live queue and the wiring
//! of records into stats, DNS analysis and pattern detection.

pub mod parser;
pub mod queue;
pub mod stats;

pub use queue::LiveQueue;
pub use stats::{CaptureStats, StatsAggregator};

use crate::clock::SharedClock;
use crate::detect::PatternDetectorSet;
use crate::error::{Error, Result};
use crate::logger::{Event, SharedLogger};
use crate::record::PacketRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use parser::PacketParser;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long `stop`/`reset` wait for the capture thread before giving up and
/// returning anyway.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// pcap read timeout so the loop wakes to observe the stop flag even when
/// the interface is silent.
const READ_TIMEOUT_MS: i32 = 200;

/// Lifecycle of the capture engine. At most one capture thread is ever
/// associated with a non-idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Running,
    Stopping,
}

/// Point-in-time view of the capture session.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub is_running: bool,
    pub packets_captured: u64,
    pub interface: Option<String>,
    pub filter: Option<String>,
}

#[derive(Default)]
struct Session {
    interface: Option<String>,
    filter: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

pub struct CaptureEngine {
    state: Arc<Mutex<CaptureState>>,
    shutdown: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
    live: Arc<LiveQueue>,
    recent: Arc<Mutex<Vec<PacketRecord>>>,
    session: Mutex<Session>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StatsAggregator>,
    parser: Arc<PacketParser>,
    detectors: Arc<PatternDetectorSet>,
    clock: SharedClock,
    logger: SharedLogger,
}

impl CaptureEngine {
    pub fn new(
        stats: Arc<StatsAggregator>,
        parser: Arc<PacketParser>,
        detectors: Arc<PatternDetectorSet>,
        clock: SharedClock,
        logger: SharedLogger,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            captured: Arc::new(AtomicU64::new(0)),
            live: Arc::new(LiveQueue::new(queue::DEFAULT_CAPACITY)),
            recent: Arc::new(Mutex::new(Vec::new())),
            session: Mutex::new(Session::default()),
            handle: Mutex::new(None),
            stats,
            parser,
            detectors,
            clock,
            logger,
        }
    }

    /// Starts a capture session. Fails unless the engine is idle.
    ///
    /// Blank interface/filter strings are treated as unspecified. Counters,
    /// the live queue and the recent-packet buffer are reset before the
    /// capture thread is spawned. Device open errors surface on the capture
    /// thread: it logs them and drops back to idle, observable through
    /// [`get_status`](Self::get_status).
    pub fn start(
        &self,
        interface: Option<String>,
        filter: Option<String>,
        max_packets: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if *state != CaptureState::Idle {
            return Err(Error::CaptureInProgress);
        }

        let interface = normalize(interface);
        let filter = normalize(filter);

        self.stats.reset();
        self.live.clear();
        self.recent.lock().clear();
        self.captured.store(0, Ordering::SeqCst);
        self.shutdown.store(false, Ordering::SeqCst);

        {
            let mut session = self.session.lock();
            session.interface = interface.clone();
            session.filter = filter.clone();
            session.started_at = Some(self.clock.now());
        }

        self.logger.log(&Event::CaptureStarted {
            interface: interface.as_deref().unwrap_or("none specified"),
            filter: filter.as_deref().unwrap_or("none specified"),
        });

        *state = CaptureState::Running;

        let worker = CaptureWorker {
            state: Arc::clone(&self.state),
            shutdown: Arc::clone(&self.shutdown),
            captured: Arc::clone(&self.captured),
            live: Arc::clone(&self.live),
            recent: Arc::clone(&self.recent),
            stats: Arc::clone(&self.stats),
            parser: Arc::clone(&self.parser),
            detectors: Arc::clone(&self.detectors),
            clock: Arc::clone(&self.clock),
            logger: Arc::clone(&self.logger),
        };
        let handle = thread::spawn(move || worker.run(interface, filter, max_packets));
        *self.handle.lock() = Some(handle);

        Ok(())
    }

    /// Stops the capture and returns the session summary. Waits up to two
    /// seconds for the capture thread, then returns regardless.
    pub fn stop(&self) -> CaptureStats {
        {
            let mut state = self.state.lock();
            if *state == CaptureState::Running {
                *state = CaptureState::Stopping;
            }
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.join_capture_thread();

        self.stats.summary(self.session_duration())
    }

    /// Best-effort join, then force-clears all counters, the live queue and
    /// the recent buffer.
    pub fn reset(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.join_capture_thread();

        self.stats.reset();
        self.live.clear();
        self.recent.lock().clear();
        self.captured.store(0, Ordering::SeqCst);
        *self.session.lock() = Session::default();
        *self.state.lock() = CaptureState::Idle;
    }

    fn join_capture_thread(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // Give up waiting; the thread observes the flag on its next
                // wakeup and exits on its own.
                self.logger.log(&Event::Info {
                    message: "capture thread did not stop within 2s; detaching",
                });
            }
        }
    }

    fn session_duration(&self) -> f64 {
        let started_at = self.session.lock().started_at;
        match started_at {
            Some(start) => {
                let elapsed = self.clock.now().signed_duration_since(start);
                elapsed.num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn get_status(&self) -> CaptureStatus {
        // Point-in-time reads; the state lock is released before the
        // session lock is taken so lock order never inverts against start().
        let is_running = *self.state.lock() == CaptureState::Running;
        let packets_captured = self.captured.load(Ordering::SeqCst);
        let session = self.session.lock();
        CaptureStatus {
            is_running,
            packets_captured,
            interface: session.interface.clone(),
            filter: session.filter.clone(),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    /// Last `limit` records of the session, oldest first.
    pub fn get_recent(&self, limit: usize) -> Vec<PacketRecord> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(limit);
        recent[skip..].to_vec()
    }

    /// Drains everything currently in the live queue.
    pub fn get_pending(&self) -> Vec<PacketRecord> {
        self.live.drain()
    }

    /// Bounded blocking pop from the live queue for stream consumers.
    pub fn pop_live(&self, timeout: Duration) -> Option<PacketRecord> {
        self.live.pop_timeout(timeout)
    }

    /// Capture-capable interface names, loopback excluded.
    pub fn list_interfaces() -> Vec<String> {
        let mut names: Vec<String> = pnet::datalink::interfaces()
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .map(|iface| iface.name)
            .collect();
        names.sort();
        names
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Everything the capture thread needs, cloned out of the engine so the
/// thread owns its handles outright.
struct CaptureWorker {
    state: Arc<Mutex<CaptureState>>,
    shutdown: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
    live: Arc<LiveQueue>,
    recent: Arc<Mutex<Vec<PacketRecord>>>,
    stats: Arc<StatsAggregator>,
    parser: Arc<PacketParser>,
    detectors: Arc<PatternDetectorSet>,
    clock: SharedClock,
    logger: SharedLogger,
}

impl CaptureWorker {
    fn run(self, interface: Option<String>, filter: Option<String>, max_packets: u64) {
        if let Err(e) = self.capture_loop(interface, filter, max_packets) {
            self.logger.log(&Event::Info {
                message: &format!("capture failed: {}", e),
            });
        }

        self.logger.log(&Event::CaptureStopped {
            packets: self.captured.load(Ordering::SeqCst),
        });
        *self.state.lock() = CaptureState::Idle;
    }

    fn capture_loop(
        &self,
        interface: Option<String>,
        filter: Option<String>,
        max_packets: u64,
    ) -> Result<()> {
        let mut cap = open_capture(interface)?;

        if let Some(program) = &filter {
            cap.filter(program, true).map_err(|e| Error::InvalidFilter {
                filter: program.clone(),
                source: e,
            })?;
        }

        // The stop condition is observed at least once per captured frame,
        // and additionally on every read-timeout wakeup, so cancellation
        // latency stays bounded even on a silent interface.
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            if self.captured.load(Ordering::Relaxed) >= max_packets {
                break;
            }

            match cap.next_packet() {
                Ok(packet) => self.handle_frame(packet.data),
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(_) => break,
            }
        }

        Ok(())
    }

    fn handle_frame(&self, data: &[u8]) {
        let now = self.clock.now();
        let record = match self.parser.parse(data, now) {
            Some(record) => record,
            None => return,
        };

        self.stats.update(&record);
        self.detectors.analyze(&record);
        self.recent.lock().push(record.clone());
        self.live.push(record);
        self.captured.fetch_add(1, Ordering::SeqCst);
    }
}

fn open_capture(interface: Option<String>) -> Result<pcap::Capture<pcap::Active>> {
    match interface {
        Some(name) => pcap::Capture::from_device(name.as_str())
            .map_err(|e| Error::CaptureOpen { iface: name.clone(), source: e })?
            .promisc(true)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(|e| Error::CaptureOpen { iface: name, source: e }),
        None => {
            let device = pcap::Device::lookup()
                .map_err(|_| Error::NoDevice)?
                .ok_or(Error::NoDevice)?;
            let name = device.name.clone();
            pcap::Capture::from_device(device)
                .map_err(|e| Error::CaptureOpen { iface: name.clone(), source: e })?
                .promisc(true)
                .timeout(READ_TIMEOUT_MS)
                .open()
                .map_err(|e| Error::CaptureOpen { iface: name, source: e })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStore;
    use crate::clock::ManualClock;
    use crate::logger::Logger;
    use crate::process::ProcessTable;
    use crate::dns::DnsAnalyzer;
    use chrono::TimeZone;

    fn make_engine() -> CaptureEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let logger = Arc::new(Logger::new(false, None).unwrap());
        let alerts = Arc::new(AlertStore::new(1000, clock.clone(), logger.clone()));
        let dns = Arc::new(DnsAnalyzer::new(clock.clone(), alerts.clone(), logger.clone()));
        let parser = Arc::new(PacketParser::new(
            Arc::new(ProcessTable::new()),
            dns,
        ));
        let detectors = Arc::new(PatternDetectorSet::with_default_detectors(
            alerts,
            logger.clone(),
        ));
        CaptureEngine::new(
            Arc::new(StatsAggregator::new()),
            parser,
            detectors,
            clock,
            logger,
        )
    }

    fn make_worker(engine: &CaptureEngine) -> CaptureWorker {
        CaptureWorker {
            state: Arc::clone(&engine.state),
            shutdown: Arc::clone(&engine.shutdown),
            captured: Arc::clone(&engine.captured),
            live: Arc::clone(&engine.live),
            recent: Arc::clone(&engine.recent),
            stats: Arc::clone(&engine.stats),
            parser: Arc::clone(&engine.parser),
            detectors: Arc::clone(&engine.detectors),
            clock: Arc::clone(&engine.clock),
            logger: Arc::clone(&engine.logger),
        }
    }

    /// Builds a TCP SYN frame toward the given destination port.
    fn syn_frame(dst_port: u16) -> Vec<u8> {
        let builder = etherparse::PacketBuilder::ethernet2(
            [1, 2, 3, 4, 5, 6],
            [7, 8, 9, 10, 11, 12],
        )
        .ipv4([192, 168, 1, 10], [203, 0, 113, 7], 64)
        .tcp(50123, dst_port, 1000, 64000)
        .syn();
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        frame
    }

    #[test]
    fn frame_flows_through_stats_detectors_and_queues() {
        let engine = make_engine();
        let worker = make_worker(&engine);

        // A SYN toward port 4444 with no prior history: one record through
        // the whole pipeline, one suspicious-port alert.
        worker.handle_frame(&syn_frame(4444));

        assert_eq!(engine.get_status().packets_captured, 1);
        assert_eq!(engine.stats.total(), 1);
        assert_eq!(engine.detectors.get_stats().counters.alerts_generated, 1);

        let recent = engine.get_recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].dst_port, Some(4444));

        let pending = engine.get_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].protocol, crate::record::Protocol::Tcp);
    }

    #[test]
    fn malformed_frame_is_skipped_not_counted() {
        let engine = make_engine();
        let worker = make_worker(&engine);

        worker.handle_frame(&[0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(engine.get_status().packets_captured, 0);
        assert_eq!(engine.stats.total(), 0);
        assert!(engine.get_pending().is_empty());
    }

    #[test]
    fn starts_idle_with_empty_status() {
        let engine = make_engine();
        assert_eq!(engine.state(), CaptureState::Idle);

        let status = engine.get_status();
        assert!(!status.is_running);
        assert_eq!(status.packets_captured, 0);
        assert!(status.interface.is_none());
    }

    #[test]
    fn stop_when_idle_returns_empty_summary() {
        let engine = make_engine();
        let summary = engine.stop();
        assert_eq!(summary.total_packets, 0);
        assert_eq!(summary.capture_duration, 0.0);
    }

    #[test]
    fn normalize_blanks_to_unspecified() {
        assert_eq!(normalize(Some("   ".into())), None);
        assert_eq!(normalize(Some("".into())), None);
        assert_eq!(normalize(Some("eth0".into())), Some("eth0".into()));
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn get_recent_returns_tail() {
        let engine = make_engine();
        {
            let mut recent = engine.recent.lock();
            for i in 0..5u16 {
                recent.push(PacketRecord {
                    timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                    src_ip: "10.0.0.1".into(),
                    dst_ip: "10.0.0.2".into(),
                    src_port: Some(i),
                    dst_port: Some(443),
                    protocol: crate::record::Protocol::Tcp,
                    length: 60,
                    payload_preview: None,
                    flags: None,
                    process_name: None,
                    pid: None,
                    dns_query_id: None,
                    dns_domain: None,
                });
            }
        }

        let tail = engine.get_recent(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].src_port, Some(3));
        assert_eq!(tail[1].src_port, Some(4));

        assert_eq!(engine.get_recent(100).len(), 5);
    }

    #[test]
    fn reset_clears_session_state() {
        let engine = make_engine();
        engine.recent.lock().push(PacketRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            src_ip: "10.0.0.1".into(),
            dst_ip: "10.0.0.2".into(),
            src_port: None,
            dst_port: None,
            protocol: crate::record::Protocol::Icmp,
            length: 60,
            payload_preview: None,
            flags: None,
            process_name: None,
            pid: None,
            dns_query_id: None,
            dns_domain: None,
        });
        engine.captured.store(7, Ordering::SeqCst);

        engine.reset();
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.get_status().packets_captured, 0);
        assert!(engine.get_recent(10).is_empty());
        assert!(engine.get_pending().is_empty());
    }
}
