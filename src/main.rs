mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use netvigil::{
    AlertFanout, AlertStore, CaptureEngine, DnsAnalyzer, Event, Logger, PacketParser,
    PatternDetectorSet, ProcessTable, StatsAggregator, SystemClock,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_interfaces {
        for name in CaptureEngine::list_interfaces() {
            println!("{}", name);
        }
        return Ok(());
    }

    let logger = Arc::new(
        Logger::new(cli.json, cli.log_file.as_deref())
            .context("failed to open log file")?,
    );
    let clock = Arc::new(SystemClock);

    // ── Service wiring ────────────────────────────────────────────────────────
    // One alert store shared by every producer; the fanout bridges it to
    // stream consumers (here: this process's own alert counter).
    let alerts = Arc::new(AlertStore::new(cli.max_alerts, clock.clone(), logger.clone()));
    let fanout = Arc::new(AlertFanout::default());
    {
        let fanout = Arc::clone(&fanout);
        alerts.subscribe(move |alert| fanout.publish(alert));
    }
    let alert_rx = fanout.register();

    let dns = Arc::new(DnsAnalyzer::new(clock.clone(), alerts.clone(), logger.clone()));
    let processes = Arc::new(ProcessTable::new());
    let parser = Arc::new(PacketParser::new(processes, dns.clone()));
    let detectors = Arc::new(PatternDetectorSet::with_default_detectors(
        alerts.clone(),
        logger.clone(),
    ));
    let stats = Arc::new(StatsAggregator::new());

    let engine = CaptureEngine::new(stats, parser, detectors, clock, logger.clone());

    // ── Shutdown handling ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            println!("\n[!] Ctrl+C received — shutting down...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("failed to register Ctrl+C handler")?;
    }

    let session_start = Instant::now();
    engine
        .start(cli.interface.clone(), cli.filter.clone(), cli.max_packets)
        .context("failed to start capture")?;

    // ── Consumer loop ─────────────────────────────────────────────────────────
    // Drain the live queue (for verbose packet logging) and the alert fanout
    // until Ctrl+C or the capture thread finishes on its own.
    let mut alerts_seen: u64 = 0;
    loop {
        let record = engine.pop_live(Duration::from_millis(250));
        if let (Some(record), true) = (&record, cli.verbose) {
            logger.log(&Event::Packet {
                src: &record.src_ip,
                dst: &record.dst_ip,
                protocol: &record.protocol.to_string(),
                length: record.length,
            });
        }

        alerts_seen += alert_rx.try_iter().count() as u64;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        // An empty pop with the capture thread gone means the stream is done.
        if record.is_none() && !engine.get_status().is_running {
            break;
        }
    }

    let summary = engine.stop();
    alerts_seen += alert_rx.try_iter().count() as u64;

    logger.log(&Event::SessionSummary {
        duration_secs: session_start.elapsed().as_secs(),
        packets_total: summary.total_packets,
        alerts_total: alerts_seen,
        dns_queries: dns.get_stats().total_queries as u64,
    });

    Ok(())
}
