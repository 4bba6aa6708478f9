//! Bounded, queryable alert repository.
//!
//! Every detector and the DNS analyzer hand their findings to one shared
//! [`AlertStore`]. The store keeps alerts in memory under a configurable
//! cap, supports filtered listing and acknowledgement, and notifies
//! registered subscribers on every insertion.

pub mod fanout;
pub mod types;

pub use fanout::AlertFanout;

use crate::clock::SharedClock;
use crate::logger::{Event, SharedLogger};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use types::{Alert, AlertFilter, AlertSeverity, AlertSource, AlertStats, AlertType};

pub const DEFAULT_CAPACITY: usize = 1000;

type AlertCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// Central alert repository.
///
/// Capacity policy: when an insertion finds the store at capacity, the
/// oldest 20% (minimum 1) of the *acknowledged* alerts are evicted. When
/// nothing is acknowledged, nothing is evicted and the store grows past its
/// cap — unacknowledged security signal is never dropped.
pub struct AlertStore {
    alerts: Mutex<HashMap<String, Alert>>,
    capacity: usize,
    callbacks: RwLock<Vec<AlertCallback>>,
    clock: SharedClock,
    logger: SharedLogger,
}

impl AlertStore {
    pub fn new(capacity: usize, clock: SharedClock, logger: SharedLogger) -> Self {
        Self {
            alerts: Mutex::new(HashMap::new()),
            capacity,
            callbacks: RwLock::new(Vec::new()),
            clock,
            logger,
        }
    }

    /// Registers a callback invoked with every new alert.
    ///
    /// Callbacks run after the alert map lock has been released, so a slow
    /// subscriber cannot block producers. A panicking callback is logged
    /// and does not affect the insertion or the other callbacks.
    pub fn subscribe(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.callbacks.write().push(Box::new(callback));
    }

    /// Creates, stores and publishes a new alert.
    pub fn add(
        &self,
        kind: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        source: AlertSource,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Alert {
        let alert = Alert {
            id: crate::record::short_id(),
            timestamp: self.clock.now(),
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            source,
            metadata,
            acknowledged: false,
            acknowledged_at: None,
            acknowledged_by: None,
        };

        {
            let mut alerts = self.alerts.lock();
            if alerts.len() >= self.capacity {
                Self::evict_acknowledged(&mut alerts);
            }
            alerts.insert(alert.id.clone(), alert.clone());
        }

        self.logger.log(&Event::AlertRaised {
            severity: alert.severity,
            kind: alert.kind,
            title: &alert.title,
        });

        // Publish outside the map lock so a slow or broken subscriber
        // cannot stall the capture pipeline.
        let callbacks = self.callbacks.read();
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(&alert))).is_err() {
                self.logger.log(&Event::SubscriberFailed {
                    message: "alert subscriber panicked; skipping",
                });
            }
        }

        alert
    }

    /// Removes the oldest 20% (minimum 1) of acknowledged alerts. No-op when
    /// nothing is acknowledged.
    fn evict_acknowledged(alerts: &mut HashMap<String, Alert>) {
        let mut acked: Vec<(String, chrono::DateTime<chrono::Utc>)> = alerts
            .values()
            .filter(|a| a.acknowledged)
            .map(|a| (a.id.clone(), a.timestamp))
            .collect();
        if acked.is_empty() {
            return;
        }

        acked.sort_by_key(|(_, ts)| *ts);
        let to_remove = std::cmp::max(1, acked.len() / 5);
        for (id, _) in acked.into_iter().take(to_remove) {
            alerts.remove(&id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.lock().get(id).cloned()
    }

    /// Lists alerts matching the filter, newest first.
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut matched: Vec<Alert> = {
            let alerts = self.alerts.lock();
            alerts
                .values()
                .filter(|a| Self::matches(a, filter))
                .cloned()
                .collect()
        };

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(filter.limit.unwrap_or(100));
        matched
    }

    fn matches(alert: &Alert, filter: &AlertFilter) -> bool {
        if let Some(types) = &filter.types {
            if !types.contains(&alert.kind) {
                return false;
            }
        }
        if let Some(severities) = &filter.severities {
            if !severities.contains(&alert.severity) {
                return false;
            }
        }
        if let Some(acknowledged) = filter.acknowledged {
            if alert.acknowledged != acknowledged {
                return false;
            }
        }
        if let Some(needle) = &filter.process_name {
            match &alert.source.process_name {
                Some(name) => {
                    if !name.to_lowercase().contains(&needle.to_lowercase()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(since) = filter.since {
            if alert.timestamp < since {
                return false;
            }
        }
        true
    }

    /// Marks one alert acknowledged. Returns the updated alert, or `None`
    /// for an unknown id.
    pub fn acknowledge(&self, id: &str, actor: &str) -> Option<Alert> {
        let now = self.clock.now();
        let mut alerts = self.alerts.lock();
        let alert = alerts.get_mut(id)?;
        alert.acknowledged = true;
        alert.acknowledged_at = Some(now);
        alert.acknowledged_by = Some(actor.to_string());
        Some(alert.clone())
    }

    /// Acknowledges every pending alert; returns how many were updated.
    pub fn acknowledge_all(&self, actor: &str) -> usize {
        let now = self.clock.now();
        let mut alerts = self.alerts.lock();
        let mut count = 0;
        for alert in alerts.values_mut() {
            if !alert.acknowledged {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(now);
                alert.acknowledged_by = Some(actor.to_string());
                count += 1;
            }
        }
        count
    }

    pub fn delete(&self, id: &str) -> bool {
        self.alerts.lock().remove(id).is_some()
    }

    /// Removes every alert; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut alerts = self.alerts.lock();
        let count = alerts.len();
        alerts.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    pub fn stats(&self) -> AlertStats {
        let day_ago = self.clock.now() - chrono::Duration::hours(24);
        let alerts = self.alerts.lock();

        let mut by_severity: HashMap<String, usize> = HashMap::new();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut unacknowledged = 0;
        let mut recent_24h = 0;

        for alert in alerts.values() {
            *by_severity.entry(alert.severity.to_string()).or_default() += 1;
            *by_type.entry(alert.kind.to_string()).or_default() += 1;
            if !alert.acknowledged {
                unacknowledged += 1;
            }
            if alert.timestamp >= day_ago {
                recent_24h += 1;
            }
        }

        AlertStats {
            total: alerts.len(),
            unacknowledged,
            by_severity,
            by_type,
            recent_24h,
        }
    }
}
