//! Node health derivation and transition tracking.
//!
//! Status is a pure function of `(last_seen, latency)` against thresholds;
//! the monitor's only state is the last status it saw per node, so it can
//! publish `node_status` events on transitions and stay quiet otherwise.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use homemic_config::HealthSettings;
use homemic_db::models::NodeStatus;

use crate::events::{Event, EventBus, NodeStatusEvent};

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub freshness: chrono::Duration,
    pub latency_warning_ms: f64,
}

impl From<&HealthSettings> for HealthThresholds {
    fn from(s: &HealthSettings) -> Self {
        Self {
            freshness: chrono::Duration::seconds(s.freshness_secs as i64),
            latency_warning_ms: s.latency_warning_ms,
        }
    }
}

/// `offline` when stale, `warning` when fresh but slow, else `online`.
pub fn derive_status(
    last_seen: DateTime<Utc>,
    latency_ms: f64,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> NodeStatus {
    if now - last_seen > thresholds.freshness {
        NodeStatus::Offline
    } else if latency_ms > thresholds.latency_warning_ms {
        NodeStatus::Warning
    } else {
        NodeStatus::Online
    }
}

pub struct NodeHealthMonitor {
    thresholds: HealthThresholds,
    bus: EventBus,
    last_status: DashMap<String, NodeStatus>,
}

impl NodeHealthMonitor {
    pub fn new(thresholds: HealthThresholds, bus: EventBus) -> Self {
        Self {
            thresholds,
            bus,
            last_status: DashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Records a sighting of a node and publishes a `node_status` event
    /// if its derived status changed since the last sighting.
    pub fn observe(
        &self,
        node_id: &str,
        last_seen: DateTime<Utc>,
        latency_ms: f64,
        now: DateTime<Utc>,
    ) -> NodeStatus {
        let status = derive_status(last_seen, latency_ms, now, &self.thresholds);
        let previous = self.last_status.insert(node_id.to_string(), status);
        if previous != Some(status) {
            info!(node = %node_id, status = status.as_str(), "Node status changed");
            self.bus.publish(Event::NodeStatus(NodeStatusEvent {
                node_id: node_id.to_string(),
                status,
                latency_ms,
            }));
        }
        status
    }

    /// Derives without recording; used when listing nodes.
    pub fn peek(&self, last_seen: DateTime<Utc>, latency_ms: f64, now: DateTime<Utc>) -> NodeStatus {
        derive_status(last_seen, latency_ms, now, &self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            freshness: Duration::seconds(300),
            latency_warning_ms: 1500.0,
        }
    }

    #[test]
    fn staleness_beats_latency() {
        let now = Utc::now();
        let stale = now - Duration::seconds(301);
        assert_eq!(
            derive_status(stale, 9000.0, now, &thresholds()),
            NodeStatus::Offline
        );
    }

    #[test]
    fn fresh_but_slow_is_warning() {
        let now = Utc::now();
        assert_eq!(
            derive_status(now, 1501.0, now, &thresholds()),
            NodeStatus::Warning
        );
        assert_eq!(
            derive_status(now, 12.0, now, &thresholds()),
            NodeStatus::Online
        );
    }

    #[tokio::test]
    async fn monitor_publishes_only_on_transition() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let monitor = NodeHealthMonitor::new(thresholds(), bus);
        let now = Utc::now();

        // First sighting is a transition (unknown -> online).
        assert_eq!(monitor.observe("kitchen", now, 10.0, now), NodeStatus::Online);
        // Steady state: no event.
        monitor.observe("kitchen", now, 11.0, now);
        // Degradation: second event.
        monitor.observe("kitchen", now, 2000.0, now);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (Event::NodeStatus(a), Event::NodeStatus(b)) => {
                assert_eq!(a.status, NodeStatus::Online);
                assert_eq!(b.status, NodeStatus::Warning);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
