//! Runtime records, one per service
//!
//! Guards never outlive a single call, so no record lock is ever held across
//! an `.await`.

use std::collections::BTreeMap;

use dashmap::DashMap;
use hb_core::time::current_time_millis;
use hb_core::types::{HealthRecord, LifecycleState, ServiceSnapshot};

#[derive(Default)]
pub struct ServiceTable {
    records: DashMap<String, ServiceSnapshot>,
}

impl ServiceTable {
    pub fn insert(&self, name: &str, port: u16) {
        self.records
            .insert(name.to_string(), ServiceSnapshot::pending(name, port));
    }

    pub fn get(&self, name: &str) -> Option<ServiceSnapshot> {
        self.records.get(name).map(|r| r.value().clone())
    }

    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.records.get(name).map(|r| r.state)
    }

    /// Move a service to `to`, logging the transition
    pub fn transition(&self, name: &str, to: LifecycleState) {
        if let Some(mut record) = self.records.get_mut(name) {
            let from = record.state;
            if from != to {
                record.state = to;
                record.since = current_time_millis();
                tracing::info!(service = name, %from, %to, "Service state changed");
            }
        }
    }

    pub fn update<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut ServiceSnapshot),
    {
        if let Some(mut record) = self.records.get_mut(name) {
            f(record.value_mut());
        }
    }

    /// Record a probe result; returns the consecutive failure count
    pub fn record_health(&self, name: &str, healthy: bool, detail: Option<String>) -> u32 {
        let Some(mut record) = self.records.get_mut(name) else {
            return 0;
        };
        record.last_health = Some(HealthRecord {
            healthy,
            detail: detail.clone(),
            checked_at: current_time_millis(),
        });
        if healthy {
            record.consecutive_failures = 0;
        } else {
            record.consecutive_failures += 1;
            record.last_error = detail;
        }
        record.consecutive_failures
    }

    pub fn snapshot(&self) -> BTreeMap<String, ServiceSnapshot> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_updates_since() {
        let table = ServiceTable::default();
        table.insert("llm", 11434);
        let before = table.get("llm").unwrap().since;

        std::thread::sleep(std::time::Duration::from_millis(5));
        table.transition("llm", LifecycleState::Starting);
        let record = table.get("llm").unwrap();
        assert_eq!(record.state, LifecycleState::Starting);
        assert!(record.since > before);
    }

    #[test]
    fn test_health_counts_consecutive_failures() {
        let table = ServiceTable::default();
        table.insert("llm", 11434);
        assert_eq!(table.record_health("llm", false, Some("timed out".into())), 1);
        assert_eq!(table.record_health("llm", false, Some("timed out".into())), 2);
        assert_eq!(table.record_health("llm", true, None), 0);

        let record = table.get("llm").unwrap();
        assert!(record.last_health.unwrap().healthy);
        assert_eq!(record.last_error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_unknown_service_is_ignored() {
        let table = ServiceTable::default();
        table.transition("ghost", LifecycleState::Running);
        assert_eq!(table.record_health("ghost", true, None), 0);
        assert!(table.snapshot().is_empty());
    }
}
