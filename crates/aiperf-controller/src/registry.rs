//! Tracks which planned services have registered, their last heartbeat,
//! and which are still missing — the controller-side bookkeeping for spec
//! §4.2's registration gate and §4.3's heartbeat monitoring. Grounded on
//! the teacher's `WorkerPool` (a tracked set of live handles, pruned as
//! they disconnect) generalized from one homogeneous pool to a mixed set
//! of service types.

use std::collections::{HashMap, HashSet};

use aiperf_core::model::ServiceRegistration;

/// Bookkeeping for one benchmark run's set of expected service processes.
pub struct Registry {
    expected: HashSet<String>,
    registered: HashMap<String, ServiceRegistration>,
    last_heartbeat_ns: HashMap<String, u64>,
}

impl Registry {
    pub fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            registered: HashMap::new(),
            last_heartbeat_ns: HashMap::new(),
        }
    }

    /// Records a `REGISTER` announcement. Registrations for a service id
    /// this run didn't plan to spawn are ignored (stale process from a
    /// prior run reusing the same bus address).
    pub fn record_registration(&mut self, registration: ServiceRegistration) {
        if self.expected.contains(&registration.service_id) {
            self.registered.insert(registration.service_id.clone(), registration);
        }
    }

    pub fn record_heartbeat(&mut self, service_id: &str, now_ns: u64) {
        if self.expected.contains(service_id) {
            self.last_heartbeat_ns.insert(service_id.to_string(), now_ns);
        }
    }

    pub fn is_fully_registered(&self) -> bool {
        self.expected.iter().all(|id| self.registered.contains_key(id))
    }

    pub fn missing(&self) -> Vec<String> {
        self.expected.iter().filter(|id| !self.registered.contains_key(*id)).cloned().collect()
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.expected.iter().map(|s| s.as_str())
    }

    /// Service ids that have registered but never heartbeated, or whose
    /// last heartbeat is older than `timeout_secs`. A service that hasn't
    /// heartbeated yet is only flagged once `timeout_secs` has elapsed
    /// since `run_start_ns`, so the check doesn't fire before the first
    /// heartbeat tick is even due.
    pub fn stale(&self, now_ns: u64, run_start_ns: u64, timeout_secs: f64) -> Vec<String> {
        let timeout_ns = (timeout_secs * 1_000_000_000.0) as u64;
        self.expected
            .iter()
            .filter(|id| {
                let baseline = self.last_heartbeat_ns.get(*id).copied().unwrap_or(run_start_ns);
                now_ns.saturating_sub(baseline) > timeout_ns
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::model::ServiceState;

    fn registration(id: &str) -> ServiceRegistration {
        ServiceRegistration {
            service_id: id.to_string(),
            service_type: "worker".to_string(),
            pid: 1,
            state: ServiceState::Initialized,
            last_heartbeat_ns: 0,
            required_clients: Vec::new(),
        }
    }

    #[test]
    fn fully_registered_only_after_every_expected_id_arrives() {
        let mut registry = Registry::new(["a".to_string(), "b".to_string()]);
        assert!(!registry.is_fully_registered());
        registry.record_registration(registration("a"));
        assert!(!registry.is_fully_registered());
        registry.record_registration(registration("b"));
        assert!(registry.is_fully_registered());
    }

    #[test]
    fn missing_lists_unregistered_ids() {
        let mut registry = Registry::new(["a".to_string(), "b".to_string()]);
        registry.record_registration(registration("a"));
        assert_eq!(registry.missing(), vec!["b".to_string()]);
    }

    #[test]
    fn unexpected_registration_is_ignored() {
        let mut registry = Registry::new(["a".to_string()]);
        registry.record_registration(registration("ghost"));
        assert!(!registry.registered.contains_key("ghost"));
    }

    #[test]
    fn stale_flags_ids_past_timeout_with_no_heartbeat() {
        let registry = Registry::new(["a".to_string()]);
        let run_start_ns = 0;
        let now_ns = 5_000_000_000;
        assert_eq!(registry.stale(now_ns, run_start_ns, 1.0), vec!["a".to_string()]);
        assert!(registry.stale(now_ns, run_start_ns, 10.0).is_empty());
    }

    #[test]
    fn stale_resets_on_heartbeat() {
        let mut registry = Registry::new(["a".to_string()]);
        registry.record_heartbeat("a", 1_000_000_000);
        assert!(registry.stale(2_000_000_000, 0, 10.0).is_empty());
    }
}
