//! The service lifecycle state machine (spec §2, §4.1):
//! `CREATED -> INITIALIZING -> INITIALIZED -> STARTING -> RUNNING ->
//! STOPPING -> STOPPED -> CLEANED_UP`, with `FAILED` reachable from any
//! non-terminal state.

use aiperf_core::model::ServiceState;

use aiperf_core::error::{AiPerfError, Result};

/// Returns the states `from` is permitted to transition into.
fn allowed_next(from: ServiceState) -> &'static [ServiceState] {
    use ServiceState::*;
    match from {
        Created => &[Initializing, Failed],
        Initializing => &[Initialized, Failed],
        Initialized => &[Starting, Failed],
        Starting => &[Running, Failed],
        Running => &[Stopping, Failed],
        Stopping => &[Stopped, Failed],
        Stopped => &[CleanedUp, Failed],
        CleanedUp => &[],
        Failed => &[],
    }
}

pub fn is_terminal(state: &ServiceState) -> bool {
    matches!(state, ServiceState::CleanedUp | ServiceState::Failed)
}

/// Validates and applies a transition, matching the Design Notes'
/// replacement of decorator dispatch with an explicit, testable transition
/// table.
pub fn transition(current: &mut ServiceState, next: ServiceState, service_id: &str) -> Result<()> {
    if allowed_next(current.clone()).contains(&next) {
        *current = next;
        Ok(())
    } else {
        Err(AiPerfError::Initialization {
            service_id: service_id.to_string(),
            reason: format!("illegal state transition {current:?} -> {next:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_path_is_legal() {
        let mut s = ServiceState::Created;
        for next in [
            ServiceState::Initializing,
            ServiceState::Initialized,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Stopping,
            ServiceState::Stopped,
            ServiceState::CleanedUp,
        ] {
            transition(&mut s, next.clone(), "svc").expect("legal transition");
            assert_eq!(s, next);
        }
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut s = ServiceState::Created;
        assert!(transition(&mut s, ServiceState::Running, "svc").is_err());
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_state() {
        let mut s = ServiceState::Starting;
        transition(&mut s, ServiceState::Failed, "svc").expect("fail transition");
        assert!(is_terminal(&s));
    }

    #[test]
    fn terminal_states_accept_no_further_transitions() {
        let mut s = ServiceState::CleanedUp;
        assert!(transition(&mut s, ServiceState::Initializing, "svc").is_err());
    }
}
