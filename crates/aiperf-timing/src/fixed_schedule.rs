//! Fixed-schedule credit scheduling (spec §4.5 "Fixed-schedule mode"),
//! grounded on `timing/strategies/fixed_schedule.py`: credits are dropped at
//! the offsets recorded in the trace file rather than computed from a rate
//! or concurrency target.

use aiperf_dataset::ScheduleEntry;

/// One resolved drop instruction: nanoseconds from t0, and the session the
/// dataset manager should be asked for (falling back to sequential-cyclic
/// selection when the trace row carried no `session_id`).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledDrop {
    pub drop_offset_ns: u64,
    pub session_id: Option<String>,
    pub should_cancel: bool,
    pub cancel_after_ns: Option<u64>,
}

/// Converts a trace's absolute millisecond timestamps into offsets from the
/// first entry's timestamp, preserving the ascending order `load_fixed_schedule`
/// already sorted into.
pub fn resolve(entries: &[ScheduleEntry]) -> Vec<ScheduledDrop> {
    let Some(first) = entries.first() else { return Vec::new() };
    let t0 = first.timestamp_ms;
    entries
        .iter()
        .map(|entry| ScheduledDrop {
            drop_offset_ns: (((entry.timestamp_ms - t0) + entry.delay_ms).max(0.0) * 1e6) as u64,
            session_id: entry.session_id.clone(),
            should_cancel: entry.should_cancel,
            cancel_after_ns: entry.cancel_after_ns,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: f64, session: &str) -> ScheduleEntry {
        ScheduleEntry {
            timestamp_ms: ts,
            delay_ms: 0.0,
            session_id: Some(session.to_string()),
            should_cancel: false,
            cancel_after_ns: None,
        }
    }

    #[test]
    fn offsets_are_relative_to_first_timestamp() {
        let entries = vec![entry(100.0, "a"), entry(150.0, "b"), entry(400.0, "c")];
        let resolved = resolve(&entries);
        assert_eq!(resolved[0].drop_offset_ns, 0);
        assert_eq!(resolved[1].drop_offset_ns, 50_000_000);
        assert_eq!(resolved[2].drop_offset_ns, 300_000_000);
    }

    #[test]
    fn empty_schedule_resolves_to_empty() {
        assert!(resolve(&[]).is_empty());
    }
}
