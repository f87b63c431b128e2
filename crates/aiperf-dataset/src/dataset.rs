//! In-memory conversation store shared by synthetic, custom, and
//! fixed-schedule construction modes (spec §4.4): sequential-cyclic
//! iteration by default, honoring an explicitly supplied `session_id` when
//! present (Open Question resolution, SPEC_FULL.md §9 item 3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use rand::rngs::StdRng;

use aiperf_core::model::Conversation;

/// One entry of a fixed-schedule trace (spec §4.4 "Fixed schedule", §4.5
/// "Fixed-schedule mode"): when to drop the credit and which conversation
/// it belongs to, plus optional per-entry cancellation.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub timestamp_ms: f64,
    pub delay_ms: f64,
    pub session_id: Option<String>,
    pub should_cancel: bool,
    pub cancel_after_ns: Option<u64>,
}

pub struct DatasetStore {
    conversations: Vec<Conversation>,
    by_session_id: HashMap<String, usize>,
    next_index: AtomicUsize,
    /// Synthetic datasets may select randomly (spec §4.4: "for synthetic
    /// the selection may be random"); custom/fixed-schedule datasets are
    /// always sequential and cyclic (spec §8 invariant).
    random_selection: bool,
}

impl DatasetStore {
    pub fn new(conversations: Vec<Conversation>, random_selection: bool) -> Self {
        let by_session_id = conversations
            .iter()
            .enumerate()
            .map(|(idx, convo)| (convo.session_id.clone(), idx))
            .collect();
        Self {
            conversations,
            by_session_id,
            next_index: AtomicUsize::new(0),
            random_selection,
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// `GET_CONVERSATION { session_id? }`: honors `session_id` if it names
    /// a loaded conversation, else falls back to this store's selection
    /// policy (sequential-cyclic for custom data, optionally random for
    /// synthetic).
    pub fn get(&self, session_id: Option<&str>, rng: &mut StdRng) -> Option<Conversation> {
        if self.conversations.is_empty() {
            return None;
        }
        if let Some(id) = session_id {
            if let Some(&idx) = self.by_session_id.get(id) {
                return Some(self.conversations[idx].clone());
            }
        }
        let idx = if self.random_selection {
            rng.random_range(0..self.conversations.len())
        } else {
            self.next_index.fetch_add(1, Ordering::Relaxed) % self.conversations.len()
        };
        Some(self.conversations[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::model::Turn;
    use rand::SeedableRng;

    fn sample_store(random: bool) -> DatasetStore {
        let conversations = (0..3)
            .map(|i| Conversation::with_session_id(format!("s{i}"), vec![Turn::default()]))
            .collect();
        DatasetStore::new(conversations, random)
    }

    #[test]
    fn sequential_iteration_is_cyclic_from_index_zero() {
        let store = sample_store(false);
        let mut rng = StdRng::seed_from_u64(0);
        let ids: Vec<_> = (0..6).map(|_| store.get(None, &mut rng).unwrap().session_id).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2", "s0", "s1", "s2"]);
    }

    #[test]
    fn explicit_session_id_is_honored_over_sequential_order() {
        let store = sample_store(false);
        let mut rng = StdRng::seed_from_u64(0);
        let convo = store.get(Some("s1"), &mut rng).unwrap();
        assert_eq!(convo.session_id, "s1");
    }

    #[test]
    fn unknown_session_id_falls_back_to_selection_policy() {
        let store = sample_store(false);
        let mut rng = StdRng::seed_from_u64(0);
        let convo = store.get(Some("does-not-exist"), &mut rng).unwrap();
        assert_eq!(convo.session_id, "s0");
    }
}
