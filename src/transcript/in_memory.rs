//! In-memory transcript store implementation.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{CallerId, TranscriptStore, Turn};

/// An in-memory transcript store backed by a mutex-protected hash map.
///
/// The single mutex serializes every append/snapshot/clear, which satisfies
/// the per-caller linearizability contract; no lock is ever held across an
/// await point, so different callers contend only for the duration of a
/// HashMap operation.
pub struct InMemoryTranscriptStore {
    sessions: Mutex<HashMap<CallerId, Vec<Turn>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore for InMemoryTranscriptStore {
    fn append(&self, caller: &CallerId, turn: Turn) {
        let mut sessions = self.sessions.lock();
        sessions.entry(caller.clone()).or_default().push(turn);
    }

    fn snapshot(&self, caller: &CallerId) -> Vec<Turn> {
        let sessions = self.sessions.lock();
        sessions.get(caller).cloned().unwrap_or_default()
    }

    fn clear(&self, caller: &CallerId) {
        let mut sessions = self.sessions.lock();
        sessions.remove(caller);
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::Topic;
    use std::sync::Arc;

    fn caller(number: &str) -> CallerId {
        CallerId::from(number)
    }

    #[test]
    fn snapshot_of_unknown_caller_is_empty() {
        let store = InMemoryTranscriptStore::new();
        assert!(store.snapshot(&caller("+15550001")).is_empty());
    }

    #[test]
    fn appends_are_returned_in_order_without_loss() {
        let store = InMemoryTranscriptStore::new();
        let key = caller("+15550001");

        for i in 0..5 {
            store.append(
                &key,
                Turn::new(Topic::Science, &format!("question {i}"), "answer"),
            );
        }

        let turns = store.snapshot(&key);
        assert_eq!(turns.len(), 5);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.question, format!("question {i}"));
        }
    }

    #[test]
    fn repeated_appends_are_not_deduplicated() {
        let store = InMemoryTranscriptStore::new();
        let key = caller("+15550001");
        let turn = Turn::new(Topic::History, "when was rome founded", "753 BC");

        store.append(&key, turn.clone());
        store.append(&key, turn);

        assert_eq!(store.snapshot(&key).len(), 2);
    }

    #[test]
    fn callers_do_not_observe_each_other() {
        let store = InMemoryTranscriptStore::new();
        let a = caller("+15550001");
        let b = caller("+15550002");

        store.append(&a, Turn::new(Topic::Mathematics, "what is pi", "3.14159"));
        store.append(&b, Turn::new(Topic::Science, "what is dna", "a molecule"));

        assert_eq!(store.snapshot(&a).len(), 1);
        assert_eq!(store.snapshot(&a)[0].question, "what is pi");
        assert_eq!(store.snapshot(&b).len(), 1);

        store.clear(&a);
        assert!(store.snapshot(&a).is_empty());
        assert_eq!(store.snapshot(&b).len(), 1);
    }

    #[test]
    fn clear_then_snapshot_is_empty() {
        let store = InMemoryTranscriptStore::new();
        let key = caller("+15550001");
        store.append(&key, Turn::new(Topic::Science, "q", "a"));

        store.clear(&key);
        assert!(store.snapshot(&key).is_empty());

        // clearing an absent session is a no-op
        store.clear(&key);
        assert!(store.snapshot(&key).is_empty());
    }

    #[test]
    fn concurrent_appends_from_distinct_callers_all_land() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let mut handles = Vec::new();

        for c in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let key = CallerId(format!("+1555000{c}"));
                for i in 0..50 {
                    store.append(&key, Turn::new(Topic::Science, &format!("q{i}"), "a"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for c in 0..4 {
            let key = CallerId(format!("+1555000{c}"));
            let turns = store.snapshot(&key);
            assert_eq!(turns.len(), 50);
            // per-caller order is preserved even under cross-caller contention
            for (i, turn) in turns.iter().enumerate() {
                assert_eq!(turn.question, format!("q{i}"));
            }
        }
    }

    #[test]
    fn store_name() {
        assert_eq!(InMemoryTranscriptStore::new().name(), "in_memory");
    }
}
