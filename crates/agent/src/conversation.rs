use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use switchboard_core::{ConversationTurn, SessionId, TurnRecord};
use tracing::debug;

#[derive(Debug, Default)]
struct SessionLog {
    turns: VecDeque<ConversationTurn>,
    next_sequence: u64,
    retired: bool,
}

/// Bounded per-session turn history.
///
/// Sessions live in a sharded map; each session has its own mutex, so
/// appends to one session never wait on another. `clear` retires the
/// session's log before unlinking it, and an append that raced with the
/// clear retries against a fresh log.
#[derive(Debug)]
pub struct ConversationStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionLog>>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self { sessions: DashMap::new(), max_turns: max_turns.max(1) }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn append(&self, session_id: &SessionId, record: TurnRecord) -> ConversationTurn {
        loop {
            let session = Arc::clone(self.sessions.entry(session_id.clone()).or_default().value());
            let mut log = session.lock();
            if log.retired {
                continue;
            }

            log.next_sequence += 1;
            let turn = ConversationTurn {
                session_id: session_id.clone(),
                sequence: log.next_sequence,
                recorded_at: Utc::now(),
                instruction: record.instruction,
                invocation: record.invocation,
                contacts: record.contacts,
            };
            log.turns.push_back(turn.clone());

            let mut evicted = 0usize;
            while log.turns.len() > self.max_turns {
                log.turns.pop_front();
                evicted += 1;
            }
            if evicted > 0 {
                debug!(
                    event_name = "agent.conversation.evicted",
                    session_id = %session_id,
                    evicted,
                    retained = log.turns.len(),
                    "oldest turns evicted"
                );
            }

            return turn;
        }
    }

    /// Most recent last. `limit` keeps only the newest `limit` turns.
    pub fn history(&self, session_id: &SessionId, limit: Option<usize>) -> Vec<ConversationTurn> {
        let Some(session) = self.session(session_id) else {
            return Vec::new();
        };
        let log = session.lock();
        let take = limit.unwrap_or(log.turns.len()).min(log.turns.len());
        log.turns.iter().skip(log.turns.len() - take).cloned().collect()
    }

    /// Contacts mentioned in retained turns, newest first, without duplicates.
    pub fn recent_contacts(&self, session_id: &SessionId) -> Vec<String> {
        let Some(session) = self.session(session_id) else {
            return Vec::new();
        };
        let log = session.lock();
        let mut contacts: Vec<String> = Vec::new();
        for turn in log.turns.iter().rev() {
            for contact in turn.contacts.iter().rev() {
                if !contacts.contains(contact) {
                    contacts.push(contact.clone());
                }
            }
        }
        contacts
    }

    pub fn clear(&self, session_id: &SessionId) {
        let Some(session) = self.session(session_id) else {
            return;
        };
        let mut log = session.lock();
        log.turns.clear();
        log.retired = true;
        self.sessions.remove_if(session_id, |_, current| Arc::ptr_eq(current, &session));
        debug!(event_name = "agent.conversation.cleared", session_id = %session_id, "session cleared");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, session_id: &SessionId) -> Option<Arc<Mutex<SessionLog>>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_core::{Invocation, NoMatchReason, SessionId, TurnRecord};

    use super::ConversationStore;

    fn record(instruction: &str) -> TurnRecord {
        TurnRecord {
            instruction: instruction.to_string(),
            invocation: Invocation::none(NoMatchReason::NoMatch, None),
            contacts: Vec::new(),
        }
    }

    fn instructions(store: &ConversationStore, session: &SessionId) -> Vec<String> {
        store.history(session, None).into_iter().map(|turn| turn.instruction).collect()
    }

    #[test]
    fn eviction_keeps_newest_turns_in_order() {
        let store = ConversationStore::new(3);
        let session = SessionId::from("s1");
        for index in 1..=5 {
            store.append(&session, record(&format!("turn {index}")));
        }

        assert_eq!(instructions(&store, &session), vec!["turn 3", "turn 4", "turn 5"]);
        let sequences: Vec<u64> =
            store.history(&session, None).iter().map(|turn| turn.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn history_limit_returns_most_recent_without_mutation() {
        let store = ConversationStore::new(10);
        let session = SessionId::from("s1");
        for index in 1..=4 {
            store.append(&session, record(&format!("turn {index}")));
        }

        let limited: Vec<String> =
            store.history(&session, Some(2)).into_iter().map(|turn| turn.instruction).collect();
        assert_eq!(limited, vec!["turn 3", "turn 4"]);
        assert_eq!(store.history(&session, Some(0)).len(), 0);
        assert_eq!(store.history(&session, None).len(), 4);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = ConversationStore::new(10);
        store.append(&SessionId::from("A"), record("only in A"));

        assert!(store.history(&SessionId::from("B"), None).is_empty());
        assert_eq!(store.history(&SessionId::from("A"), None).len(), 1);
    }

    #[test]
    fn clear_is_idempotent_and_tolerates_unknown_sessions() {
        let store = ConversationStore::new(10);
        let session = SessionId::from("s1");
        store.append(&session, record("hello"));

        store.clear(&session);
        store.clear(&session);
        store.clear(&SessionId::from("never-seen"));

        assert!(store.history(&session, None).is_empty());
        assert_eq!(store.session_count(), 0);

        let turn = store.append(&session, record("after clear"));
        assert_eq!(turn.sequence, 1);
    }

    #[test]
    fn recent_contacts_are_newest_first() {
        let store = ConversationStore::new(10);
        let session = SessionId::from("s1");
        for contacts in [vec!["John"], vec!["Maria"], vec!["John"]] {
            store.append(
                &session,
                TurnRecord {
                    contacts: contacts.into_iter().map(str::to_string).collect(),
                    ..record("x")
                },
            );
        }

        assert_eq!(store.recent_contacts(&session), vec!["John", "Maria"]);
    }

    #[test]
    fn concurrent_appends_keep_sequences_strictly_increasing() {
        let store = Arc::new(ConversationStore::new(1_000));
        let session = SessionId::from("shared");

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                let session = session.clone();
                std::thread::spawn(move || {
                    for index in 0..50 {
                        store.append(&session, record(&format!("{worker}-{index}")));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread");
        }

        let sequences: Vec<u64> =
            store.history(&session, None).iter().map(|turn| turn.sequence).collect();
        assert_eq!(sequences.len(), 400);
        assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn appends_racing_clears_land_on_a_fresh_log() {
        let store = Arc::new(ConversationStore::new(5));
        let session = SessionId::from("shared");

        let appenders: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let session = session.clone();
                std::thread::spawn(move || {
                    for index in 0..200 {
                        let turn = store.append(&session, record(&format!("{worker}-{index}")));
                        assert!(turn.sequence >= 1);
                    }
                })
            })
            .collect();
        let clearer = {
            let store = Arc::clone(&store);
            let session = session.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    store.clear(&session);
                    let history = store.history(&session, None);
                    assert!(history.len() <= 5);
                    assert!(history.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
                    std::thread::yield_now();
                }
            })
        };

        for appender in appenders {
            appender.join().expect("appender thread");
        }
        clearer.join().expect("clearer thread");

        let history = store.history(&session, None);
        assert!(history.len() <= 5);
        assert!(history.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
        assert!(store.session_count() <= 1);

        store.append(&session, record("after the race"));
        let latest = store.history(&session, Some(1));
        assert_eq!(latest[0].instruction, "after the race");
        assert!(store.history(&session, None).len() <= 5);
    }
}
