//! The in-memory waiting list.

use std::collections::VecDeque;

use dareduel_types::{Coins, Timestamp, UserId};

/// One unmatched stake/dare proposal. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub requester: UserId,
    pub display_name: String,
    pub dare: String,
    pub wager_coins: Coins,
    pub enqueued_at: Timestamp,
}

impl QueueEntry {
    /// Two entries can be paired when they come from different users and
    /// stake the same amount.
    pub fn is_compatible(&self, other: &QueueEntry) -> bool {
        self.requester != other.requester && self.wager_coins == other.wager_coins
    }
}

/// First-come-first-served pairing queue.
///
/// The queue never holds two compatible entries at once: an arriving entry
/// is paired with the earliest compatible waiting entry, or waits.
#[derive(Debug, Default)]
pub struct MatchQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.entries.iter().any(|e| &e.requester == user)
    }

    /// Add an entry. If a compatible entry is waiting, the earliest one is
    /// removed and returned together with the new entry as
    /// `(earlier, arriving)`.
    ///
    /// Unpaired entries are kept in `enqueued_at` order, so a requeued entry
    /// keeps its original place in line.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Option<(QueueEntry, QueueEntry)> {
        if let Some(pos) = self.entries.iter().position(|e| e.is_compatible(&entry)) {
            let waiting = self.entries.remove(pos)?;
            return Some((waiting, entry));
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.enqueued_at > entry.enqueued_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
        None
    }

    /// Remove the user's unpaired entry, if any.
    pub fn cancel(&mut self, user: &UserId) -> Option<QueueEntry> {
        let pos = self.entries.iter().position(|e| &e.requester == user)?;
        self.entries.remove(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, wager: u64, at: u64) -> QueueEntry {
        QueueEntry {
            requester: UserId::parse(user).unwrap(),
            display_name: user.to_uppercase(),
            dare: format!("{user}'s dare"),
            wager_coins: Coins::new(wager),
            enqueued_at: Timestamp::new(at),
        }
    }

    #[test]
    fn pairs_earliest_compatible_entry() {
        let mut q = MatchQueue::new();
        assert!(q.enqueue(entry("a", 20, 1)).is_none());
        assert!(q.enqueue(entry("b", 10, 2)).is_none());
        assert!(q.enqueue(entry("c", 20, 3)).is_some_and(|(w, n)| {
            w.requester.as_str() == "a" && n.requester.as_str() == "c"
        }));
        assert_eq!(q.len(), 1);
        assert!(q.contains(&UserId::parse("b").unwrap()));
    }

    #[test]
    fn same_user_never_pairs_with_itself() {
        let mut q = MatchQueue::new();
        assert!(q.enqueue(entry("a", 20, 1)).is_none());
        assert!(q.enqueue(entry("a", 20, 2)).is_none());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn cancel_removes_only_unpaired_entries() {
        let mut q = MatchQueue::new();
        q.enqueue(entry("a", 20, 1));
        let a = UserId::parse("a").unwrap();
        assert!(q.cancel(&a).is_some());
        assert!(q.cancel(&a).is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn requeued_entry_keeps_its_place() {
        let mut q = MatchQueue::new();
        q.enqueue(entry("late", 5, 10));
        q.enqueue(entry("early", 7, 1));
        let first = q.cancel(&UserId::parse("early").unwrap());
        assert!(first.is_some());
        q.enqueue(entry("early", 7, 1));
        assert_eq!(q.entries[0].requester.as_str(), "early");
    }
}
