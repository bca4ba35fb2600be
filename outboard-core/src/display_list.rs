//! Ordered store of finalized plot records
//!
//! Records are kept in the order they were finalized, with a single
//! `current` cursor. Ordinals are handed out at `Begin`, so when streams
//! interleave a record can carry a lower ordinal than the one before it.
//! When a retention limit is set the least recently appended records are
//! evicted after each append, and the cursor is moved off any record before
//! it is removed.

use crate::record::PlotRecord;
use crate::types::Ordinal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Result of a navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavOutcome {
    /// `current` now points at this record
    Moved(Ordinal),
    /// Already at the requested end; `current` unchanged
    AtBoundary(Ordinal),
    /// No records to navigate
    Empty,
}

impl NavOutcome {
    pub fn ordinal(&self) -> Option<Ordinal> {
        match *self {
            NavOutcome::Moved(o) | NavOutcome::AtBoundary(o) => Some(o),
            NavOutcome::Empty => None,
        }
    }

    pub fn moved(&self) -> bool {
        matches!(self, NavOutcome::Moved(_))
    }
}

#[derive(Debug)]
pub struct DisplayList {
    records: VecDeque<PlotRecord>,
    current: Option<usize>,
    next_ordinal: Ordinal,
    retention: Option<NonZeroUsize>,
}

impl DisplayList {
    pub fn new(retention: Option<NonZeroUsize>) -> Self {
        Self {
            records: VecDeque::new(),
            current: None,
            next_ordinal: 1,
            retention,
        }
    }

    pub fn retention(&self) -> Option<NonZeroUsize> {
        self.retention
    }

    /// Change the limit and evict down to it immediately.
    pub fn set_retention(&mut self, retention: Option<NonZeroUsize>) -> Vec<Ordinal> {
        self.retention = retention;
        self.evict_beyond_limit()
    }

    /// Hand out the next ordinal. Ordinals are never reused.
    pub fn reserve_ordinal(&mut self) -> Ordinal {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    /// Ordinal the next `Begin` will receive
    pub fn peek_next_ordinal(&self) -> Ordinal {
        self.next_ordinal
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PlotRecord> {
        self.records.iter()
    }

    pub fn ordinals(&self) -> Vec<Ordinal> {
        self.records.iter().map(PlotRecord::ordinal).collect()
    }

    pub fn current(&self) -> Option<&PlotRecord> {
        self.current.and_then(|i| self.records.get(i))
    }

    pub fn current_ordinal(&self) -> Option<Ordinal> {
        self.current().map(PlotRecord::ordinal)
    }

    /// One-based position of `current` among the retained records
    pub fn current_position(&self) -> Option<usize> {
        self.current.map(|i| i + 1)
    }

    pub fn get(&self, ordinal: Ordinal) -> Option<&PlotRecord> {
        self.index_of(ordinal).map(|i| &self.records[i])
    }

    pub fn contains(&self, ordinal: Ordinal) -> bool {
        self.index_of(ordinal).is_some()
    }

    fn index_of(&self, ordinal: Ordinal) -> Option<usize> {
        self.records.iter().position(|r| r.ordinal() == ordinal)
    }

    /// Add a finalized record at the tail and enforce retention.
    ///
    /// The record just appended is the newest, whatever its ordinal, so it
    /// survives the eviction it triggers. Returns evicted ordinals.
    pub fn append(&mut self, record: PlotRecord) -> Vec<Ordinal> {
        self.records.push_back(record);
        self.evict_beyond_limit()
    }

    /// Drop the earliest appended records until at most `retention` remain.
    ///
    /// `current` is moved to the surviving successor before its record is
    /// popped, so it never dangles.
    pub fn evict_beyond_limit(&mut self) -> Vec<Ordinal> {
        let Some(limit) = self.retention else {
            return Vec::new();
        };
        let mut evicted = Vec::new();
        while self.records.len() > limit.get() {
            self.current = match self.current {
                Some(0) | None => self.current,
                Some(i) => Some(i - 1),
            };
            if let Some(record) = self.records.pop_front() {
                evicted.push(record.ordinal());
            }
        }
        if let Some(cur) = self.current {
            assert!(
                cur < self.records.len(),
                "current record index {} evicted from display list of {}",
                cur,
                self.records.len()
            );
        }
        if !evicted.is_empty() {
            log::debug!("evicted records {:?} (keep {})", evicted, limit);
        }
        evicted
    }

    /// Point `current` at `ordinal` if it is retained.
    pub fn set_current(&mut self, ordinal: Ordinal) -> bool {
        match self.index_of(ordinal) {
            Some(i) => {
                self.current = Some(i);
                true
            }
            None => false,
        }
    }

    pub fn next(&mut self) -> NavOutcome {
        match self.current {
            None => self.first(),
            Some(i) if i + 1 < self.records.len() => self.move_to_index(i + 1),
            Some(i) => NavOutcome::AtBoundary(self.records[i].ordinal()),
        }
    }

    pub fn previous(&mut self) -> NavOutcome {
        match self.current {
            None => self.last(),
            Some(0) => NavOutcome::AtBoundary(self.records[0].ordinal()),
            Some(i) => self.move_to_index(i - 1),
        }
    }

    pub fn first(&mut self) -> NavOutcome {
        if self.records.is_empty() {
            return NavOutcome::Empty;
        }
        if self.current == Some(0) {
            return NavOutcome::AtBoundary(self.records[0].ordinal());
        }
        self.move_to_index(0)
    }

    pub fn last(&mut self) -> NavOutcome {
        if self.records.is_empty() {
            return NavOutcome::Empty;
        }
        let last = self.records.len() - 1;
        if self.current == Some(last) {
            return NavOutcome::AtBoundary(self.records[last].ordinal());
        }
        self.move_to_index(last)
    }

    /// Jump to `ordinal`, or to the retained record with the greatest
    /// ordinal below it.
    ///
    /// An ordinal older than every retained record lands on the first one.
    pub fn goto_ordinal(&mut self, ordinal: Ordinal) -> NavOutcome {
        if self.records.is_empty() {
            return NavOutcome::Empty;
        }
        let index = self.index_of(ordinal).unwrap_or_else(|| {
            self.records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.ordinal() < ordinal)
                .max_by_key(|(_, r)| r.ordinal())
                .map_or(0, |(i, _)| i)
        });
        if self.current == Some(index) {
            return NavOutcome::AtBoundary(self.records[index].ordinal());
        }
        self.move_to_index(index)
    }

    /// Remove the current record.
    ///
    /// `current` moves to the successor, or the predecessor when the tail
    /// was removed. Returns the removed record.
    pub fn delete_current(&mut self) -> Option<PlotRecord> {
        let index = self.current?;
        self.remove_index(index)
    }

    pub fn remove(&mut self, ordinal: Ordinal) -> Option<PlotRecord> {
        let index = self.index_of(ordinal)?;
        self.remove_index(index)
    }

    fn remove_index(&mut self, index: usize) -> Option<PlotRecord> {
        let record = self.records.remove(index)?;
        self.current = match self.current {
            Some(cur) if cur == index => {
                if index < self.records.len() {
                    Some(index)
                } else {
                    index.checked_sub(1)
                }
            }
            Some(cur) if cur > index => Some(cur - 1),
            other => other,
        };
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.current = None;
    }

    fn move_to_index(&mut self, index: usize) -> NavOutcome {
        self.current = Some(index);
        NavOutcome::Moved(self.records[index].ordinal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireOrder;
    use crate::record::RecordBuffer;

    fn record(ordinal: Ordinal) -> PlotRecord {
        let mut buffer = RecordBuffer::new(ordinal, 0);
        buffer.push(b"GE");
        buffer.finalize(WireOrder::Little)
    }

    fn filled(count: u64, keep: Option<usize>) -> DisplayList {
        let mut list = DisplayList::new(keep.and_then(NonZeroUsize::new));
        for _ in 0..count {
            let ordinal = list.reserve_ordinal();
            list.append(record(ordinal));
        }
        list
    }

    #[test]
    fn test_navigation_boundaries() {
        let mut list = filled(3, None);
        assert_eq!(list.current_ordinal(), None);
        assert_eq!(list.next(), NavOutcome::Moved(1));
        assert_eq!(list.previous(), NavOutcome::AtBoundary(1));
        assert_eq!(list.last(), NavOutcome::Moved(3));
        assert_eq!(list.next(), NavOutcome::AtBoundary(3));
        assert_eq!(list.last(), NavOutcome::AtBoundary(3));
        assert_eq!(list.previous(), NavOutcome::Moved(2));
    }

    #[test]
    fn test_empty_list() {
        let mut list = DisplayList::new(None);
        assert_eq!(list.next(), NavOutcome::Empty);
        assert_eq!(list.first(), NavOutcome::Empty);
        assert_eq!(list.goto_ordinal(4), NavOutcome::Empty);
        assert!(list.delete_current().is_none());
    }

    #[test]
    fn test_retention_repoints_current() {
        let mut list = DisplayList::new(NonZeroUsize::new(2));
        let first = list.reserve_ordinal();
        list.append(record(first));
        list.set_current(first);
        let second = list.reserve_ordinal();
        list.append(record(second));

        let third = list.reserve_ordinal();
        let evicted = list.append(record(third));
        assert_eq!(evicted, vec![1]);
        assert_eq!(list.ordinals(), vec![2, 3]);
        assert_eq!(list.current_ordinal(), Some(2));
    }

    #[test]
    fn test_delete_current_moves_to_neighbour() {
        let mut list = filled(3, None);
        list.set_current(2);
        assert_eq!(list.delete_current().unwrap().ordinal(), 2);
        assert_eq!(list.current_ordinal(), Some(3));

        assert_eq!(list.delete_current().unwrap().ordinal(), 3);
        assert_eq!(list.current_ordinal(), Some(1));

        list.delete_current();
        assert!(list.is_empty());
        assert_eq!(list.current_ordinal(), None);
    }

    #[test]
    fn test_goto_missing_ordinal() {
        let mut list = filled(5, Some(3));
        assert_eq!(list.ordinals(), vec![3, 4, 5]);
        assert_eq!(list.goto_ordinal(1), NavOutcome::Moved(3));
        assert_eq!(list.goto_ordinal(4), NavOutcome::Moved(4));
        assert_eq!(list.goto_ordinal(99), NavOutcome::Moved(5));
        assert_eq!(list.goto_ordinal(80), NavOutcome::AtBoundary(5));
    }

    #[test]
    fn test_out_of_order_append() {
        let mut list = DisplayList::new(None);
        let early = list.reserve_ordinal();
        let late = list.reserve_ordinal();
        list.append(record(late));
        list.set_current(late);
        list.append(record(early));

        assert_eq!(list.ordinals(), vec![late, early]);
        assert_eq!(list.current_ordinal(), Some(late));
        assert_eq!(list.current_position(), Some(1));
        assert_eq!(list.next(), NavOutcome::Moved(early));
    }

    #[test]
    fn test_late_low_ordinal_survives_its_own_append() {
        let mut list = DisplayList::new(NonZeroUsize::new(2));
        let slow = list.reserve_ordinal();
        let a = list.reserve_ordinal();
        list.append(record(a));
        let b = list.reserve_ordinal();
        list.append(record(b));

        let evicted = list.append(record(slow));
        assert_eq!(evicted, vec![a]);
        assert!(list.contains(slow));
        assert!(list.set_current(slow));
        assert_eq!(list.ordinals(), vec![b, slow]);
    }

    #[test]
    fn test_goto_between_interleaved_ordinals() {
        let mut list = DisplayList::new(None);
        for ordinal in [4, 1, 6] {
            list.append(record(ordinal));
        }
        assert_eq!(list.goto_ordinal(5), NavOutcome::Moved(4));
        assert_eq!(list.goto_ordinal(3), NavOutcome::Moved(1));
        assert_eq!(list.goto_ordinal(0), NavOutcome::Moved(4));
        assert_eq!(list.goto_ordinal(6), NavOutcome::Moved(6));
    }

    #[test]
    fn test_shrinking_retention() {
        let mut list = filled(4, None);
        list.set_current(1);
        let evicted = list.set_retention(NonZeroUsize::new(1));
        assert_eq!(evicted, vec![1, 2, 3]);
        assert_eq!(list.current_ordinal(), Some(4));
    }
}
