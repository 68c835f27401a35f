//! Id-keyed cached collection with the reconciliation rules every store uses.

use classroom_shared::{Identified, RecordId};

/// What [`Collection::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Merged,
}

/// Ordered records, at most one per id.
///
/// Every path that adds a record goes through [`Collection::upsert`], so a
/// record confirmed by a response and then announced again by a live event is
/// held once, in the position it was first seen.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    stale: bool,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            stale: false,
        }
    }
}

impl<T: Identified + Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Replace the contents with a full fetch. Clears the stale flag.
    ///
    /// Should the server repeat an id, the later copy wins and keeps the
    /// earlier position.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            self.upsert(item);
        }
        self.stale = false;
    }

    /// Insert a record, or replace the one with the same id in place.
    pub fn upsert(&mut self, item: T) -> Upsert {
        match self.get_mut(item.id()) {
            Some(existing) => {
                *existing = item;
                Upsert::Merged
            }
            None => {
                self.items.push(item);
                Upsert::Inserted
            }
        }
    }

    /// Replace the record with the same id wholesale.
    ///
    /// A record the cache does not hold is not appended: the cache is marked
    /// stale instead so its owner can refetch. Returns whether a record was
    /// replaced.
    pub fn replace_existing(&mut self, item: T) -> bool {
        match self.get_mut(item.id()) {
            Some(existing) => {
                *existing = item;
                true
            }
            None => {
                tracing::warn!(id = item.id(), "update for a record not in cache, marking stale");
                self.stale = true;
                false
            }
        }
    }

    pub fn remove(&mut self, id: RecordId) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    /// A server-confirmed update referenced a record this cache never saw.
    pub fn needs_refresh(&self) -> bool {
        self.stale
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        id: RecordId,
        label: &'static str,
    }

    impl Identified for Rec {
        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn rec(id: RecordId, label: &'static str) -> Rec {
        Rec { id, label }
    }

    #[test]
    fn optimistic_insert_then_live_event_keeps_one_copy() {
        let mut cache = Collection::new();
        cache.upsert(rec(1, "existing"));

        assert_eq!(cache.upsert(rec(42, "from response")), Upsert::Inserted);
        assert_eq!(cache.upsert(rec(42, "from live event")), Upsert::Merged);

        assert_eq!(cache.iter().filter(|r| r.id == 42).count(), 1);
        assert_eq!(cache.get(42).unwrap().label, "from live event");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn merge_keeps_first_position() {
        let mut cache = Collection::new();
        cache.replace_all(vec![rec(1, "a"), rec(2, "b"), rec(3, "c")]);
        cache.upsert(rec(2, "b2"));
        let labels: Vec<_> = cache.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["a", "b2", "c"]);
    }

    #[test]
    fn replacement_of_absent_id_is_ignored_and_marks_stale() {
        let mut cache = Collection::new();
        cache.replace_all(vec![rec(1, "a")]);

        assert!(!cache.replace_existing(rec(9, "ghost")));
        assert!(!cache.contains(9));
        assert!(cache.needs_refresh());

        cache.replace_all(vec![rec(1, "a"), rec(9, "real")]);
        assert!(!cache.needs_refresh());
    }

    #[test]
    fn replacement_swaps_record_wholesale() {
        let mut cache = Collection::new();
        cache.replace_all(vec![rec(5, "ungraded")]);
        assert!(cache.replace_existing(rec(5, "graded")));
        assert_eq!(cache.items(), &[rec(5, "graded")]);
        assert!(!cache.needs_refresh());
    }

    #[test]
    fn full_fetch_with_duplicate_ids_holds_one() {
        let mut cache = Collection::new();
        cache.replace_all(vec![rec(1, "old"), rec(2, "b"), rec(1, "new")]);
        assert_eq!(cache.items(), &[rec(1, "new"), rec(2, "b")]);
    }
}
