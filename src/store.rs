//! Cached timelines, one ordered table per (account, feed) scope.
//!
//! Each row holds the status as serialized JSON plus the flags that can change
//! without refetching it. All writes to a scope go through its lock, so a page
//! merge is never observed half applied and merges are applied in the order
//! they acquired the lock.

use crate::api::{Poll, Status, StatusId};
use crate::config::SessionConfig;
use crate::entry::{EntryFlags, FeedEntry, Flag};
use crate::error::*;
use crate::feed::FeedKind;
use crate::gap::EntryTable;
use crate::invalidation::Invalidation;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;

/// Rows of one account's copy of one feed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Scope {
    pub account: String,
    pub feed: FeedKind,
}

impl Scope {
    pub fn new<S: Into<String>>(account: S, feed: FeedKind) -> Self {
        Scope {
            account: account.into(),
            feed,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Row {
    Status { payload: String, flags: EntryFlags },
    Placeholder { loading: bool, anchor: Option<StatusId> },
}

impl Row {
    fn is_placeholder(&self) -> bool {
        match *self {
            Row::Status { .. } => false,
            Row::Placeholder { .. } => true,
        }
    }

    fn to_entry(&self, id: &StatusId) -> Result<FeedEntry> {
        match *self {
            Row::Status { ref payload, ref flags } => {
                let status = decode(payload)?;
                Ok(FeedEntry::Concrete(flags.apply(status)))
            }
            Row::Placeholder { loading, ref anchor } => Ok(FeedEntry::Placeholder {
                id: id.clone(),
                loading,
                anchor: anchor.clone(),
            }),
        }
    }
}

fn decode(payload: &str) -> Result<Status> {
    serde_json::from_str(payload).chain_err(|| ErrorKind::Decode(payload.to_string()))
}

fn encode(status: &Status) -> Result<String> {
    serde_json::to_string(status).chain_err(|| {
        ErrorKind::Storage(format!("could not serialize status {}", status.id))
    })
}

/// The ordered table behind one scope. Mutated only inside
/// [`StatusStore::transaction`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rows {
    rows: BTreeMap<StatusId, Row>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &StatusId) -> Result<Option<FeedEntry>> {
        match self.rows.get(id) {
            Some(row) => row.to_entry(id).map(Some),
            None => Ok(None),
        }
    }

    pub fn is_placeholder(&self, id: &StatusId) -> bool {
        self.rows.get(id).map_or(false, Row::is_placeholder)
    }

    pub fn newest_concrete_id(&self) -> Option<StatusId> {
        self.rows
            .iter()
            .rev()
            .find(|&(_, row)| !row.is_placeholder())
            .map(|(id, _)| id.clone())
    }

    pub fn oldest_concrete_id(&self) -> Option<StatusId> {
        self.rows
            .iter()
            .find(|&(_, row)| !row.is_placeholder())
            .map(|(id, _)| id.clone())
    }

    /// Closest concrete entry newer than `id`.
    pub fn newer_concrete_id(&self, id: &StatusId) -> Option<StatusId> {
        self.rows
            .range((Excluded(id), Unbounded))
            .find(|&(_, row)| !row.is_placeholder())
            .map(|(id, _)| id.clone())
    }

    /// Up to `limit` entries starting at `anchor` (or the newest entry),
    /// going back in time.
    pub fn window(&self, anchor: Option<&StatusId>, limit: usize) -> Result<Vec<FeedEntry>> {
        let upper = match anchor {
            Some(anchor) => Included(anchor),
            None => Unbounded,
        };

        self.rows
            .range((Unbounded, upper))
            .rev()
            .take(limit)
            .map(|(id, row)| row.to_entry(id))
            .collect()
    }

    /// Removes every row in `[oldest, newest]`; returns the number of
    /// concrete rows removed.
    pub fn delete_range(&mut self, oldest: &StatusId, newest: &StatusId) -> usize {
        let removed = self.remove_range(oldest, newest);
        self.coalesce_at(oldest);
        removed
    }

    fn remove_range(&mut self, oldest: &StatusId, newest: &StatusId) -> usize {
        if oldest > newest {
            return 0;
        }

        let ids: Vec<StatusId> = self.rows
            .range((Included(oldest), Included(newest)))
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed = 0;
        for id in ids {
            if let Some(Row::Status { .. }) = self.rows.remove(&id) {
                removed += 1;
            }
        }

        removed
    }

    pub fn delete_entry(&mut self, id: &StatusId) -> usize {
        match self.rows.remove(id) {
            Some(row) => {
                if !row.is_placeholder() {
                    self.coalesce_at(id);
                }
                1
            }
            None => 0,
        }
    }

    /// No-op for unknown ids and placeholders.
    pub fn set_flag(&mut self, id: &StatusId, flag: Flag, value: bool) -> bool {
        match self.rows.get_mut(id) {
            Some(&mut Row::Status { ref mut flags, .. }) => {
                flags.set(flag, value);
                true
            }
            Some(&mut Row::Placeholder { .. }) | None => false,
        }
    }

    pub fn set_loading(&mut self, id: &StatusId, value: bool) -> bool {
        match self.rows.get_mut(id) {
            Some(&mut Row::Placeholder { ref mut loading, .. }) => {
                *loading = value;
                true
            }
            Some(&mut Row::Status { .. }) | None => false,
        }
    }

    /// Replaces the poll of the status (or of the status it reblogs).
    pub fn update_poll(&mut self, id: &StatusId, poll: &Poll) -> Result<bool> {
        let payload = match self.rows.get_mut(id) {
            Some(&mut Row::Status { ref mut payload, .. }) => payload,
            Some(&mut Row::Placeholder { .. }) | None => return Ok(false),
        };

        let mut status = decode(payload)?;
        status.actionable_mut().poll = Some(poll.clone());
        *payload = encode(&status)?;
        Ok(true)
    }

    /// Removes concrete rows whose status matches `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&Status) -> bool,
    {
        let mut doomed = Vec::new();
        for (id, row) in &self.rows {
            if let Row::Status { ref payload, .. } = *row {
                if predicate(&decode(payload)?) {
                    doomed.push(id.clone());
                }
            }
        }

        Ok(doomed.iter().map(|id| self.delete_entry(id)).sum())
    }

    /// Drops the older of two placeholders that became neighbours around
    /// `id`.
    fn coalesce_at(&mut self, id: &StatusId) {
        let newer = self.rows
            .range((Excluded(id), Unbounded))
            .next()
            .map(|(id, row)| (id.clone(), row.is_placeholder()));
        let older = self.rows
            .range((Unbounded, Excluded(id)))
            .next_back()
            .map(|(id, row)| (id.clone(), row.is_placeholder()));

        if let (Some((_, true)), Some((older, true))) = (newer, older) {
            self.rows.remove(&older);
        }
    }

    fn placeholder_ids(&self) -> Vec<&StatusId> {
        self.rows
            .iter()
            .filter(|&(_, row)| row.is_placeholder())
            .map(|(id, _)| id)
            .collect()
    }
}

impl EntryTable for Rows {
    fn merge_statuses(&mut self, statuses: &[Status], config: &SessionConfig) -> Result<usize> {
        let (oldest, newest) = match (
            statuses.iter().map(|s| &s.id).min(),
            statuses.iter().map(|s| &s.id).max(),
        ) {
            (Some(oldest), Some(newest)) => (oldest.clone(), newest.clone()),
            _ => return Ok(0),
        };

        // Serialize everything before touching the table
        let mut encoded = Vec::with_capacity(statuses.len());
        for status in statuses {
            encoded.push((status, encode(status)?));
        }

        let previous: HashMap<StatusId, EntryFlags> = self.rows
            .range((Included(&oldest), Included(&newest)))
            .filter_map(|(id, row)| match *row {
                Row::Status { ref flags, .. } => Some((id.clone(), *flags)),
                Row::Placeholder { .. } => None,
            })
            .collect();

        let removed = self.remove_range(&oldest, &newest);

        for (status, payload) in encoded {
            let mut flags = EntryFlags::initial(status, config);

            // Display state survives a refetch, server state does not
            if let Some(old) = previous.get(&status.id) {
                flags.expanded = old.expanded;
                flags.content_showing = old.content_showing;
                flags.collapsed = old.collapsed;
            }

            self.rows.insert(status.id.clone(), Row::Status { payload, flags });
        }

        Ok(removed)
    }

    fn insert_placeholder_if_absent(&mut self, id: StatusId) -> bool {
        if self.rows.contains_key(&id) {
            return false;
        }

        let newer_is_placeholder = self.rows
            .range((Excluded(&id), Unbounded))
            .next()
            .map_or(false, |(_, row)| row.is_placeholder());
        if newer_is_placeholder {
            return false;
        }

        let older_placeholder = self.rows
            .range((Unbounded, Excluded(&id)))
            .next_back()
            .and_then(|(id, row)| if row.is_placeholder() {
                Some(id.clone())
            } else {
                None
            });
        if let Some(older) = older_placeholder {
            self.rows.remove(&older);
        }

        self.rows.insert(id, Row::Placeholder { loading: false, anchor: None });
        true
    }

    fn remove_placeholder(&mut self, id: &StatusId) -> bool {
        if self.is_placeholder(id) {
            self.rows.remove(id);
            true
        } else {
            false
        }
    }

    fn set_retry_anchor(&mut self, id: &StatusId, value: StatusId) -> bool {
        match self.rows.get_mut(id) {
            Some(&mut Row::Placeholder { ref mut anchor, .. }) => {
                *anchor = Some(value);
                true
            }
            Some(&mut Row::Status { .. }) | None => false,
        }
    }

    fn retry_anchor(&self, id: &StatusId) -> Option<StatusId> {
        match self.rows.get(id) {
            Some(&Row::Placeholder { ref anchor, .. }) => anchor.clone(),
            Some(&Row::Status { .. }) | None => None,
        }
    }

    fn newer_concrete_id(&self, id: &StatusId) -> Option<StatusId> {
        Rows::newer_concrete_id(self, id)
    }

    fn contains(&self, id: &StatusId) -> bool {
        self.rows.contains_key(id)
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: Mutex<Rows>,
    invalidation: Invalidation,
}

/// Timeline cache shared by every session of an account.
#[derive(Debug, Default)]
pub struct StatusStore {
    tables: Mutex<HashMap<Scope, Arc<Table>>>,
    row_limit: Option<usize>,
}

impl StatusStore {
    pub fn new() -> Self {
        StatusStore::default()
    }

    /// A store that refuses writes leaving a scope with more than `limit`
    /// rows.
    pub fn with_row_limit(limit: usize) -> Self {
        StatusStore {
            tables: Mutex::new(HashMap::new()),
            row_limit: Some(limit),
        }
    }

    fn table(&self, scope: &Scope) -> Arc<Table> {
        self.tables
            .lock()
            .entry(scope.clone())
            .or_insert_with(Default::default)
            .clone()
    }

    /// Change notifications for `scope`.
    pub fn invalidation(&self, scope: &Scope) -> Invalidation {
        self.table(scope).invalidation.clone()
    }

    pub fn read<T, F>(&self, scope: &Scope, f: F) -> T
    where
        F: FnOnce(&Rows) -> T,
    {
        let table = self.table(scope);
        let rows = table.rows.lock();
        f(&rows)
    }

    /// Runs `f` against a copy of the scope's rows and commits the copy only
    /// if `f` succeeds. Readers see either the old rows or the new ones.
    pub fn transaction<T, F>(&self, scope: &Scope, f: F) -> Result<T>
    where
        F: FnOnce(&mut Rows) -> Result<T>,
    {
        let table = self.table(scope);
        let (value, changed) = {
            let mut rows = table.rows.lock();
            let mut draft = rows.clone();
            let value = f(&mut draft)?;

            if let Some(limit) = self.row_limit {
                if draft.len() > limit {
                    bail!(ErrorKind::Storage(format!(
                        "{} rows exceed the limit of {}",
                        draft.len(),
                        limit
                    )));
                }
            }

            let changed = draft != *rows;
            if changed {
                *rows = draft;
            }
            (value, changed)
        };

        if changed {
            table.invalidation.invalidate();
        }
        Ok(value)
    }

    pub fn merge_page(&self, scope: &Scope, statuses: &[Status], config: &SessionConfig) -> Result<usize> {
        self.transaction(scope, |rows| rows.merge_statuses(statuses, config))
    }

    pub fn insert_placeholder_if_absent(&self, scope: &Scope, id: StatusId) -> Result<bool> {
        self.transaction(scope, |rows| Ok(rows.insert_placeholder_if_absent(id)))
    }

    pub fn delete_entry(&self, scope: &Scope, id: &StatusId) -> Result<usize> {
        self.transaction(scope, |rows| Ok(rows.delete_entry(id)))
    }

    pub fn delete_range(&self, scope: &Scope, oldest: &StatusId, newest: &StatusId) -> Result<usize> {
        self.transaction(scope, |rows| Ok(rows.delete_range(oldest, newest)))
    }

    pub fn set_flag(&self, scope: &Scope, id: &StatusId, flag: Flag, value: bool) -> Result<bool> {
        self.transaction(scope, |rows| Ok(rows.set_flag(id, flag, value)))
    }

    pub fn update_poll(&self, scope: &Scope, id: &StatusId, poll: &Poll) -> Result<bool> {
        self.transaction(scope, |rows| rows.update_poll(id, poll))
    }

    pub fn remove_where<F>(&self, scope: &Scope, predicate: F) -> Result<usize>
    where
        F: FnMut(&Status) -> bool,
    {
        self.transaction(scope, |rows| rows.remove_where(predicate))
    }

    pub fn read_window(&self, scope: &Scope, anchor: Option<&StatusId>, limit: usize) -> Result<Vec<FeedEntry>> {
        self.read(scope, |rows| rows.window(anchor, limit))
    }

    /// Placeholder ids of a scope, newest first.
    pub fn placeholders(&self, scope: &Scope) -> Vec<StatusId> {
        self.read(scope, |rows| {
            rows.placeholder_ids().into_iter().rev().cloned().collect()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::*;

    fn home() -> Scope {
        Scope::new("1", FeedKind::Home)
    }

    fn ids(store: &StatusStore, scope: &Scope) -> Vec<String> {
        store
            .read_window(scope, None, usize::max_value())
            .unwrap()
            .iter()
            .map(|entry| match *entry {
                FeedEntry::Concrete(ref c) => c.status.id.to_string(),
                FeedEntry::Placeholder { ref id, .. } => format!("P{}", id),
            })
            .collect()
    }

    fn merge(store: &StatusStore, scope: &Scope, page: &[&str]) -> usize {
        store
            .merge_page(scope, &statuses(page), &SessionConfig::default())
            .unwrap()
    }

    #[test]
    fn merge_then_read_round_trips() {
        let store = StatusStore::new();
        let scope = home();
        let page = statuses(&["110", "105", "100"]);

        store.merge_page(&scope, &page, &SessionConfig::default()).unwrap();

        let window = store.read_window(&scope, Some(&page[0].id), 10).unwrap();
        let read: Vec<Status> = window
            .into_iter()
            .map(|entry| entry.as_concrete().unwrap().status.clone())
            .collect();
        assert_eq!(read, page);
    }

    #[test]
    fn merge_is_idempotent() {
        let store = StatusStore::new();
        let scope = home();

        merge(&store, &scope, &["30", "20", "10"]);
        let once = store.read_window(&scope, None, 100).unwrap();

        assert_eq!(merge(&store, &scope, &["30", "20", "10"]), 3);
        assert_eq!(store.read_window(&scope, None, 100).unwrap(), once);
    }

    #[test]
    fn merge_replaces_overlap_and_placeholders_in_range() {
        let store = StatusStore::new();
        let scope = home();

        merge(&store, &scope, &["100", "95", "90"]);
        store.insert_placeholder_if_absent(&scope, "93".into()).unwrap();
        assert_eq!(ids(&store, &scope), vec!["100", "95", "P93", "90"]);

        let overlapped = merge(&store, &scope, &["97", "92"]);
        assert_eq!(overlapped, 1);
        assert_eq!(ids(&store, &scope), vec!["100", "97", "92", "90"]);
    }

    #[test]
    fn scopes_are_separate() {
        let store = StatusStore::new();
        merge(&store, &home(), &["3", "2"]);
        merge(&store, &Scope::new("2", FeedKind::Home), &["9"]);

        assert_eq!(ids(&store, &home()), vec!["3", "2"]);
        assert_eq!(ids(&store, &Scope::new("2", FeedKind::Home)), vec!["9"]);
        assert!(ids(&store, &Scope::new("1", FeedKind::Bookmarks)).is_empty());
    }

    #[test]
    fn placeholders_are_never_duplicated_or_adjacent() {
        let store = StatusStore::new();
        let scope = home();
        merge(&store, &scope, &["100", "90"]);

        assert!(!store.insert_placeholder_if_absent(&scope, "100".into()).unwrap());
        assert!(store.insert_placeholder_if_absent(&scope, "95".into()).unwrap());
        assert!(!store.insert_placeholder_if_absent(&scope, "95".into()).unwrap());
        // directly below 95
        assert!(!store.insert_placeholder_if_absent(&scope, "94".into()).unwrap());
        // directly above 95: replaces it
        assert!(store.insert_placeholder_if_absent(&scope, "97".into()).unwrap());
        assert_eq!(ids(&store, &scope), vec!["100", "P97", "90"]);

        // deleting the concrete between two gaps merges them
        store.insert_placeholder_if_absent(&scope, "85".into()).unwrap();
        assert_eq!(store.delete_entry(&scope, &"90".into()).unwrap(), 1);
        assert_eq!(ids(&store, &scope), vec!["100", "P97"]);
        assert_eq!(store.placeholders(&scope), vec![StatusId::new("97")]);
    }

    #[test]
    fn delete_range_counts_concrete_rows() {
        let store = StatusStore::new();
        let scope = home();
        merge(&store, &scope, &["50", "40", "30", "20"]);
        store.insert_placeholder_if_absent(&scope, "35".into()).unwrap();

        assert_eq!(store.delete_range(&scope, &"25".into(), &"45".into()).unwrap(), 2);
        assert_eq!(ids(&store, &scope), vec!["50", "20"]);
        assert_eq!(store.delete_entry(&scope, &"77".into()).unwrap(), 0);
    }

    #[test]
    fn flags_and_polls() {
        let store = StatusStore::new();
        let scope = home();
        let mut page = statuses(&["20"]);
        page.push(reblog("10", "3"));
        page[1].reblog.as_mut().unwrap().poll = Some(poll("p1", false));
        store.merge_page(&scope, &page, &SessionConfig::default()).unwrap();

        assert!(store.set_flag(&scope, &"10".into(), Flag::Favourited, true).unwrap());
        assert!(store.set_flag(&scope, &"10".into(), Flag::Expanded, false).unwrap());
        assert!(!store.set_flag(&scope, &"11".into(), Flag::Favourited, true).unwrap());
        assert!(store.update_poll(&scope, &"10".into(), &poll("p1", true)).unwrap());

        let entry = store.read(&scope, |rows| rows.get(&"10".into())).unwrap().unwrap();
        let concrete = entry.as_concrete().unwrap();
        assert!(!concrete.status.favourited);
        assert!(concrete.status.actionable().favourited);
        assert!(!concrete.expanded);
        assert!(concrete.status.actionable().poll.as_ref().unwrap().voted);

        // refetching keeps display state but takes server state
        store.merge_page(&scope, &page, &SessionConfig::default()).unwrap();
        let entry = store.read(&scope, |rows| rows.get(&"10".into())).unwrap().unwrap();
        let concrete = entry.as_concrete().unwrap();
        assert!(!concrete.expanded);
        assert!(!concrete.status.actionable().favourited);
    }

    #[test]
    fn remove_where_drops_matching_authors() {
        let store = StatusStore::new();
        let scope = home();
        let mut page = statuses(&["30", "20", "10"]);
        page[1].account = account("blocked");
        store.merge_page(&scope, &page, &SessionConfig::default()).unwrap();
        store.insert_placeholder_if_absent(&scope, "25".into()).unwrap();
        store.insert_placeholder_if_absent(&scope, "15".into()).unwrap();

        let removed = store
            .remove_where(&scope, |status| status.account.id == "blocked")
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ids(&store, &scope), vec!["30", "P25", "10"]);
    }

    #[test]
    fn failed_transactions_leave_rows_untouched() {
        let store = StatusStore::with_row_limit(3);
        let scope = home();
        merge(&store, &scope, &["30", "20"]);
        let generation = store.invalidation(&scope).generation();

        let result = store.merge_page(&scope, &statuses(&["15", "10"]), &SessionConfig::default());
        assert!(match result {
            Err(Error(ErrorKind::Storage(_), _)) => true,
            _ => false,
        });
        assert_eq!(ids(&store, &scope), vec!["30", "20"]);
        assert_eq!(store.invalidation(&scope).generation(), generation);

        let aborted: Result<()> = store.transaction(&scope, |rows| {
            rows.delete_entry(&"30".into());
            bail!(ErrorKind::Storage("abort".into()))
        });
        assert!(aborted.is_err());
        assert_eq!(ids(&store, &scope), vec!["30", "20"]);
    }

    #[test]
    fn writes_invalidate_only_on_change() {
        let store = StatusStore::new();
        let scope = home();
        let invalidation = store.invalidation(&scope);

        merge(&store, &scope, &["2", "1"]);
        assert_eq!(invalidation.generation(), 1);

        merge(&store, &scope, &["2", "1"]);
        store.set_flag(&scope, &"9".into(), Flag::Pinned, true).unwrap();
        assert_eq!(invalidation.generation(), 1);

        store.set_flag(&scope, &"2".into(), Flag::Pinned, true).unwrap();
        assert_eq!(invalidation.generation(), 2);
    }

    #[test]
    fn corrupt_payloads_surface_as_decode_errors() {
        let mut rows = Rows::default();
        rows.rows.insert(
            StatusId::new("1"),
            Row::Status {
                payload: "{".to_string(),
                flags: EntryFlags::default(),
            },
        );

        let err = rows.window(None, 10).unwrap_err();
        assert!(err.is_decode());
    }
}
