//! Pagination for timelines that live only as long as their session.

use crate::api::{Status, StatusId};
use crate::config::SessionConfig;
use crate::entry::{ConcreteEntry, FeedEntry, Flag};
use crate::error::*;
use crate::feed::{FeedKind, LoadType, Page, PageRequest, RemoteFeedClient};
use crate::gap::{self, EntryTable, GapOutcome};
use crate::invalidation::{Invalidation, Windows};
use crate::mediator::{InFlight, LoadResult, Slot};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Newest-first list of entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryList {
    entries: Vec<FeedEntry>,
}

impl EntryList {
    pub fn new() -> Self {
        EntryList::default()
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &StatusId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    pub fn newest_concrete_id(&self) -> Option<StatusId> {
        self.entries
            .iter()
            .filter_map(FeedEntry::as_concrete)
            .map(|concrete| concrete.status.id.clone())
            .next()
    }

    pub fn oldest_concrete_id(&self) -> Option<StatusId> {
        self.entries
            .iter()
            .rev()
            .filter_map(FeedEntry::as_concrete)
            .map(|concrete| concrete.status.id.clone())
            .next()
    }

    pub fn newer_concrete_id(&self, id: &StatusId) -> Option<StatusId> {
        self.entries
            .iter()
            .take_while(|entry| entry.id() > id)
            .filter_map(FeedEntry::as_concrete)
            .map(|concrete| concrete.status.id.clone())
            .last()
    }

    pub fn set_loading(&mut self, id: &StatusId, value: bool) -> bool {
        let position = match self.position(id) {
            Some(position) => position,
            None => return false,
        };

        match self.entries[position] {
            FeedEntry::Placeholder { ref mut loading, .. } => {
                *loading = value;
                true
            }
            FeedEntry::Concrete(_) => false,
        }
    }

    /// Looks up a concrete entry by its own id.
    pub fn concrete_mut(&mut self, id: &StatusId) -> Option<&mut ConcreteEntry> {
        self.entries.iter_mut().find_map(|entry| match *entry {
            FeedEntry::Concrete(ref mut concrete) if concrete.status.id == *id => Some(concrete),
            _ => None,
        })
    }

    /// No-op for unknown ids and placeholders.
    pub fn set_flag(&mut self, id: &StatusId, flag: Flag, value: bool) -> bool {
        match self.concrete_mut(id) {
            Some(concrete) => {
                concrete.set_flag(flag, value);
                true
            }
            None => false,
        }
    }

    pub fn delete_entry(&mut self, id: &StatusId) -> usize {
        match self.position(id) {
            Some(position) => {
                let removed = self.entries.remove(position);
                if !removed.is_placeholder() {
                    self.coalesce_at(position);
                }
                1
            }
            None => 0,
        }
    }

    /// Removes concrete entries matching `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Status) -> bool,
    {
        let doomed: Vec<StatusId> = self.entries
            .iter()
            .filter_map(FeedEntry::as_concrete)
            .filter(|concrete| predicate(&concrete.status))
            .map(|concrete| concrete.status.id.clone())
            .collect();

        doomed.iter().map(|id| self.delete_entry(id)).sum()
    }

    /// Adds a page of a feed that is not ordered by status id, keeping the
    /// server's order: above the list on refresh, below it on append. An
    /// already listed status moves to its new position with its display
    /// state. Returns how many entries were replaced.
    pub fn splice_page(&mut self, statuses: &[Status], at_end: bool, config: &SessionConfig) -> usize {
        let mut seen = HashSet::new();
        let mut incoming = Vec::with_capacity(statuses.len());
        for status in statuses {
            if !seen.insert(status.id.clone()) {
                continue;
            }

            let mut entry = ConcreteEntry::new(status.clone(), config);
            if let Some(old) = self.concrete_mut(&status.id) {
                entry.expanded = old.expanded;
                entry.content_showing = old.content_showing;
                entry.collapsed = old.collapsed;
            }
            incoming.push(FeedEntry::Concrete(entry));
        }

        let before = self.entries.len();
        self.entries.retain(|entry| !seen.contains(entry.id()));
        let replaced = before - self.entries.len();

        if at_end {
            self.entries.extend(incoming);
        } else {
            incoming.extend(self.entries.drain(..));
            self.entries = incoming;
        }
        replaced
    }

    /// Drops the older of two placeholders meeting at `position`.
    fn coalesce_at(&mut self, position: usize) {
        if position == 0 || position >= self.entries.len() {
            return;
        }

        if self.entries[position - 1].is_placeholder() && self.entries[position].is_placeholder() {
            self.entries.remove(position);
        }
    }
}

impl EntryTable for EntryList {
    fn merge_statuses(&mut self, statuses: &[Status], config: &SessionConfig) -> Result<usize> {
        let (oldest, newest) = match (
            statuses.iter().map(|s| &s.id).min(),
            statuses.iter().map(|s| &s.id).max(),
        ) {
            (Some(oldest), Some(newest)) => (oldest.clone(), newest.clone()),
            _ => return Ok(0),
        };

        let mut removed = 0;
        let mut previous = Vec::new();
        self.entries.retain(|entry| {
            if entry.id() < &oldest || entry.id() > &newest {
                return true;
            }
            if let FeedEntry::Concrete(ref concrete) = *entry {
                removed += 1;
                previous.push((concrete.status.id.clone(), concrete.flags()));
            }
            false
        });

        let mut incoming: Vec<ConcreteEntry> = statuses
            .iter()
            .map(|status| {
                let mut entry = ConcreteEntry::new(status.clone(), config);
                if let Some(&(_, ref old)) = previous.iter().find(|&&(ref id, _)| *id == status.id) {
                    entry.expanded = old.expanded;
                    entry.content_showing = old.content_showing;
                    entry.collapsed = old.collapsed;
                }
                entry
            })
            .collect();
        incoming.sort_by(|a, b| b.status.id.cmp(&a.status.id));
        incoming.dedup_by(|a, b| a.status.id == b.status.id);

        let at = self.entries.iter().take_while(|e| e.id() > &newest).count();
        let older = self.entries.split_off(at);
        self.entries.extend(incoming.into_iter().map(FeedEntry::Concrete));
        self.entries.extend(older);

        Ok(removed)
    }

    fn insert_placeholder_if_absent(&mut self, id: StatusId) -> bool {
        if self.position(&id).is_some() {
            return false;
        }

        let at = self.entries.iter().take_while(|e| e.id() > &id).count();
        if at > 0 && self.entries[at - 1].is_placeholder() {
            return false;
        }
        if at < self.entries.len() && self.entries[at].is_placeholder() {
            self.entries.remove(at);
        }

        self.entries.insert(at, FeedEntry::placeholder(id));
        true
    }

    fn remove_placeholder(&mut self, id: &StatusId) -> bool {
        match self.position(id) {
            Some(position) if self.entries[position].is_placeholder() => {
                self.entries.remove(position);
                true
            }
            _ => false,
        }
    }

    fn set_retry_anchor(&mut self, id: &StatusId, value: StatusId) -> bool {
        let position = match self.position(id) {
            Some(position) => position,
            None => return false,
        };

        match self.entries[position] {
            FeedEntry::Placeholder { ref mut anchor, .. } => {
                *anchor = Some(value);
                true
            }
            FeedEntry::Concrete(_) => false,
        }
    }

    fn retry_anchor(&self, id: &StatusId) -> Option<StatusId> {
        match self.position(id).map(|position| &self.entries[position]) {
            Some(&FeedEntry::Placeholder { ref anchor, .. }) => anchor.clone(),
            _ => None,
        }
    }

    fn newer_concrete_id(&self, id: &StatusId) -> Option<StatusId> {
        EntryList::newer_concrete_id(self, id)
    }

    fn contains(&self, id: &StatusId) -> bool {
        self.position(id).is_some()
    }
}

/// In-memory timeline of one view session.
pub struct MemoryPager<C> {
    client: Arc<C>,
    kind: FeedKind,
    config: SessionConfig,
    list: Arc<Mutex<EntryList>>,
    invalidation: Invalidation,
    /// `next` hint of the last appended page.
    next_key: Mutex<Option<StatusId>>,
    running: Mutex<HashSet<Slot>>,
}

impl<C: RemoteFeedClient> MemoryPager<C> {
    pub fn new(client: Arc<C>, kind: FeedKind, config: SessionConfig) -> Self {
        MemoryPager {
            client,
            kind,
            config,
            list: Arc::new(Mutex::new(EntryList::new())),
            invalidation: Invalidation::new(),
            next_key: Mutex::new(None),
            running: Mutex::new(HashSet::new()),
        }
    }

    pub fn kind(&self) -> &FeedKind {
        &self.kind
    }

    pub fn invalidation(&self) -> &Invalidation {
        &self.invalidation
    }

    /// Snapshot of the current list.
    pub fn entries(&self) -> Vec<FeedEntry> {
        self.list.lock().entries().to_vec()
    }

    /// Lazily re-derived views of the list; a fresh stream starts over.
    pub fn windows(&self) -> Windows {
        let list = self.list.clone();
        Windows::new(self.invalidation.clone(), move || {
            Ok(list.lock().entries().to_vec())
        })
    }

    pub fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&EntryList) -> T,
    {
        f(&self.list.lock())
    }

    /// Applies `f` to the list and invalidates the windows if it reports a
    /// change.
    pub fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut EntryList) -> (T, bool),
    {
        let (value, changed) = {
            let mut list = self.list.lock();
            f(&mut list)
        };

        if changed {
            self.invalidation.invalidate();
        }
        value
    }

    pub fn close(&self) {
        self.invalidation.close();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.invalidation.is_closed() {
            warn!("discarding page for {:?}, session closed", self.kind);
            bail!(ErrorKind::SessionClosed);
        }
        Ok(())
    }

    /// Fetches a page around `anchor` without touching the list.
    pub async fn load(&self, direction: LoadType, anchor: Option<StatusId>, limit: usize) -> Result<Page> {
        let request = match (direction, anchor) {
            (LoadType::Refresh, _) | (_, None) => PageRequest::newest(limit),
            (LoadType::Prepend, Some(anchor)) => PageRequest::after(anchor, limit),
            (LoadType::Append, Some(anchor)) => PageRequest::before(anchor, limit),
        };

        debug!("{:?} {:?}: requesting {:?}", direction, self.kind, request.bound);
        self.client.fetch(&self.kind, request).await
    }

    /// Loads and splices the page for a presentation-layer trigger.
    pub async fn paginate(&self, direction: LoadType) -> Result<LoadResult> {
        if direction == LoadType::Prepend {
            return Ok(LoadResult::Loaded { end_of_pagination: true });
        }
        self.ensure_open()?;

        let _running = match InFlight::acquire(&self.running, Slot::Load(direction)) {
            Some(running) => running,
            None => return Ok(LoadResult::AlreadyLoading),
        };

        let (anchor, previous_head) = {
            let list = self.list.lock();
            match direction {
                LoadType::Append => {
                    let anchor = self.next_key.lock().clone().or_else(|| list.oldest_concrete_id());
                    (anchor, None)
                }
                _ => (None, list.newest_concrete_id()),
            }
        };

        let page = self.load(direction, anchor, self.config.page_size).await?;
        self.ensure_open()?;

        let config = &self.config;
        if self.kind.paginates_by_status_id() {
            self.update(|list| match list.merge_statuses(&page.statuses, config) {
                Ok(_) => {
                    let gap = if direction == LoadType::Refresh {
                        gap::mark_refresh_gap(list, previous_head.as_ref(), page.links.next.as_ref())
                    } else {
                        None
                    };
                    (Ok(()), !page.statuses.is_empty() || gap.is_some())
                }
                Err(e) => (Err(e), false),
            })?;
        } else {
            let at_end = direction == LoadType::Append;
            self.update(|list| {
                list.splice_page(&page.statuses, at_end, config);
                ((), !page.statuses.is_empty())
            });
        }

        {
            let mut next_key = self.next_key.lock();
            if direction == LoadType::Append || next_key.is_none() {
                *next_key = page.links.next.clone();
            }
        }

        info!("{:?} {:?}: spliced {} statuses", direction, self.kind, page.statuses.len());
        Ok(LoadResult::Loaded { end_of_pagination: page.statuses.is_empty() })
    }

    /// Replaces the placeholder at `id` with the statuses it stood for.
    pub async fn resolve_gap(&self, id: &StatusId) -> Result<GapOutcome> {
        self.ensure_open()?;

        let _running = match InFlight::acquire(&self.running, Slot::Gap(id.clone())) {
            Some(running) => running,
            None => return Ok(GapOutcome::AlreadyLoading),
        };

        let anchor = self.update(|list| if list.set_loading(id, true) {
            (Some(gap::gap_anchor(&*list, id)), true)
        } else {
            (None, false)
        });
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => bail!(ErrorKind::NoSuchPlaceholder(id.clone())),
        };

        let page = match self.load(LoadType::Append, Some(anchor.clone()), self.config.gap_fill_limit).await {
            Ok(page) => page,
            Err(e) => {
                self.update(|list| ((), list.set_loading(id, false)));
                return Err(e);
            }
        };
        self.ensure_open()?;

        let config = &self.config;
        let limit = self.config.gap_fill_limit;
        self.update(|list| {
            (gap::fill_gap(list, id, &anchor, &page.statuses, limit, config), true)
        })
    }
}
