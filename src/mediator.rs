//! Keeps a cached timeline in step with the server.
//!
//! The presentation layer triggers loads; the mediator fetches the matching
//! page and merges it into the [`StatusStore`]. Nothing is written when a
//! fetch fails, so a retry uses the same anchor.

use crate::api::StatusId;
use crate::config::SessionConfig;
use crate::error::*;
use crate::feed::{LoadType, PageRequest, RemoteFeedClient};
use crate::gap::{self, EntryTable, GapOutcome};
use crate::store::{Scope, StatusStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a triggered load did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadResult {
    Loaded { end_of_pagination: bool },
    /// A load in the same direction is already running.
    AlreadyLoading,
}

/// Marks a load or gap fill as running for as long as it is alive, including
/// when the future driving it is dropped half way.
pub(crate) struct InFlight<'a, K: Eq + Hash> {
    running: &'a Mutex<HashSet<K>>,
    key: Option<K>,
}

impl<'a, K: Eq + Hash + Clone> InFlight<'a, K> {
    pub(crate) fn acquire(running: &'a Mutex<HashSet<K>>, key: K) -> Option<Self> {
        if running.lock().insert(key.clone()) {
            Some(InFlight {
                running,
                key: Some(key),
            })
        } else {
            None
        }
    }
}

impl<'a, K: Eq + Hash> Drop for InFlight<'a, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.running.lock().remove(&key);
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Slot {
    Load(LoadType),
    Gap(StatusId),
}

pub struct SyncMediator<C> {
    client: Arc<C>,
    store: Arc<StatusStore>,
    scope: Scope,
    config: SessionConfig,
    running: Mutex<HashSet<Slot>>,
    closed: AtomicBool,
}

impl<C: RemoteFeedClient> SyncMediator<C> {
    pub fn new(client: Arc<C>, store: Arc<StatusStore>, scope: Scope, config: SessionConfig) -> Self {
        SyncMediator {
            client,
            store,
            scope,
            config,
            running: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Results of fetches completing after this are dropped unmerged.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            warn!("discarding page for {:?}, session closed", self.scope.feed);
            bail!(ErrorKind::SessionClosed);
        }
        Ok(())
    }

    pub async fn load(&self, load_type: LoadType) -> Result<LoadResult> {
        // The cached timeline always refreshes from the top
        if load_type == LoadType::Prepend {
            return Ok(LoadResult::Loaded { end_of_pagination: true });
        }
        self.ensure_open()?;

        let _running = match InFlight::acquire(&self.running, Slot::Load(load_type)) {
            Some(running) => running,
            None => return Ok(LoadResult::AlreadyLoading),
        };

        let (request, previous_head) = self.store.read(&self.scope, |rows| {
            let limit = self.config.page_size;
            match load_type {
                LoadType::Append => {
                    let request = match rows.oldest_concrete_id() {
                        Some(oldest) => PageRequest::before(oldest, limit),
                        None => PageRequest::newest(limit),
                    };
                    (request, None)
                }
                _ => (PageRequest::newest(limit), rows.newest_concrete_id()),
            }
        });

        debug!("{:?} {:?}: requesting {:?}", load_type, self.scope.feed, request.bound);
        let page = self.client.fetch(&self.scope.feed, request).await?;
        self.ensure_open()?;

        let config = &self.config;
        self.store.transaction(&self.scope, |rows| {
            rows.merge_statuses(&page.statuses, config)?;

            if load_type == LoadType::Refresh {
                gap::mark_refresh_gap(rows, previous_head.as_ref(), page.links.next.as_ref());
            }
            Ok(())
        })?;

        info!(
            "{:?} {:?}: merged {} statuses",
            load_type,
            self.scope.feed,
            page.statuses.len()
        );
        Ok(LoadResult::Loaded { end_of_pagination: page.statuses.is_empty() })
    }

    /// Fetches the statuses hidden behind the placeholder at `id`.
    pub async fn resolve_gap(&self, id: &StatusId) -> Result<GapOutcome> {
        self.ensure_open()?;

        let _running = match InFlight::acquire(&self.running, Slot::Gap(id.clone())) {
            Some(running) => running,
            None => return Ok(GapOutcome::AlreadyLoading),
        };

        let anchor = self.store.transaction(&self.scope, |rows| {
            if !rows.set_loading(id, true) {
                bail!(ErrorKind::NoSuchPlaceholder(id.clone()));
            }
            Ok(gap::gap_anchor(&*rows, id))
        })?;

        let request = PageRequest::before(anchor.clone(), self.config.gap_fill_limit);
        debug!("filling gap at {}: requesting {:?}", id, request.bound);

        let page = match self.client.fetch(&self.scope.feed, request).await {
            Ok(page) => page,
            Err(e) => {
                if !self.is_closed() {
                    self.store.transaction(&self.scope, |rows| Ok(rows.set_loading(id, false)))?;
                }
                return Err(e);
            }
        };
        self.ensure_open()?;

        let config = &self.config;
        let limit = self.config.gap_fill_limit;
        self.store.transaction(&self.scope, |rows| {
            gap::fill_gap(rows, id, &anchor, &page.statuses, limit, config)
        })
    }
}
