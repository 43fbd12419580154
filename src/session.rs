//! One view session over a timeline.
//!
//! The home timeline is cached in the shared [`StatusStore`] and kept in
//! step by a [`SyncMediator`]; every other feed lives in a [`MemoryPager`]
//! owned by the session.

use crate::api::{Status, StatusId};
use crate::config::SessionConfig;
use crate::entry::{FeedEntry, Flag};
use crate::error::*;
use crate::feed::{FeedKind, LoadType, RemoteFeedClient, StatusActions};
use crate::gap::GapOutcome;
use crate::invalidation::{Invalidation, Windows};
use crate::mediator::{LoadResult, SyncMediator};
use crate::pager::MemoryPager;
use crate::store::{Scope, StatusStore};
use crate::updates::{CacheUpdater, LiveUpdateApplier, TimelineEvent};
use futures::{Stream, StreamExt};
use std::sync::Arc;

enum Backing<C> {
    Cached {
        mediator: SyncMediator<C>,
        updater: CacheUpdater,
    },
    Memory(MemoryPager<C>),
}

pub struct Timeline<C> {
    client: Arc<C>,
    backing: Backing<C>,
    /// Closed on teardown; ends the window streams of this session.
    lifetime: Invalidation,
}

impl<C> Timeline<C>
where
    C: RemoteFeedClient + StatusActions,
{
    pub fn new(
        client: Arc<C>,
        store: Arc<StatusStore>,
        account: &str,
        kind: FeedKind,
        config: SessionConfig,
    ) -> Self {
        let backing = if kind.is_cached() {
            let scope = Scope::new(account, kind);
            Backing::Cached {
                updater: CacheUpdater::new(store.clone(), scope.clone()),
                mediator: SyncMediator::new(client.clone(), store, scope, config),
            }
        } else {
            Backing::Memory(MemoryPager::new(client.clone(), kind, config))
        };

        Timeline {
            client,
            backing,
            lifetime: Invalidation::new(),
        }
    }

    pub fn kind(&self) -> &FeedKind {
        match self.backing {
            Backing::Cached { ref mediator, .. } => &mediator.scope().feed,
            Backing::Memory(ref pager) => pager.kind(),
        }
    }

    pub fn is_cached(&self) -> bool {
        match self.backing {
            Backing::Cached { .. } => true,
            Backing::Memory(_) => false,
        }
    }

    pub async fn refresh(&self) -> Result<LoadResult> {
        self.load_more(LoadType::Refresh).await
    }

    pub async fn load_more(&self, direction: LoadType) -> Result<LoadResult> {
        match self.backing {
            Backing::Cached { ref mediator, .. } => mediator.load(direction).await,
            Backing::Memory(ref pager) => pager.paginate(direction).await,
        }
    }

    pub async fn resolve_gap(&self, id: &StatusId) -> Result<GapOutcome> {
        match self.backing {
            Backing::Cached { ref mediator, .. } => mediator.resolve_gap(id).await,
            Backing::Memory(ref pager) => pager.resolve_gap(id).await,
        }
    }

    /// A new stream of windows over the whole loaded timeline. It yields the
    /// current state first and ends when the session is closed.
    pub fn windows(&self) -> Windows {
        match self.backing {
            Backing::Cached { ref mediator, .. } => {
                let store = mediator.store().clone();
                let scope = mediator.scope().clone();
                Windows::new(store.invalidation(&scope), move || {
                    store.read_window(&scope, None, usize::max_value())
                }).until(self.lifetime.clone())
            }
            Backing::Memory(ref pager) => pager.windows(),
        }
    }

    /// Writes are refused once the session is closed.
    fn ensure_open(&self) -> Result<()> {
        if self.lifetime.is_closed() {
            warn!("{:?}: session closed, dropping write", self.kind());
            bail!(ErrorKind::SessionClosed);
        }
        Ok(())
    }

    /// Returns whether a loaded entry changed.
    pub fn apply_event(&self, event: &TimelineEvent) -> Result<bool> {
        self.ensure_open()?;

        match self.backing {
            Backing::Cached { ref updater, .. } => updater.apply(event),
            Backing::Memory(ref pager) => pager.update(|list| match list.apply(event) {
                Ok(changed) => (Ok(changed), changed),
                Err(e) => (Err(e), false),
            }),
        }
    }

    /// Applies events from `events` until it ends or the session closes.
    pub async fn follow<S>(&self, events: S)
    where
        S: Stream<Item = TimelineEvent>,
    {
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            if self.lifetime.is_closed() {
                break;
            }
            if let Err(e) = self.apply_event(&event) {
                warn!("could not apply {:?} to {:?}: {}", event, self.kind(), e);
            }
        }
    }

    fn set_flag(&self, id: &StatusId, flag: Flag, value: bool) -> Result<bool> {
        self.ensure_open()?;

        match self.backing {
            Backing::Cached { ref mediator, .. } => {
                mediator.store().set_flag(mediator.scope(), id, flag, value)
            }
            Backing::Memory(ref pager) => Ok(pager.update(|list| {
                let changed = list.set_flag(id, flag, value);
                (changed, changed)
            })),
        }
    }

    pub fn set_expanded(&self, id: &StatusId, expanded: bool) -> Result<bool> {
        self.set_flag(id, Flag::Expanded, expanded)
    }

    pub fn set_content_showing(&self, id: &StatusId, showing: bool) -> Result<bool> {
        self.set_flag(id, Flag::ContentShowing, showing)
    }

    pub fn set_collapsed(&self, id: &StatusId, collapsed: bool) -> Result<bool> {
        self.set_flag(id, Flag::Collapsed, collapsed)
    }

    fn entry(&self, id: &StatusId) -> Result<Option<FeedEntry>> {
        match self.backing {
            Backing::Cached { ref mediator, .. } => {
                mediator.store().read(mediator.scope(), |rows| rows.get(id))
            }
            Backing::Memory(ref pager) => Ok(pager.read(|list| {
                list.entries().iter().find(|entry| entry.id() == id).cloned()
            })),
        }
    }

    /// The id the server knows the interaction target by: the reblogged
    /// original for reblogs, the entry itself otherwise.
    fn actionable_id(&self, id: &StatusId) -> Result<StatusId> {
        self.ensure_open()?;

        Ok(match self.entry(id)? {
            Some(FeedEntry::Concrete(concrete)) => concrete.status.actionable().id.clone(),
            Some(FeedEntry::Placeholder { .. }) | None => id.clone(),
        })
    }

    /// Applies the server's answer to an interaction. Fails if the session
    /// closed while the request was out.
    fn record(&self, event: TimelineEvent) -> Result<TimelineEvent> {
        self.apply_event(&event)?;
        Ok(event)
    }

    pub async fn favourite(&self, id: &StatusId, favourite: bool) -> Result<TimelineEvent> {
        let target = self.actionable_id(id)?;
        let status = self.client.favourite(&target, favourite).await?;
        self.record(TimelineEvent::Favourite {
            id: id.clone(),
            favourite: status.actionable().favourited,
        })
    }

    pub async fn reblog(&self, id: &StatusId, reblog: bool) -> Result<TimelineEvent> {
        let target = self.actionable_id(id)?;
        let status = self.client.reblog(&target, reblog).await?;
        self.record(TimelineEvent::Reblog {
            id: id.clone(),
            reblog: status.actionable().reblogged,
        })
    }

    pub async fn bookmark(&self, id: &StatusId, bookmark: bool) -> Result<TimelineEvent> {
        let target = self.actionable_id(id)?;
        let status = self.client.bookmark(&target, bookmark).await?;
        self.record(TimelineEvent::Bookmark {
            id: id.clone(),
            bookmark: status.actionable().bookmarked,
        })
    }

    pub async fn pin(&self, id: &StatusId, pin: bool) -> Result<TimelineEvent> {
        let target = self.actionable_id(id)?;
        let status = self.client.pin(&target, pin).await?;
        self.record(TimelineEvent::Pin {
            id: id.clone(),
            pinned: status.actionable().pinned,
        })
    }

    pub async fn vote(&self, id: &StatusId, poll_id: &str, choices: &[usize]) -> Result<TimelineEvent> {
        self.ensure_open()?;
        let poll = self.client.vote(poll_id, choices).await?;
        self.record(TimelineEvent::PollUpdate {
            id: id.clone(),
            poll,
        })
    }

    fn remove_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: FnMut(&Status) -> bool,
    {
        self.ensure_open()?;

        match self.backing {
            Backing::Cached { ref mediator, .. } => {
                mediator.store().remove_where(mediator.scope(), predicate)
            }
            Backing::Memory(ref pager) => Ok(pager.update(|list| {
                let removed = list.remove_where(predicate);
                (removed, removed > 0)
            })),
        }
    }

    /// Drops statuses written or reblogged by `account_id`.
    pub fn remove_all_by_account(&self, account_id: &str) -> Result<usize> {
        let removed = self.remove_where(|status| {
            status.account.id == account_id || status.actionable().account.id == account_id
        })?;
        info!("{:?}: removed {} statuses of account {}", self.kind(), removed, account_id);
        Ok(removed)
    }

    /// Drops statuses posted from `domain`.
    pub fn remove_all_by_instance(&self, domain: &str) -> Result<usize> {
        let removed = self.remove_where(|status| {
            status.account.domain().as_ref().map(String::as_str) == Some(domain)
        })?;
        info!("{:?}: removed {} statuses from {}", self.kind(), removed, domain);
        Ok(removed)
    }

    /// Ends the session. Window streams end, and fetches still in flight are
    /// dropped when they complete.
    pub fn close(&self) {
        self.lifetime.close();
        match self.backing {
            Backing::Cached { ref mediator, .. } => mediator.close(),
            Backing::Memory(ref pager) => pager.close(),
        }
        debug!("{:?}: session closed", self.kind());
    }
}
