//! Mutations that reach a timeline after its entries were loaded.

use crate::api::{Poll, Status, StatusId};
use crate::entry::Flag;
use crate::error::*;
use crate::pager::EntryList;
use crate::store::{Rows, Scope, StatusStore};
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// A change to one status, keyed by the id of the entry showing it.
#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEvent {
    Favourite { id: StatusId, favourite: bool },
    Reblog { id: StatusId, reblog: bool },
    Bookmark { id: StatusId, bookmark: bool },
    Pin { id: StatusId, pinned: bool },
    Delete { id: StatusId },
    PollUpdate { id: StatusId, poll: Poll },
}

impl TimelineEvent {
    pub fn status_id(&self) -> &StatusId {
        use self::TimelineEvent::*;

        match *self {
            Favourite { ref id, .. } |
            Reblog { ref id, .. } |
            Bookmark { ref id, .. } |
            Pin { ref id, .. } |
            Delete { ref id } |
            PollUpdate { ref id, .. } => id,
        }
    }

    /// The flag this event toggles, if it is a plain toggle.
    pub fn flag(&self) -> Option<(Flag, bool)> {
        use self::TimelineEvent::*;

        match *self {
            Favourite { favourite, .. } => Some((Flag::Favourited, favourite)),
            Reblog { reblog, .. } => Some((Flag::Reblogged, reblog)),
            Bookmark { bookmark, .. } => Some((Flag::Bookmarked, bookmark)),
            Pin { pinned, .. } => Some((Flag::Pinned, pinned)),
            Delete { .. } | PollUpdate { .. } => None,
        }
    }
}

/// Deleting a status also drops the reblogs of it.
fn shows(status: &Status, id: &StatusId) -> bool {
    status.id == *id || status.reblog.as_ref().map_or(false, |original| original.id == *id)
}

/// A backing that live events are applied to in place.
///
/// Events for ids that are not loaded (including ids hidden inside a gap) are
/// ignored. Interaction flags land on the reblogged original when the entry
/// is a reblog.
pub trait LiveUpdateApplier {
    /// Returns whether the backing changed.
    fn apply(&mut self, event: &TimelineEvent) -> Result<bool>;
}

impl LiveUpdateApplier for EntryList {
    fn apply(&mut self, event: &TimelineEvent) -> Result<bool> {
        let id = event.status_id();

        if let Some((flag, value)) = event.flag() {
            return Ok(self.set_flag(id, flag, value));
        }

        match *event {
            TimelineEvent::Delete { .. } => Ok(self.remove_where(|status| shows(status, id)) > 0),
            TimelineEvent::PollUpdate { ref poll, .. } => match self.concrete_mut(id) {
                Some(concrete) => {
                    concrete.status.actionable_mut().poll = Some(poll.clone());
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }
}

impl LiveUpdateApplier for Rows {
    fn apply(&mut self, event: &TimelineEvent) -> Result<bool> {
        let id = event.status_id();

        if let Some((flag, value)) = event.flag() {
            return Ok(self.set_flag(id, flag, value));
        }

        match *event {
            TimelineEvent::Delete { .. } => Ok(self.remove_where(|status| shows(status, id))? > 0),
            TimelineEvent::PollUpdate { ref poll, .. } => self.update_poll(id, poll),
            _ => Ok(false),
        }
    }
}

/// Writes live events through to one cached scope.
pub struct CacheUpdater {
    store: Arc<StatusStore>,
    scope: Scope,
}

impl CacheUpdater {
    pub fn new(store: Arc<StatusStore>, scope: Scope) -> Self {
        CacheUpdater { store, scope }
    }

    pub fn apply(&self, event: &TimelineEvent) -> Result<bool> {
        let changed = self.store.transaction(&self.scope, |rows| rows.apply(event))?;
        if !changed {
            debug!("{:?}: no cached entry for {}", self.scope.feed, event.status_id());
        }
        Ok(changed)
    }

    /// Applies events until the stream ends. A failing event is logged and
    /// skipped.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = TimelineEvent>,
    {
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            if let Err(e) = self.apply(&event) {
                warn!("could not apply {:?} to {:?}: {}", event, self.scope.feed, e);
            }
        }
    }
}
