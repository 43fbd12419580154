use crate::api::{Status, StatusId};
use crate::config::SessionConfig;

/// One position in a timeline.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEntry {
    Concrete(ConcreteEntry),
    /// Statuses below the newer neighbour, down to and including `id`, may
    /// not have been fetched yet. `anchor` is set when an earlier fill came
    /// back empty and the next one must start below it.
    Placeholder {
        id: StatusId,
        loading: bool,
        anchor: Option<StatusId>,
    },
}

impl FeedEntry {
    pub fn placeholder(id: StatusId) -> FeedEntry {
        FeedEntry::Placeholder {
            id,
            loading: false,
            anchor: None,
        }
    }

    pub fn id(&self) -> &StatusId {
        match *self {
            FeedEntry::Concrete(ref concrete) => &concrete.status.id,
            FeedEntry::Placeholder { ref id, .. } => id,
        }
    }

    pub fn as_concrete(&self) -> Option<&ConcreteEntry> {
        match *self {
            FeedEntry::Concrete(ref concrete) => Some(concrete),
            FeedEntry::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        match *self {
            FeedEntry::Concrete(_) => false,
            FeedEntry::Placeholder { .. } => true,
        }
    }
}

/// A fetched status together with its display state.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcreteEntry {
    pub status: Status,
    pub expanded: bool,
    pub content_showing: bool,
    pub collapsed: bool,
}

impl ConcreteEntry {
    pub fn new(status: Status, config: &SessionConfig) -> Self {
        let flags = EntryFlags::initial(&status, config);
        ConcreteEntry {
            status,
            expanded: flags.expanded,
            content_showing: flags.content_showing,
            collapsed: flags.collapsed,
        }
    }

    /// Applies a flag change, resolving interaction flags through a reblog.
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::Favourited => self.status.actionable_mut().favourited = value,
            Flag::Reblogged => self.status.actionable_mut().reblogged = value,
            Flag::Bookmarked => self.status.actionable_mut().bookmarked = value,
            Flag::Pinned => self.status.actionable_mut().pinned = value,
            Flag::Expanded => self.expanded = value,
            Flag::ContentShowing => self.content_showing = value,
            Flag::Collapsed => self.collapsed = value,
        }
    }

    pub fn flags(&self) -> EntryFlags {
        let actionable = self.status.actionable();
        EntryFlags {
            favourited: actionable.favourited,
            reblogged: actionable.reblogged,
            bookmarked: actionable.bookmarked,
            pinned: actionable.pinned,
            expanded: self.expanded,
            content_showing: self.content_showing,
            collapsed: self.collapsed,
        }
    }
}

/// Per-entry state that can change without refetching the status.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Flag {
    Favourited,
    Reblogged,
    Bookmarked,
    Pinned,
    Expanded,
    ContentShowing,
    Collapsed,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntryFlags {
    pub favourited: bool,
    pub reblogged: bool,
    pub bookmarked: bool,
    pub pinned: bool,
    pub expanded: bool,
    pub content_showing: bool,
    pub collapsed: bool,
}

impl EntryFlags {
    /// Flags for a freshly fetched status.
    pub fn initial(status: &Status, config: &SessionConfig) -> Self {
        let actionable = status.actionable();
        EntryFlags {
            favourited: actionable.favourited,
            reblogged: actionable.reblogged,
            bookmarked: actionable.bookmarked,
            pinned: actionable.pinned,
            expanded: config.always_open_spoilers || actionable.spoiler_text.is_empty(),
            content_showing: config.always_show_sensitive_media || !actionable.sensitive,
            collapsed: true,
        }
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::Favourited => self.favourited = value,
            Flag::Reblogged => self.reblogged = value,
            Flag::Bookmarked => self.bookmarked = value,
            Flag::Pinned => self.pinned = value,
            Flag::Expanded => self.expanded = value,
            Flag::ContentShowing => self.content_showing = value,
            Flag::Collapsed => self.collapsed = value,
        }
    }

    /// Rebuilds an entry from a stored payload and these flags.
    pub fn apply(&self, mut status: Status) -> ConcreteEntry {
        {
            let actionable = status.actionable_mut();
            actionable.favourited = self.favourited;
            actionable.reblogged = self.reblogged;
            actionable.bookmarked = self.bookmarked;
            actionable.pinned = self.pinned;
        }

        ConcreteEntry {
            status,
            expanded: self.expanded,
            content_showing: self.content_showing,
            collapsed: self.collapsed,
        }
    }
}

/// One page of entries handed to the presentation layer, newest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedWindow {
    pub entries: Vec<FeedEntry>,
    /// Invalidation generation the window was derived at.
    pub generation: u64,
}

impl FeedWindow {
    pub fn ids(&self) -> Vec<&StatusId> {
        self.entries.iter().map(FeedEntry::id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
