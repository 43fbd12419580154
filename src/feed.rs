use crate::api::{LinkHints, Poll, Status, StatusId};
use crate::error::*;
use futures::future::BoxFuture;

/// Which remote timeline a feed is bound to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FeedKind {
    Home,
    PublicFederated,
    PublicLocal,
    /// Statuses carrying any of the given hashtags. Must not be empty.
    Hashtag(Vec<String>),
    User(String),
    UserPinned(String),
    UserWithReplies(String),
    Favourites,
    Bookmarks,
    List(String),
}

impl FeedKind {
    /// Only the home timeline is worth keeping across sessions.
    pub fn is_cached(&self) -> bool {
        *self == FeedKind::Home
    }

    /// Favourites and bookmarks are paged by the id of the favourite or
    /// bookmark, which only the `Link` header reveals.
    pub fn paginates_by_status_id(&self) -> bool {
        match *self {
            FeedKind::Favourites | FeedKind::Bookmarks => false,
            _ => true,
        }
    }

    pub fn as_path(&self) -> String {
        use self::FeedKind::*;

        match *self {
            Home => "/api/v1/timelines/home".to_string(),
            PublicFederated | PublicLocal => "/api/v1/timelines/public".to_string(),
            Hashtag(ref tags) => {
                format!(
                    "/api/v1/timelines/tag/{}",
                    tags.first().map(String::as_str).unwrap_or_default()
                )
            }
            User(ref id) | UserPinned(ref id) | UserWithReplies(ref id) => {
                format!("/api/v1/accounts/{}/statuses", id)
            }
            Favourites => "/api/v1/favourites".to_string(),
            Bookmarks => "/api/v1/bookmarks".to_string(),
            List(ref id) => format!("/api/v1/timelines/list/{}", id),
        }
    }

    /// Endpoint parameters beyond the pagination bounds.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        use self::FeedKind::*;

        match *self {
            PublicLocal => vec![("local", "true".to_string())],
            Hashtag(ref tags) => {
                tags.iter()
                    .skip(1)
                    .map(|tag| ("any[]", tag.clone()))
                    .collect()
            }
            User(_) => vec![("exclude_replies", "true".to_string())],
            UserPinned(_) => vec![("pinned", "true".to_string())],
            _ => Vec::new(),
        }
    }
}

/// Which side of an anchor a page is fetched from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Bound {
    /// The newest page; no anchor.
    Newest,
    /// Statuses strictly older than the id (`max_id`).
    Before(StatusId),
    /// Statuses strictly newer than the id (`min_id`).
    After(StatusId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub bound: Bound,
    pub limit: usize,
}

impl PageRequest {
    pub fn newest(limit: usize) -> Self {
        PageRequest {
            bound: Bound::Newest,
            limit,
        }
    }

    pub fn before(id: StatusId, limit: usize) -> Self {
        PageRequest {
            bound: Bound::Before(id),
            limit,
        }
    }

    pub fn after(id: StatusId, limit: usize) -> Self {
        PageRequest {
            bound: Bound::After(id),
            limit,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("limit", self.limit.to_string())];

        match self.bound {
            Bound::Newest => {}
            Bound::Before(ref id) => pairs.push(("max_id", id.to_string())),
            Bound::After(ref id) => pairs.push(("min_id", id.to_string())),
        }

        pairs
    }
}

/// One page of a remote timeline, newest first.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub statuses: Vec<Status>,
    pub links: LinkHints,
}

/// Direction of a pagination trigger coming from the presentation layer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LoadType {
    Refresh,
    Prepend,
    Append,
}

/// Source of timeline pages.
///
/// Implementations must report transport failures as `ErrorKind::Network`
/// (or `StatusCode`) and unparseable bodies as `ErrorKind::Decode`.
pub trait RemoteFeedClient: Send + Sync {
    fn fetch<'a>(&'a self, kind: &'a FeedKind, request: PageRequest) -> BoxFuture<'a, Result<Page>>;
}

/// Remote side of the per-status interactions.
pub trait StatusActions: Send + Sync {
    fn favourite<'a>(&'a self, id: &'a StatusId, favourite: bool) -> BoxFuture<'a, Result<Status>>;
    fn reblog<'a>(&'a self, id: &'a StatusId, reblog: bool) -> BoxFuture<'a, Result<Status>>;
    fn bookmark<'a>(&'a self, id: &'a StatusId, bookmark: bool) -> BoxFuture<'a, Result<Status>>;
    fn pin<'a>(&'a self, id: &'a StatusId, pin: bool) -> BoxFuture<'a, Result<Status>>;
    fn vote<'a>(&'a self, poll_id: &'a str, choices: &'a [usize]) -> BoxFuture<'a, Result<Poll>>;
}
