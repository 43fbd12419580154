//! Fixtures shared by the unit tests.

use crate::api::{Account, LinkHints, Poll, PollOption, Status, StatusId, Visibility};
use crate::error::*;
use crate::feed::{FeedKind, Page, PageRequest, RemoteFeedClient, StatusActions};
use chrono::{TimeZone, Utc};
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::VecDeque;

pub use crate::config::SessionConfig;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        username: format!("user{}", id),
        acct: format!("user{}@example.com", id),
        display_name: String::new(),
        locked: false,
        created_at: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
        followers_count: 0,
        following_count: 0,
        statuses_count: 0,
        note: String::new(),
        url: format!("https://example.com/@user{}", id),
        avatar: String::new(),
        avatar_static: String::new(),
        header: String::new(),
        header_static: String::new(),
    }
}

pub fn status(id: &str) -> Status {
    Status {
        id: StatusId::new(id),
        uri: format!("https://example.com/statuses/{}", id),
        url: None,
        account: account("1"),
        in_reply_to_id: None,
        in_reply_to_account_id: None,
        reblog: None,
        content: format!("<p>status {}</p>", id),
        created_at: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
        reblogs_count: 0,
        favourites_count: 0,
        reblogged: false,
        favourited: false,
        bookmarked: false,
        pinned: false,
        sensitive: false,
        spoiler_text: String::new(),
        visibility: Visibility::Public,
        media_attachments: Vec::new(),
        mentions: Vec::new(),
        tags: Vec::new(),
        application: None,
        language: None,
        poll: None,
    }
}

pub fn statuses(ids: &[&str]) -> Vec<Status> {
    ids.iter().map(|id| status(id)).collect()
}

/// Status `id` reblogging status `original`.
pub fn reblog(id: &str, original: &str) -> Status {
    let mut wrapper = status(id);
    let mut reblogged = status(original);
    reblogged.account = account("2");
    wrapper.reblog = Some(Box::new(reblogged));
    wrapper
}

pub fn poll(id: &str, voted: bool) -> Poll {
    Poll {
        id: id.to_string(),
        expires_at: None,
        expired: false,
        multiple: false,
        votes_count: if voted { 1 } else { 0 },
        voters_count: None,
        options: vec![
            PollOption {
                title: "yes".into(),
                votes_count: Some(if voted { 1 } else { 0 }),
            },
            PollOption {
                title: "no".into(),
                votes_count: Some(0),
            },
        ],
        voted,
        own_votes: if voted { vec![0] } else { Vec::new() },
    }
}

pub fn page(ids: &[&str], next: Option<&str>) -> Page {
    Page {
        statuses: statuses(ids),
        links: LinkHints {
            next: next.map(StatusId::new),
            prev: None,
        },
    }
}

enum Scripted {
    Ready(Result<Page>),
    Deferred(oneshot::Receiver<Result<Page>>),
}

/// Remote client answering fetches from a queue. An exhausted queue answers
/// with empty pages.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(FeedKind, PageRequest)>>,
    actions: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        ScriptedClient::default()
    }

    pub fn respond(&self, page: Page) -> &Self {
        self.responses.lock().push_back(Scripted::Ready(Ok(page)));
        self
    }

    pub fn fail(&self, kind: ErrorKind) -> &Self {
        self.responses.lock().push_back(Scripted::Ready(Err(kind.into())));
        self
    }

    /// The fetch stays pending until the returned sender is used.
    pub fn defer(&self) -> oneshot::Sender<Result<Page>> {
        let (tx, rx) = oneshot::channel();
        self.responses.lock().push_back(Scripted::Deferred(rx));
        tx
    }

    pub fn requests(&self) -> Vec<(FeedKind, PageRequest)> {
        self.requests.lock().clone()
    }

    /// Interaction calls seen so far, as `"<action> <id>"`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    fn record(&self, action: &str, id: &str) {
        self.actions.lock().push(format!("{} {}", action, id));
    }
}

impl RemoteFeedClient for ScriptedClient {
    fn fetch<'a>(&'a self, kind: &'a FeedKind, request: PageRequest) -> BoxFuture<'a, Result<Page>> {
        self.requests.lock().push((kind.clone(), request));
        let next = self.responses.lock().pop_front();

        match next {
            Some(Scripted::Ready(result)) => futures::future::ready(result).boxed(),
            Some(Scripted::Deferred(rx)) => {
                rx.map(|result| {
                    result.unwrap_or_else(|_| Err(ErrorKind::Network.into()))
                }).boxed()
            }
            None => {
                futures::future::ok(Page {
                    statuses: Vec::new(),
                    links: LinkHints::default(),
                }).boxed()
            }
        }
    }
}

impl StatusActions for ScriptedClient {
    fn favourite<'a>(&'a self, id: &'a StatusId, favourite: bool) -> BoxFuture<'a, Result<Status>> {
        self.record("favourite", id.as_str());
        let mut updated = status(id.as_str());
        updated.favourited = favourite;
        futures::future::ok(updated).boxed()
    }

    fn reblog<'a>(&'a self, id: &'a StatusId, reblog: bool) -> BoxFuture<'a, Result<Status>> {
        self.record("reblog", id.as_str());
        let mut updated = status(id.as_str());
        updated.reblogged = reblog;
        futures::future::ok(updated).boxed()
    }

    fn bookmark<'a>(&'a self, id: &'a StatusId, bookmark: bool) -> BoxFuture<'a, Result<Status>> {
        self.record("bookmark", id.as_str());
        let mut updated = status(id.as_str());
        updated.bookmarked = bookmark;
        futures::future::ok(updated).boxed()
    }

    fn pin<'a>(&'a self, id: &'a StatusId, pin: bool) -> BoxFuture<'a, Result<Status>> {
        self.record("pin", id.as_str());
        if id.as_str() == "404" {
            return futures::future::err(
                ErrorKind::StatusCode(hyper::StatusCode::NOT_FOUND, "gone".into()).into(),
            ).boxed();
        }

        let mut updated = status(id.as_str());
        updated.pinned = pin;
        futures::future::ok(updated).boxed()
    }

    fn vote<'a>(&'a self, poll_id: &'a str, _choices: &'a [usize]) -> BoxFuture<'a, Result<Poll>> {
        self.record("vote", poll_id);
        futures::future::ok(poll(poll_id, true)).boxed()
    }
}
