use std::cmp::Ordering;
use std::fmt;

pub type DateTime = chrono::DateTime<chrono::Utc>;
pub type AccountId = String;
pub type MentionId = String;
pub type AttachmentId = String;
pub type PollId = String;

/// Server-assigned status identifier.
///
/// Ids are opaque strings, but servers hand them out in increasing order, so
/// two ids compare by magnitude: a longer id is always newer, and ids of equal
/// length compare character by character. For decimal ids this is exactly
/// numeric order (`"100" > "99"`). Leading zeros are dropped on
/// construction, so `"099"` and `"99"` are the same id.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub struct StatusId(String);

impl StatusId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let mut id = id.into();
        let zeros = id.len() - id.trim_start_matches('0').len();
        if zeros == id.len() && zeros > 0 {
            id.truncate(1);
        } else if zeros > 0 {
            id.replace_range(..zeros, "");
        }
        StatusId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The smallest id greater than this one.
    pub fn inc(&self) -> StatusId {
        let mut chars = self.0.as_bytes().to_vec();

        for c in chars.iter_mut().rev() {
            if *c < b'9' || (*c > b'9' && *c < b'z') {
                *c += 1;
                return StatusId(String::from_utf8_lossy(&chars).into_owned());
            } else if *c == b'9' && chars_are_alphanumeric(&self.0) {
                *c = b'a';
                return StatusId(String::from_utf8_lossy(&chars).into_owned());
            }
            *c = b'0';
        }

        chars.insert(0, b'1');
        StatusId(String::from_utf8_lossy(&chars).into_owned())
    }

    /// The largest id smaller than this one. `"0"` has no predecessor and is
    /// returned unchanged.
    pub fn dec(&self) -> StatusId {
        if self.0.bytes().all(|c| c == b'0') {
            return self.clone();
        }

        let alphanumeric = chars_are_alphanumeric(&self.0);
        let top = if alphanumeric { b'z' } else { b'9' };
        let mut chars = self.0.as_bytes().to_vec();

        for c in chars.iter_mut().rev() {
            if *c == b'a' && alphanumeric {
                *c = b'9';
                break;
            } else if *c > b'0' {
                *c -= 1;
                break;
            }
            *c = top;
        }

        // "100" - 1 is "99", not "099"
        let start = chars.iter().position(|c| *c != b'0').unwrap_or(
            chars.len() - 1,
        );
        StatusId(String::from_utf8_lossy(&chars[start..]).into_owned())
    }
}

fn chars_are_alphanumeric(id: &str) -> bool {
    id.bytes().any(|c| c.is_ascii_alphabetic())
}

impl Ord for StatusId {
    fn cmp(&self, other: &StatusId) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for StatusId {
    fn partial_cmp(&self, other: &StatusId) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> From<&'a str> for StatusId {
    fn from(id: &'a str) -> Self {
        StatusId::new(id)
    }
}

impl From<String> for StatusId {
    fn from(id: String) -> Self {
        StatusId::new(id)
    }
}

impl From<StatusId> for String {
    fn from(id: StatusId) -> Self {
        id.0
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Status {
    pub id: StatusId,
    pub uri: String,
    pub url: Option<String>,
    pub account: Account,
    pub in_reply_to_id: Option<StatusId>,
    pub in_reply_to_account_id: Option<AccountId>,
    pub reblog: Option<Box<Status>>,
    pub content: String,
    pub created_at: DateTime,
    pub reblogs_count: i32,
    pub favourites_count: i32,
    #[serde(default)]
    pub reblogged: bool,
    #[serde(default)]
    pub favourited: bool,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub sensitive: bool,
    pub spoiler_text: String,
    pub visibility: Visibility,
    pub media_attachments: Vec<Attachment>,
    pub mentions: Vec<Mention>,
    pub tags: Vec<Tag>,
    pub application: Option<Application>,
    pub language: Option<String>,
    pub poll: Option<Poll>,
}

impl Status {
    /// The status a user interacts with: the reblogged original for a
    /// reblog, otherwise the status itself.
    pub fn actionable(&self) -> &Status {
        match self.reblog {
            Some(ref original) => &**original,
            None => self,
        }
    }

    pub fn actionable_mut(&mut self) -> &mut Status {
        match self.reblog {
            Some(ref mut original) => &mut **original,
            None => self,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Mention {
    pub id: MentionId,
    pub url: String,
    pub username: String,
    pub acct: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Application {
    pub name: String,
    pub website: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub acct: String,
    pub display_name: String,
    pub locked: bool,
    pub created_at: DateTime,
    pub followers_count: i32,
    pub following_count: i32,
    pub statuses_count: i32,
    pub note: String,
    pub url: String,
    pub avatar: String,
    pub avatar_static: String,
    pub header: String,
    pub header_static: String,
}

impl Account {
    /// Host part of the account's profile URL.
    pub fn domain(&self) -> Option<String> {
        ::url::Url::parse(&self.url).ok().and_then(|url| {
            url.host_str().map(|host| host.to_string())
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Attachment {
    pub id: AttachmentId,
    #[serde(rename = "type")]
    pub media_type: String, // TODO: Enum values -- image, video, gifv, audio, unknown
    pub url: String,
    pub remote_url: Option<String>,
    pub preview_url: Option<String>,
    pub text_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Poll {
    pub id: PollId,
    pub expires_at: Option<DateTime>,
    pub expired: bool,
    pub multiple: bool,
    pub votes_count: i32,
    pub voters_count: Option<i32>,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub voted: bool,
    #[serde(default)]
    pub own_votes: Vec<usize>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PollOption {
    pub title: String,
    pub votes_count: Option<i32>,
}
