//! Pagination hints from the `Link` response header.
//!
//! Mastodon paginates with headers of the form
//!
//! ```text
//! Link: <https://example.com/api/v1/timelines/home?max_id=103>; rel="next",
//!       <https://example.com/api/v1/timelines/home?min_id=110>; rel="prev"
//! ```

use super::StatusId;
use url::Url;

/// Ids the server suggests for fetching the adjacent pages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkHints {
    /// Upper bound (`max_id`) of the next, older page.
    pub next: Option<StatusId>,
    /// Lower bound (`min_id` or `since_id`) of the previous, newer page.
    pub prev: Option<StatusId>,
}

#[derive(Clone, Debug, PartialEq)]
struct Link<'a> {
    uri: &'a str,
    rel: Option<&'a str>,
}

impl LinkHints {
    /// Malformed or missing links simply produce no hint.
    pub fn parse(header: Option<&str>) -> LinkHints {
        let mut hints = LinkHints::default();

        for link in header.map(parse_links).unwrap_or_default() {
            match link.rel {
                Some("next") => hints.next = query_id(link.uri, &["max_id"]),
                Some("prev") => hints.prev = query_id(link.uri, &["min_id", "since_id"]),
                _ => {}
            }
        }

        hints
    }
}

fn parse_links(header: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut rest = header;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let close = match after_open.find('>') {
            Some(close) => close,
            None => break,
        };

        let uri = &after_open[..close];
        let params_end = after_open[close..].find('<').map_or(
            after_open.len(),
            |next| close + next,
        );
        let params = &after_open[close + 1..params_end];

        let rel = params
            .split(|c| c == ';' || c == ',')
            .filter_map(|param| {
                let mut kv = param.splitn(2, '=');
                match (kv.next().map(str::trim), kv.next()) {
                    (Some("rel"), Some(value)) => Some(value.trim().trim_matches('"')),
                    _ => None,
                }
            })
            .next();

        links.push(Link { uri, rel });
        rest = &after_open[params_end..];
    }

    links
}

fn query_id(uri: &str, keys: &[&str]) -> Option<StatusId> {
    let url = Url::parse(uri).ok()?;

    keys.iter().filter_map(|key| {
        url.query_pairs()
            .find(|&(ref k, _)| k == key)
            .map(|(_, v)| StatusId::new(v.into_owned()))
    }).next()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn next_and_prev() {
        let header = "<https://mastodon.social/api/v1/timelines/home?max_id=103206804533200177>; \
                      rel=\"next\", \
                      <https://mastodon.social/api/v1/timelines/home?min_id=103206804533200199>; \
                      rel=\"prev\"";

        let hints = LinkHints::parse(Some(header));
        assert_eq!(hints.next, Some(StatusId::new("103206804533200177")));
        assert_eq!(hints.prev, Some(StatusId::new("103206804533200199")));
    }

    #[test]
    fn since_id_and_extra_params() {
        let header = "<https://example.com/api/v1/favourites?limit=20&since_id=7>; rel=\"prev\"; \
                      title=\"newer\"";

        let hints = LinkHints::parse(Some(header));
        assert_eq!(hints.next, None);
        assert_eq!(hints.prev, Some(StatusId::new("7")));
    }

    #[test]
    fn missing_or_garbage() {
        assert_eq!(LinkHints::parse(None), LinkHints::default());
        assert_eq!(LinkHints::parse(Some("")), LinkHints::default());
        assert_eq!(LinkHints::parse(Some("<not a url>; rel=\"next\"")), LinkHints::default());
        assert_eq!(LinkHints::parse(Some("<https://example.com/?max_id=5")), LinkHints::default());
    }
}
