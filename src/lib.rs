#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod api;
pub mod config;
pub mod entry;
pub mod feed;
pub mod gap;
pub mod invalidation;
pub mod mediator;
pub mod pager;
pub mod session;
pub mod store;
pub mod updates;

#[cfg(test)]
mod testing;

pub use crate::config::SessionConfig;
pub use crate::feed::{FeedKind, LoadType};
pub use crate::session::Timeline;
pub use crate::store::StatusStore;

use crate::api::{LinkHints, Poll, Status, StatusId};
use crate::error::*;
use crate::feed::{Page, PageRequest, RemoteFeedClient, StatusActions};
use futures::future::{BoxFuture, FutureExt};
use hyper::client::HttpConnector;
use hyper::client::connect::Connect;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, Response};
use hyper_tls::HttpsConnector;

/// Mastodon API client for one account on one instance.
pub struct Client<H = HttpsConnector<HttpConnector>> {
    http: hyper::Client<H>,
    instance_url: String,
    access_token: String,
    user_agent: HeaderValue,
}

impl Client {
    pub fn new<I, T>(instance_url: I, access_token: T, user_agent: &str) -> Result<Self>
    where
        I: Into<String>,
        T: Into<String>,
    {
        let http = hyper::Client::builder().build(HttpsConnector::new());
        Client::from_hyper_client(http, instance_url, access_token, user_agent)
    }
}

impl<H> Client<H>
where
    H: Connect + Clone + Send + Sync + 'static,
{
    pub fn from_hyper_client<I, T>(
        hyper: hyper::Client<H>,
        instance_url: I,
        access_token: T,
        user_agent: &str,
    ) -> Result<Self>
    where
        I: Into<String>,
        T: Into<String>,
    {
        let user_agent = HeaderValue::from_str(user_agent).chain_err(|| ErrorKind::Initialization)?;

        Ok(Client {
            http: hyper,
            instance_url: instance_url.into(),
            access_token: access_token.into(),
            user_agent,
        })
    }

    fn uri(&self, path: &str, query: &[(&str, String)]) -> Result<hyper::Uri> {
        let base = format!("{}{}", self.instance_url.trim_end_matches('/'), path);
        let mut url = url::Url::parse(&base).chain_err(|| ErrorKind::Uri(base.clone()))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for &(key, ref value) in query {
                pairs.append_pair(key, value);
            }
        }

        url.as_str()
            .parse::<hyper::Uri>()
            .chain_err(|| ErrorKind::Uri(url.to_string()))
    }

    async fn request<F>(
        &self,
        uri: Result<hyper::Uri>,
        method: hyper::Method,
        body: Body,
        modify_request: F,
    ) -> Result<Response<Body>>
    where
        F: FnOnce(hyper::http::request::Builder) -> hyper::http::request::Builder,
    {
        let uri = uri?;
        let builder = hyper::Request::builder()
            .method(method)
            .uri(uri.clone())
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token));
        let req = modify_request(builder)
            .body(body)
            .chain_err(|| ErrorKind::Uri(uri.to_string()))?;

        let resp = self.http.request(req).await.chain_err(|| ErrorKind::Network)?;

        // If we receive a non-2XX error code, extract the body
        // into a string and return the response as an error
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body())
            .await
            .chain_err(|| ErrorKind::Network)?;
        warn!("{} returned {}", uri, status);
        bail!(ErrorKind::StatusCode(
            status,
            String::from_utf8_lossy(&bytes).into(),
        ))
    }

    async fn request_json<T, F>(
        &self,
        uri: Result<hyper::Uri>,
        method: hyper::Method,
        body: Body,
        modify_request: F,
    ) -> Result<T>
    where
        F: FnOnce(hyper::http::request::Builder) -> hyper::http::request::Builder,
        T: serde::de::DeserializeOwned,
    {
        let resp = self.request(uri, method, body, modify_request).await?;
        json(resp).await
    }

    fn status_action<'a>(&'a self, id: &'a StatusId, action: &'static str) -> BoxFuture<'a, Result<Status>> {
        let uri = self.uri(&format!("/api/v1/statuses/{}/{}", id, action), &[]);
        debug!("{} status {}", action, id);
        self.request_json(uri, Method::POST, Body::empty(), |req| req).boxed()
    }
}

async fn json<T>(resp: Response<Body>) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = hyper::body::to_bytes(resp.into_body())
        .await
        .chain_err(|| ErrorKind::Network)?;

    serde_json::from_slice(&bytes).chain_err(|| {
        let invalid_json = String::from_utf8_lossy(&bytes);
        ErrorKind::Decode(invalid_json.into())
    })
}

fn vote_form(choices: &[usize]) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for choice in choices {
        form.append_pair("choices[]", &choice.to_string());
    }
    form.finish()
}

impl<H> RemoteFeedClient for Client<H>
where
    H: Connect + Clone + Send + Sync + 'static,
{
    fn fetch<'a>(&'a self, kind: &'a FeedKind, request: PageRequest) -> BoxFuture<'a, Result<Page>> {
        let mut query = kind.query_pairs();
        query.extend(request.query_pairs());
        let uri = self.uri(&kind.as_path(), &query);

        async move {
            let resp = self.request(uri, Method::GET, Body::empty(), |req| req).await?;
            let links = LinkHints::parse(
                resp.headers()
                    .get(header::LINK)
                    .and_then(|value| value.to_str().ok()),
            );
            let statuses: Vec<Status> = json(resp).await?;

            debug!("{:?}: fetched {} statuses, {:?}", kind, statuses.len(), links);
            Ok(Page { statuses, links })
        }.boxed()
    }
}

impl<H> StatusActions for Client<H>
where
    H: Connect + Clone + Send + Sync + 'static,
{
    fn favourite<'a>(&'a self, id: &'a StatusId, favourite: bool) -> BoxFuture<'a, Result<Status>> {
        self.status_action(id, if favourite { "favourite" } else { "unfavourite" })
    }

    fn reblog<'a>(&'a self, id: &'a StatusId, reblog: bool) -> BoxFuture<'a, Result<Status>> {
        self.status_action(id, if reblog { "reblog" } else { "unreblog" })
    }

    fn bookmark<'a>(&'a self, id: &'a StatusId, bookmark: bool) -> BoxFuture<'a, Result<Status>> {
        self.status_action(id, if bookmark { "bookmark" } else { "unbookmark" })
    }

    fn pin<'a>(&'a self, id: &'a StatusId, pin: bool) -> BoxFuture<'a, Result<Status>> {
        self.status_action(id, if pin { "pin" } else { "unpin" })
    }

    fn vote<'a>(&'a self, poll_id: &'a str, choices: &'a [usize]) -> BoxFuture<'a, Result<Poll>> {
        let uri = self.uri(&format!("/api/v1/polls/{}/votes", poll_id), &[]);
        let body = Body::from(vote_form(choices));

        self.request_json(uri, Method::POST, body, |req| {
            req.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        }).boxed()
    }
}
