//! Forum thread acquisition.
//!
//! [`fetch_threads`] turns raw items from any [`ForumSource`] into [`Thread`]
//! records. [`RedditClient`] is the production source: app-only OAuth, the
//! `/new` listing, and a full comment-tree walk that expands every collapsed
//! "more" node before comment text is joined.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RedditConfig;
use crate::thread::Thread;
use crate::TARGET_WEB_REQUEST;

/// Reddit caps listing pages and morechildren requests at 100 ids
const PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("forum '{0}' not found or access denied")]
    NotFoundOrForbidden(String),
    #[error("transient fetch error: {0}")]
    TransientFetchError(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::TransientFetchError(err.to_string())
    }
}

/// A comment as delivered by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawComment {
    pub body: String,
}

/// A discussion item as delivered by the source, comments fully expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub comments: Vec<RawComment>,
    pub url: String,
    /// Seconds since the epoch, UTC
    pub created_utc: i64,
}

impl RawItem {
    pub fn into_thread(self) -> Thread {
        let created = DateTime::from_timestamp(self.created_utc, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or(NaiveDate::MIN);
        let comments = self
            .comments
            .iter()
            .map(|c| c.body.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Thread::new(self.id, self.title, self.body, comments, self.url, created)
    }
}

/// A place threads can be fetched from, newest first.
#[async_trait]
pub trait ForumSource: Send + Sync {
    async fn fetch(&self, forum_id: &str, limit: usize) -> Result<Vec<RawItem>, FetchError>;
}

/// Fetch up to `limit` threads from a forum, newest first.
///
/// `on_item` is called once per thread, in order.
pub async fn fetch_threads<S>(
    source: &S,
    forum_id: &str,
    limit: usize,
    mut on_item: impl FnMut(&Thread),
) -> Result<Vec<Thread>, FetchError>
where
    S: ForumSource + ?Sized,
{
    if limit == 0 {
        return Ok(Vec::new());
    }

    let items = source.fetch(forum_id, limit).await?;
    let threads: Vec<Thread> = items
        .into_iter()
        .take(limit)
        .map(|item| {
            let thread = item.into_thread();
            on_item(&thread);
            thread
        })
        .collect();

    info!(forum = forum_id, count = threads.len(), "fetched threads");
    Ok(threads)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: String,
    created_utc: f64,
}

#[derive(Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    data: Option<MoreChildrenData>,
}

#[derive(Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

/// Reddit API client using app-only OAuth
pub struct RedditClient {
    http: Client,
    config: RedditConfig,
    client_id: String,
    client_secret: String,
}

impl RedditClient {
    pub fn new(
        config: RedditConfig,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let http = create_client(&config.user_agent, config.request_timeout())?;
        Ok(Self {
            http,
            config,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let response = self
            .http
            .post(&self.config.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "reddit app credentials"));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn get_json(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
        forum_id: &str,
    ) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        debug!(target: TARGET_WEB_REQUEST, url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("raw_json", "1".to_string())])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, forum_id));
        }
        Ok(response.json().await?)
    }

    /// Walk the `/new` listing until `limit` posts have been collected
    async fn list_posts(
        &self,
        token: &str,
        forum_id: &str,
        limit: usize,
    ) -> Result<Vec<PostData>, FetchError> {
        let path = format!("/r/{}/new", forum_id);
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let page = (limit - posts.len()).min(PAGE_SIZE);
            let mut query = vec![("limit", page.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let value = self.get_json(token, &path, &query, forum_id).await?;
            // Unknown subreddits can answer 200 with a non-listing payload
            let listing: Listing = serde_json::from_value(value)
                .map_err(|_| FetchError::NotFoundOrForbidden(forum_id.to_string()))?;

            let before = posts.len();
            let mut foreign = 0;
            for thing in listing.data.children {
                if thing.kind != "t3" {
                    foreign += 1;
                    continue;
                }
                let post: PostData = serde_json::from_value(thing.data)
                    .map_err(|e| FetchError::TransientFetchError(e.to_string()))?;
                posts.push(post);
            }

            // A page of only non-post things is a search result, not this forum
            if posts.is_empty() && foreign > 0 {
                return Err(FetchError::NotFoundOrForbidden(forum_id.to_string()));
            }

            after = listing.data.after;
            if after.is_none() || posts.len() == before {
                break;
            }
        }

        posts.truncate(limit);
        Ok(posts)
    }

    /// Load every comment of a post, expanding all "more" placeholders
    async fn load_comments(
        &self,
        token: &str,
        forum_id: &str,
        post_id: &str,
    ) -> Result<Vec<RawComment>, FetchError> {
        let path = format!("/comments/{}", post_id);
        let value = self
            .get_json(token, &path, &[("limit", "500".to_string())], forum_id)
            .await?;

        let mut walk = CommentWalk::default();
        // Response is [post listing, comment listing]
        if let Some(tree) = value.get(1) {
            walk.collect_listing(tree);
        }

        let link_id = format!("t3_{}", post_id);
        let mut continued = HashSet::new();
        loop {
            if !walk.pending.is_empty() {
                let take = walk.pending.len().min(PAGE_SIZE);
                let chunk: Vec<String> = walk.pending.drain(..take).collect();
                let query = [
                    ("api_type", "json".to_string()),
                    ("link_id", link_id.clone()),
                    ("children", chunk.join(",")),
                ];
                let value = self
                    .get_json(token, "/api/morechildren", &query, forum_id)
                    .await?;
                let more: MoreChildrenResponse = serde_json::from_value(value)
                    .map_err(|e| FetchError::TransientFetchError(e.to_string()))?;

                for thing in more.json.data.map(|d| d.things).unwrap_or_default() {
                    walk.collect_thing(&thing.kind, &thing.data);
                }
            } else if let Some(parent) = walk.continuations.pop() {
                if !continued.insert(parent.clone()) {
                    continue;
                }
                // "Continue this thread": reload the subtree rooted at the parent
                let path = format!("/comments/{}/_/{}", post_id, parent);
                let value = self
                    .get_json(token, &path, &[("limit", "500".to_string())], forum_id)
                    .await?;
                if let Some(tree) = value.get(1) {
                    walk.collect_subtree(tree, &parent);
                }
            } else {
                break;
            }
        }

        Ok(walk.comments)
    }
}

#[async_trait]
impl ForumSource for RedditClient {
    async fn fetch(&self, forum_id: &str, limit: usize) -> Result<Vec<RawItem>, FetchError> {
        let forum_id = forum_id.trim().trim_start_matches("r/");
        if forum_id.is_empty() {
            return Err(FetchError::NotFoundOrForbidden(forum_id.to_string()));
        }

        let token = self.access_token().await?;
        let posts = self.list_posts(&token, forum_id, limit).await?;

        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            let comments = self.load_comments(&token, forum_id, &post.id).await?;
            debug!(target: TARGET_WEB_REQUEST, id = %post.id, comments = comments.len(), "loaded post");
            let url = if post.permalink.is_empty() {
                post.url
            } else {
                format!("https://www.reddit.com{}", post.permalink)
            };
            items.push(RawItem {
                id: post.id,
                title: post.title,
                body: post.selftext,
                comments,
                url,
                created_utc: post.created_utc as i64,
            });
        }
        Ok(items)
    }
}

/// Create a configured HTTP client for forum requests
fn create_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    // Unknown subreddits redirect to a search page; treat that as a miss
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(Policy::none())
        .build()
}

fn classify_status(status: StatusCode, forum_id: &str) -> FetchError {
    if status.is_redirection() {
        return FetchError::NotFoundOrForbidden(forum_id.to_string());
    }
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
            FetchError::NotFoundOrForbidden(forum_id.to_string())
        }
        other => FetchError::TransientFetchError(format!("HTTP {} for {}", other, forum_id)),
    }
}

/// Comments gathered from a post plus the placeholders still to expand
#[derive(Default)]
struct CommentWalk {
    comments: Vec<RawComment>,
    /// Comment ids hidden behind "load more comments"
    pending: Vec<String>,
    /// Parent comment ids whose replies sit past the depth cap
    continuations: Vec<String>,
}

impl CommentWalk {
    /// Collect comment bodies from a listing, in tree order
    fn collect_listing(&mut self, listing: &Value) {
        let children = listing.pointer("/data/children").and_then(Value::as_array);
        for child in children.into_iter().flatten() {
            let kind = child.get("kind").and_then(Value::as_str).unwrap_or_default();
            if let Some(data) = child.get("data") {
                self.collect_thing(kind, data);
            }
        }
    }

    /// Collect a continued subtree; the root comment was already collected
    fn collect_subtree(&mut self, listing: &Value, parent: &str) {
        let children = listing.pointer("/data/children").and_then(Value::as_array);
        for child in children.into_iter().flatten() {
            let kind = child.get("kind").and_then(Value::as_str).unwrap_or_default();
            let Some(data) = child.get("data") else {
                continue;
            };
            if kind == "t1" && data.get("id").and_then(Value::as_str) == Some(parent) {
                if let Some(replies) = data.get("replies").filter(|r| r.is_object()) {
                    self.collect_listing(replies);
                }
            } else {
                self.collect_thing(kind, data);
            }
        }
    }

    fn collect_thing(&mut self, kind: &str, data: &Value) {
        match kind {
            "t1" => {
                if let Some(body) = data.get("body").and_then(Value::as_str) {
                    self.comments.push(RawComment {
                        body: body.to_string(),
                    });
                }
                // Leaf comments carry "" instead of a listing
                if let Some(replies) = data.get("replies").filter(|r| r.is_object()) {
                    self.collect_listing(replies);
                }
            }
            "more" => {
                let ids: Vec<String> = data
                    .get("children")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if !ids.is_empty() {
                    self.pending.extend(ids);
                } else if let Some(parent) = data
                    .get("parent_id")
                    .and_then(Value::as_str)
                    .and_then(|p| p.strip_prefix("t1_"))
                {
                    self.continuations.push(parent.to_string());
                }
            }
            _ => {}
        }
    }
}
