use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::{debug, instrument};

use crate::danbooru::model::CountResponse;

pub mod model;

pub use model::{Post, Rating};

/// Parameters for a `/posts.json` page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListQuery {
    pub tags: Vec<String>,
    pub page: u32,
    pub limit: u32,
}

/// Read side of the image board.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// One page of posts, newest first.
    async fn list_posts(&self, query: &PostListQuery) -> Result<Vec<Post>>;

    /// Number of posts matching `tags`.
    async fn count_posts(&self, tags: &[String]) -> Result<u64>;
}

#[derive(Clone)]
pub struct DanbooruClient {
    http: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl fmt::Debug for DanbooruClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DanbooruClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl DanbooruClient {
    /// Credentials are only used when both `login` and `api_key` are set.
    pub fn new(http: Client, base_url: Url, login: &str, api_key: &str) -> Self {
        let credentials = (!login.is_empty() && !api_key.is_empty())
            .then(|| (login.to_string(), api_key.to_string()));
        Self {
            http,
            base_url,
            credentials,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        match &self.credentials {
            Some((login, key)) => builder.basic_auth(login, Some(key)),
            None => builder,
        }
    }

    pub fn build_list_request(&self, query: &PostListQuery) -> Result<reqwest::Request> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if !query.tags.is_empty() {
            params.push(("tags", query.tags.join(" ")));
        }
        if query.limit > 0 {
            params.push(("limit", query.limit.to_string()));
        }
        if query.page > 0 {
            params.push(("page", query.page.to_string()));
        }
        self.get(self.endpoint("posts.json"))
            .query(&params)
            .build()
            .context("failed to build post list request")
    }

    pub fn build_count_request(&self, tags: &[String]) -> Result<reqwest::Request> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if !tags.is_empty() {
            params.push(("tags", tags.join(" ")));
        }
        self.get(self.endpoint("counts/posts.json"))
            .query(&params)
            .build()
            .context("failed to build post count request")
    }

    async fn execute<T: serde::de::DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        debug!(url = %request.url(), "danbooru request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach danbooru")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("danbooru error {}: {}", status, body));
        }
        res.json::<T>()
            .await
            .context("invalid danbooru response JSON")
    }

    #[instrument(skip_all, fields(page = query.page))]
    pub async fn list_posts(&self, query: &PostListQuery) -> Result<Vec<Post>> {
        let request = self.build_list_request(query)?;
        self.execute(request).await
    }

    #[instrument(skip_all)]
    pub async fn count_posts(&self, tags: &[String]) -> Result<u64> {
        let request = self.build_count_request(tags)?;
        let payload: CountResponse = self.execute(request).await?;
        Ok(payload.counts.posts)
    }
}

#[async_trait]
impl PostSource for DanbooruClient {
    async fn list_posts(&self, query: &PostListQuery) -> Result<Vec<Post>> {
        DanbooruClient::list_posts(self, query).await
    }

    async fn count_posts(&self, tags: &[String]) -> Result<u64> {
        DanbooruClient::count_posts(self, tags).await
    }
}
