use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::media::Media;
use crate::pleroma::model::{Envelope, MediaResponse};

pub mod model;

pub use model::{Status, StatusCreateRequest};

/// Failures reported by the Pleroma instance itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("pleroma rejected request: {0}")]
    Rejected(String),
    #[error("pleroma error {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Write side of the social network.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Upload an attachment and return its media id.
    async fn upload_media(&self, media: &Media) -> Result<String>;

    async fn create_status(&self, request: &StatusCreateRequest) -> Result<Status>;
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\pL\pN_]+").expect("valid tag regex"));
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\pN+$").expect("valid numeric regex"));

/// Render a board tag as a hashtag: `hatsune_miku` → `#hatsune_miku`,
/// `42` → `#_42`, `k-on!` → `#k_on_`.
pub fn make_tag(tag: &str) -> String {
    let tag = if NUMERIC.is_match(tag) {
        format!("_{}", tag)
    } else {
        tag.to_string()
    };
    format!("#{}", NON_WORD.replace_all(&tag, "_"))
}

#[derive(Clone)]
pub struct PleromaClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for PleromaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PleromaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl PleromaClient {
    pub fn new(http: Client, base_url: Url, token: String) -> Self {
        Self {
            http,
            base_url,
            token,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(self.endpoint(path));
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    pub fn build_status_request(&self, body: &StatusCreateRequest) -> Result<reqwest::Request> {
        self.post("api/v1/statuses")
            .json(body)
            .build()
            .context("failed to build status request")
    }

    pub fn build_media_request(&self, media: &Media) -> Result<reqwest::Request> {
        let part = reqwest::multipart::Part::bytes(media.bytes.clone())
            .file_name(media.file_name.clone())
            .mime_str(&media.content_type)
            .context("invalid media content type")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.post("api/v1/media")
            .multipart(form)
            .build()
            .context("failed to build media request")
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach pleroma")?;
        let status = res.status();
        let body = res.text().await.context("failed to read pleroma response")?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .filter(|e| !e.is_empty());
            warn!(%status, "pleroma request failed");
            return Err(match message {
                Some(message) => ApiError::Rejected(message).into(),
                None => ApiError::Status { status, body }.into(),
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).context("invalid pleroma response JSON")?;
        if let Some(message) = envelope.error.filter(|e| !e.is_empty()) {
            return Err(ApiError::Rejected(message).into());
        }
        Ok(envelope.payload)
    }

    #[instrument(skip_all, fields(file = %media.file_name))]
    pub async fn upload_media(&self, media: &Media) -> Result<String> {
        let request = self.build_media_request(media)?;
        let payload: MediaResponse = self.execute(request).await?;
        info!(media_id = %payload.id, "uploaded media");
        Ok(payload.id)
    }

    #[instrument(skip_all)]
    pub async fn create_status(&self, body: &StatusCreateRequest) -> Result<Status> {
        let request = self.build_status_request(body)?;
        let status: Status = self.execute(request).await?;
        info!(status_id = %status.id, "created status");
        Ok(status)
    }
}

#[async_trait]
impl StatusSink for PleromaClient {
    async fn upload_media(&self, media: &Media) -> Result<String> {
        PleromaClient::upload_media(self, media).await
    }

    async fn create_status(&self, request: &StatusCreateRequest) -> Result<Status> {
        PleromaClient::create_status(self, request).await
    }
}
