use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use std::path::Path;
use tracing::{debug, instrument};

use crate::danbooru::Post;

/// A downloaded post file, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, post: &Post) -> Result<Media>;
}

/// Downloads post files with a plain HTTP client.
#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    http: Client,
}

impl HttpMediaFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    #[instrument(skip_all, fields(post_id = post.id))]
    async fn fetch(&self, post: &Post) -> Result<Media> {
        let url = Url::parse(&post.file_url)
            .with_context(|| format!("invalid file url for post {}: {}", post.id, post.file_url))?;
        let file_name = file_name_for(post, &url);

        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to download media")?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "media download for post {} failed: {}",
                post.id,
                res.status()
            ));
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(post, &file_name).to_string());
        let bytes = res.bytes().await.context("failed to read media body")?;
        debug!(file = %file_name, size = bytes.len(), "downloaded media");

        Ok(Media {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

/// Last path segment of the file URL, or `{id}.{ext}` when the URL has none.
pub fn file_name_for(post: &Post, url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if post.file_ext.is_empty() {
                post.id.to_string()
            } else {
                format!("{}.{}", post.id, post.file_ext)
            }
        })
}

/// Mime type from the board's `file_ext`, else from the upload file name.
pub fn guess_content_type(post: &Post, file_name: &str) -> &'static str {
    let ext = if post.file_ext.is_empty() {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    } else {
        post.file_ext.as_str()
    };
    mime_for_extension(ext)
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: u64, ext: &str) -> Post {
        Post {
            id,
            file_ext: ext.into(),
            ..Default::default()
        }
    }

    #[test]
    fn file_name_from_url_path() {
        let url = Url::parse("https://booru.example/data/original/ab/cd/abcd.png?download=1").unwrap();
        assert_eq!(file_name_for(&post(7, "png"), &url), "abcd.png");
    }

    #[test]
    fn file_name_falls_back_to_post_id() {
        let url = Url::parse("https://booru.example/").unwrap();
        assert_eq!(file_name_for(&post(7, "webm"), &url), "7.webm");
        assert_eq!(file_name_for(&post(7, ""), &url), "7");
    }

    #[test]
    fn content_type_by_extension() {
        // The board's extension wins over the URL's.
        assert_eq!(guess_content_type(&post(1, "webm"), "1.bin"), "video/webm");
        assert_eq!(guess_content_type(&post(1, "JPG"), "1"), "image/jpeg");
        assert_eq!(guess_content_type(&post(1, ""), "a.PNG"), "image/png");
        assert_eq!(guess_content_type(&post(1, ""), "a.zip"), "application/octet-stream");
        assert_eq!(guess_content_type(&post(1, ""), "a"), "application/octet-stream");
    }
}
