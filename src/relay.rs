//! Polling loop that republishes new board posts as Pleroma statuses.
//!
//! Each cycle loads the cursor, walks the board newest-first until it reaches
//! an already published id, then publishes the collected posts oldest-first.
//! The cursor is saved after every successful publish and never before, so a
//! crash can repeat a post but never skip one.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument};

use crate::danbooru::{Post, PostListQuery, PostSource};
use crate::media::MediaFetcher;
use crate::pleroma::{make_tag, StatusCreateRequest, StatusSink};
use crate::state::{State, StateStore};

const STATUS_CONTENT_TYPE: &str = "text/html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Poll period, minimum post age and cycle timeout.
    pub interval: Duration,
    /// Pause between two published posts.
    pub post_interval: Duration,
    pub page_limit: u32,
    pub tags: Vec<String>,
    pub permalink_base: String,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub published: usize,
    pub cursor: u64,
}

pub struct Relay {
    config: RelayConfig,
    source: Arc<dyn PostSource>,
    sink: Arc<dyn StatusSink>,
    media: Arc<dyn MediaFetcher>,
    store: Arc<dyn StateStore>,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn PostSource>,
        sink: Arc<dyn StatusSink>,
        media: Arc<dyn MediaFetcher>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(anyhow!("non-positive polling interval"));
        }
        if config.post_interval.is_zero() {
            return Err(anyhow!("non-positive post interval"));
        }
        if config.page_limit == 0 {
            return Err(anyhow!("page limit must be > 0"));
        }
        Ok(Self {
            config,
            source,
            sink,
            media,
            store,
        })
    }

    /// Poll until `shutdown` resolves. Cycle failures are logged and retried
    /// after the next interval.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_cycle() => match outcome {
                    Ok(report) => info!(published = report.published, cursor = report.cursor, "relay cycle finished"),
                    Err(err) => error!(?err, "relay cycle failed"),
                },
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.config.interval) => {}
            }
        }
        info!("relay stopped");
    }

    /// One cycle, bounded by the polling interval.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Like [`Relay::run_cycle`], judging post age against `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        match timeout(self.config.interval, self.cycle(now)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!(
                "relay cycle timed out after {}s",
                self.config.interval.as_secs()
            )),
        }
    }

    #[instrument(skip_all)]
    async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut state = self.store.load().await.context("failed to load state")?;
        let mut posts = self.fetch_new_posts(state.last_post, now).await?;
        posts.reverse();
        info!(cursor = state.last_post, new_posts = posts.len(), "fetched new posts");

        let mut published = 0;
        for (i, post) in posts.iter().enumerate() {
            if i > 0 {
                sleep(self.config.post_interval).await;
            }
            self.publish(post, &mut state)
                .await
                .with_context(|| format!("failed to publish post {}", post.id))?;
            published += 1;
        }

        Ok(CycleReport {
            published,
            cursor: state.last_post,
        })
    }

    /// Posts newer than `cursor` that are ready to publish, newest first.
    #[instrument(skip(self, now))]
    pub async fn fetch_new_posts(&self, cursor: u64, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let min_age = chrono::Duration::from_std(self.config.interval)
            .context("polling interval out of range")?;
        let mut posts = Vec::new();
        let mut page = 1;

        loop {
            let query = PostListQuery {
                tags: self.config.tags.clone(),
                page,
                limit: self.config.page_limit,
            };
            let batch = self
                .source
                .list_posts(&query)
                .await
                .with_context(|| format!("failed to list posts page {}", page))?;
            // A short page is not the end: the board may cap `limit` below ours.
            if batch.is_empty() {
                return Ok(posts);
            }

            for post in batch {
                if !is_ready(&post, now, min_age) {
                    debug!(post_id = post.id, "skipping post that is not ready");
                    continue;
                }
                if post.id <= cursor {
                    return Ok(posts);
                }
                posts.push(post);
            }

            page += 1;
        }
    }

    /// Upload the post's file, create the status, then advance the cursor.
    #[instrument(skip_all, fields(post_id = post.id))]
    pub async fn publish(&self, post: &Post, state: &mut State) -> Result<()> {
        let media = self.media.fetch(post).await?;
        let media_id = self
            .sink
            .upload_media(&media)
            .await
            .context("failed to upload media")?;

        let request = StatusCreateRequest {
            status: status_body(&self.config.permalink_base, post),
            content_type: STATUS_CONTENT_TYPE.into(),
            in_reply_to_id: None,
            media_ids: vec![media_id],
            sensitive: !post.rating.is_safe(),
        };
        let status = self
            .sink
            .create_status(&request)
            .await
            .context("failed to create status")?;

        state.last_post = state.last_post.max(post.id);
        self.store
            .save(state)
            .await
            .context("failed to persist cursor")?;
        info!(status_id = %status.id, cursor = state.last_post, "published post");
        Ok(())
    }
}

/// Pending, deleted and file-less posts are never published; posts younger
/// than `min_age` are left for a later cycle.
fn is_ready(post: &Post, now: DateTime<Utc>, min_age: chrono::Duration) -> bool {
    if post.id == 0 || post.is_pending || post.is_deleted || post.file_url.is_empty() {
        return false;
    }
    match post.created_at {
        Some(created_at) => now.signed_duration_since(created_at) >= min_age,
        None => true,
    }
}

/// Permalink to the post, followed by its character tags as hashtags.
pub fn status_body(permalink_base: &str, post: &Post) -> String {
    let base = permalink_base.trim_end_matches('/');
    let mut body = format!(
        r#"<a href="{base}/posts/{id}">Post #{id}</a>"#,
        base = base,
        id = post.id
    );
    let tags: Vec<String> = post.character_tags().map(make_tag).collect();
    if !tags.is_empty() {
        body.push_str("<br/>");
        body.push_str(&tags.join(" "));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ready_post(id: u64) -> Post {
        Post {
            id,
            created_at: Some(now() - chrono::Duration::hours(2)),
            file_url: format!("https://booru.example/data/{}.png", id),
            ..Default::default()
        }
    }

    #[test]
    fn body_links_post_and_lists_tags() {
        let mut post = ready_post(4213);
        post.tag_string_character = "hatsune_miku  42".into();
        assert_eq!(
            status_body("//booru.eientei.org", &post),
            r##"<a href="//booru.eientei.org/posts/4213">Post #4213</a><br/>#hatsune_miku #_42"##
        );
    }

    #[test]
    fn body_without_character_tags() {
        let post = ready_post(9);
        assert_eq!(
            status_body("https://booru.example/", &post),
            r#"<a href="https://booru.example/posts/9">Post #9</a>"#
        );
    }

    #[test]
    fn readiness_filters() {
        let hour = chrono::Duration::hours(1);
        assert!(is_ready(&ready_post(1), now(), hour));

        let mut young = ready_post(1);
        young.created_at = Some(now() - chrono::Duration::minutes(59));
        assert!(!is_ready(&young, now(), hour));

        let mut exactly = ready_post(1);
        exactly.created_at = Some(now() - hour);
        assert!(is_ready(&exactly, now(), hour));

        let mut pending = ready_post(1);
        pending.is_pending = true;
        assert!(!is_ready(&pending, now(), hour));

        let mut deleted = ready_post(1);
        deleted.is_deleted = true;
        assert!(!is_ready(&deleted, now(), hour));

        let mut no_file = ready_post(1);
        no_file.file_url.clear();
        assert!(!is_ready(&no_file, now(), hour));

        assert!(!is_ready(&ready_post(0), now(), hour));

        let mut undated = ready_post(1);
        undated.created_at = None;
        assert!(is_ready(&undated, now(), hour));
    }
}
