use anyhow::{Context, Result};
use clap::Parser;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use boorubot::config;
use boorubot::danbooru::DanbooruClient;
use boorubot::media::HttpMediaFetcher;
use boorubot::pleroma::PleromaClient;
use boorubot::relay::{Relay, RelayConfig};
use boorubot::state::FileStateStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file (defaults to ./config.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;

    let http = Client::builder()
        .user_agent(concat!("boorubot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let danbooru_url = Url::parse(&cfg.danbooru.url).context("invalid danbooru.url")?;
    let pleroma_url = Url::parse(&cfg.pleroma.url).context("invalid pleroma.url")?;
    let source = Arc::new(DanbooruClient::new(
        http.clone(),
        danbooru_url,
        &cfg.danbooru.login,
        &cfg.danbooru.api_key,
    ));
    let sink = Arc::new(PleromaClient::new(
        http.clone(),
        pleroma_url,
        cfg.pleroma.api_key.clone(),
    ));
    let media = Arc::new(HttpMediaFetcher::new(http));
    let store = Arc::new(FileStateStore::new(&cfg.app.state_file));

    match source.count_posts(&cfg.danbooru.tags).await {
        Ok(count) => info!(count, tags = ?cfg.danbooru.tags, "source post count"),
        Err(err) => warn!(?err, "failed to count source posts"),
    }

    let relay = Relay::new(
        RelayConfig {
            interval: cfg.app.interval(),
            post_interval: cfg.app.post_interval(),
            page_limit: cfg.app.page_limit,
            tags: cfg.danbooru.tags.clone(),
            permalink_base: cfg.app.permalink_base.clone(),
        },
        source,
        sink,
        media,
        store,
    )?;

    info!(
        source = %cfg.danbooru.url,
        sink = %cfg.pleroma.url,
        interval_secs = cfg.app.interval_secs,
        "starting relay"
    );
    relay
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(?err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
