//! Collector binary: one run per invocation (schedule it daily).
//!
//! Reads `.env`, loads the collector config, fetches and classifies news,
//! scores the six indicators and writes the output documents under the
//! configured data and log directories.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use bubble_watch::classify::build_classifier;
use bubble_watch::config;
use bubble_watch::ingest::providers::GoogleNewsRss;
use bubble_watch::pipeline::{persist_outputs, run_once};
use bubble_watch::store::logs::format_text_line;
use bubble_watch::store::{ArticleStore, JsonArticleStore};
use bubble_watch::telemetry::{self, Metrics};

async fn run() -> Result<()> {
    let mut cfg = config::load_default().context("loading collector config")?;

    let (classifier, enabled) = build_classifier(&cfg.classifier);
    if !enabled {
        cfg.limits.max_calls_per_run = 0;
    }
    info!(
        mode = cfg.run_mode.as_str(),
        classifier = classifier.identity(),
        budget = cfg.limits.max_calls_per_run,
        "collector starting"
    );

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = ?e, "metrics recorder unavailable");
            None
        }
    };

    let feed = GoogleNewsRss::new(
        Duration::from_secs(cfg.limits.feed_timeout_secs),
        cfg.limits.max_entries_per_query,
    )?;
    let mut store = JsonArticleStore::from_paths(&cfg.paths);
    info!(stored = store.len(), path = %store.path().display(), "article store loaded");

    let now = Utc::now().with_timezone(&cfg.timezone());
    let outcome = run_once(&cfg, &feed, classifier.as_ref(), &mut store, now).await?;
    persist_outputs(&cfg, &store, &outcome).context("writing outputs")?;
    info!("{}", format_text_line(&outcome.run_record()));

    if let (Some(m), Some(path)) = (metrics.as_ref(), cfg.paths.metrics_textfile.as_ref()) {
        if let Err(e) = m.write_textfile(path) {
            warn!(error = ?e, path = %path.display(), "metrics textfile not written");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "collector run failed");
            ExitCode::FAILURE
        }
    }
}
