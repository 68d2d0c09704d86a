// src/pipeline.rs
//! One collector run: prune → fetch → dedup → gate → store → backlog →
//! score → aggregate, then the output documents.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::article::ClassificationStatus;
use crate::classify::{Classifier, ClassifierGate};
use crate::config::{CollectorConfig, RunMode};
use crate::indicator::Indicator;
use crate::ingest::fetch_indicator;
use crate::ingest::prefilter::KeywordPrefilter;
use crate::ingest::types::FeedSource;
use crate::scoring::{score_overall, OverallScore, WINDOW_DAYS};
use crate::store::logs::{
    append_jsonl, append_text_line, format_text_line, upsert_dated_file, ArticleCounts,
    DailySnapshot, RiskLogEntry, RunRecord, StateRecord,
};
use crate::store::{write_json_atomic, ArticleStore};

/// Per-run counters, persisted with the risk log and run log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub store_pruned: usize,
    pub queries_total: u32,
    pub queries_ok: u32,
    pub queries_failed: u32,
    pub fetched: u32,
    pub too_old: u32,
    pub new_articles: u32,
    pub dedup_skips: u32,
    pub prefilter_skips: u32,
    pub budget_skips: u32,
    pub classify_calls: u32,
    pub classify_errors: u32,
    pub backlog_classified: u32,
    pub per_indicator_calls: BTreeMap<Indicator, u32>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_at: DateTime<FixedOffset>,
    pub run_date: NaiveDate,
    pub mode: RunMode,
    pub classifier: String,
    pub stats: RunStats,
    pub overall: OverallScore,
    pub counts: ArticleCounts,
}

impl RunOutcome {
    pub fn snapshot(&self) -> DailySnapshot {
        DailySnapshot {
            date: self.run_date,
            run_at: self.run_at,
            composite: self.overall.composite,
            bucket: self.overall.bucket,
            scores: self.overall.scores(),
            meta: self
                .overall
                .indicators
                .iter()
                .map(|(k, r)| (*k, r.summary))
                .collect(),
            counts: self.counts,
        }
    }

    pub fn risk_entry(&self) -> RiskLogEntry {
        RiskLogEntry {
            date: self.run_date,
            run_at: self.run_at,
            composite: self.overall.composite,
            bucket: self.overall.bucket,
            scores: self.overall.scores(),
            indicators: self.overall.indicators.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn run_record(&self) -> RunRecord {
        RunRecord {
            run_at: self.run_at,
            mode: self.mode.as_str().to_string(),
            classifier: self.classifier.clone(),
            stats: self.stats.clone(),
            composite: self.overall.composite,
            bucket: self.overall.bucket,
            scores: self.overall.scores(),
        }
    }

    pub fn state(&self) -> StateRecord {
        StateRecord {
            last_run_at: self.run_at,
            last_composite: self.overall.composite,
            last_bucket: self.overall.bucket,
        }
    }
}

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collector_queries_total", "Feed queries issued.");
        describe_counter!("collector_query_errors_total", "Feed queries that failed.");
        describe_counter!("collector_feed_entries_total", "Entries parsed from feeds.");
        describe_counter!(
            "collector_articles_new_total",
            "Articles stored for the first time."
        );
        describe_counter!(
            "collector_classify_calls_total",
            "Articles sent to the classifier."
        );
        describe_counter!(
            "collector_classify_errors_total",
            "Classifications that failed after retries."
        );
        describe_counter!(
            "collector_prefilter_skips_total",
            "Articles stopped by the keyword prefilter."
        );
        describe_counter!(
            "collector_budget_skips_total",
            "Articles left unclassified by the call budget."
        );
        describe_histogram!("collector_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("collector_composite_score", "Latest composite risk score.");
        describe_gauge!("collector_last_run_ts", "Unix ts of the last collector run.");
    });
}

/// Execute one run against `store`. Feed and classifier failures are
/// absorbed into the stats; only setup errors are returned.
pub async fn run_once<S: ArticleStore + ?Sized>(
    cfg: &CollectorConfig,
    feed: &dyn FeedSource,
    classifier: &dyn Classifier,
    store: &mut S,
    now: DateTime<FixedOffset>,
) -> Result<RunOutcome> {
    ensure_metrics_described();
    let tz = cfg.timezone();
    let now = now.with_timezone(&tz);
    let today = now.date_naive();
    let mut stats = RunStats::default();

    let cutoff = today - Duration::days(cfg.limits.retention_days);
    stats.store_pruned = store.prune(cutoff, &tz);
    if stats.store_pruned > 0 {
        info!(pruned = stats.store_pruned, %cutoff, "pruned expired articles");
    }

    let prefilter = KeywordPrefilter::from_config(cfg)?;
    let mut gate = ClassifierGate::new(cfg, classifier, &prefilter);
    let mut new_ids: HashSet<String> = HashSet::new();

    for ind in &cfg.indicators {
        let fetched = fetch_indicator(feed, cfg, ind, today, now).await;
        stats.queries_ok += fetched.queries_ok;
        stats.queries_failed += fetched.queries_failed;
        stats.queries_total += fetched.queries_ok + fetched.queries_failed;
        stats.fetched += fetched.fetched;
        stats.too_old += fetched.too_old;

        for mut article in fetched.articles {
            if store.get(&article.id).is_some() || store.contains_key(&article.dedup_key()) {
                stats.dedup_skips += 1;
                continue;
            }
            article.classification = gate.evaluate(&article, now).await;
            let id = article.id.clone();
            if store.put(article) {
                stats.new_articles += 1;
                new_ids.insert(id);
            } else {
                stats.dedup_skips += 1;
            }
        }
    }

    stats.backlog_classified = drain_backlog(store, &mut gate, &new_ids, today, &tz, now).await;

    let gs = gate.stats();
    stats.prefilter_skips = gs.prefilter_skips;
    stats.budget_skips = gs.budget_skips;
    stats.classify_calls = gs.calls;
    stats.classify_errors = gs.errors;
    stats.per_indicator_calls = gate.budget().per_indicator().clone();

    let articles = store.articles();
    let overall = score_overall(&articles, today, cfg, &prefilter);
    let counts = ArticleCounts {
        total_stored: articles.len(),
        recent14: articles
            .iter()
            .filter(|a| (0..=WINDOW_DAYS).contains(&a.age_days(today, &tz)))
            .count(),
        new_today: stats.new_articles as usize,
    };

    counter!("collector_articles_new_total").increment(u64::from(stats.new_articles));
    gauge!("collector_composite_score").set(overall.composite);
    gauge!("collector_last_run_ts").set(now.timestamp() as f64);

    info!(
        composite = overall.composite,
        bucket = %overall.bucket,
        new_articles = stats.new_articles,
        calls = stats.classify_calls,
        errors = stats.classify_errors,
        "run scored"
    );

    Ok(RunOutcome {
        run_at: now,
        run_date: today,
        mode: cfg.run_mode,
        classifier: classifier.identity().to_string(),
        stats,
        overall,
        counts,
    })
}

/// Re-submit stored `skipped_budget` articles inside the scoring window,
/// newest first, while budget remains. Returns how many got a new status.
async fn drain_backlog<S: ArticleStore + ?Sized>(
    store: &mut S,
    gate: &mut ClassifierGate<'_>,
    skip: &HashSet<String>,
    today: NaiveDate,
    tz: &FixedOffset,
    now: DateTime<FixedOffset>,
) -> u32 {
    if gate.budget_exhausted() {
        return 0;
    }
    let mut backlog: Vec<_> = store
        .articles()
        .into_iter()
        .filter(|a| a.classification == ClassificationStatus::SkippedBudget)
        .filter(|a| !skip.contains(&a.id))
        .filter(|a| (0..=WINDOW_DAYS).contains(&a.age_days(today, tz)))
        .cloned()
        .collect();
    backlog.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    debug!(pending = backlog.len(), "backlog candidates");

    let mut done = 0u32;
    for article in backlog {
        if gate.budget_exhausted() {
            break;
        }
        if !gate.budget().allows(article.indicator) {
            continue;
        }
        let status = gate.evaluate(&article, now).await;
        if status != ClassificationStatus::SkippedBudget {
            store.set_status(&article.id, status);
            done += 1;
        }
    }
    if done > 0 {
        info!(backlog = done, "backlog articles processed");
    }
    done
}

/// Write every output document for a finished run.
pub fn persist_outputs<S: ArticleStore + ?Sized>(
    cfg: &CollectorConfig,
    store: &S,
    outcome: &RunOutcome,
) -> Result<()> {
    let paths = &cfg.paths;
    store.persist()?;
    upsert_dated_file(&paths.daily_scores(), outcome.snapshot())?;
    let risk_log = upsert_dated_file(&paths.risk_log(), outcome.risk_entry())?;
    if paths.write_legacy_files {
        write_json_atomic(&paths.legacy_risk_log(), &risk_log)?;
    }
    write_json_atomic(&paths.state(), &outcome.state())?;

    let record = outcome.run_record();
    append_jsonl(&paths.run_log(), &record)?;
    append_text_line(&paths.text_log(), &format_text_line(&record))?;
    Ok(())
}
