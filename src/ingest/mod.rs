// src/ingest/mod.rs
pub mod normalize;
pub mod prefilter;
pub mod providers;
pub mod types;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use metrics::counter;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::article::Article;
use crate::config::{CollectorConfig, IndicatorConfig};
use crate::ingest::types::{FeedEntry, FeedSource};

/// Counters and surviving candidates for one indicator's queries.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub queries_ok: u32,
    pub queries_failed: u32,
    pub fetched: u32,
    pub too_old: u32,
}

/// Parse a feed timestamp (RFC 2822, then RFC 3339) into `tz`.
pub fn parse_published(raw: &str, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()?;
    tz.timestamp_opt(parsed.unix_timestamp(), parsed.nanosecond())
        .single()
}

/// Earliest publish date still accepted at fetch time.
pub fn age_ceiling(today: NaiveDate, max_age_days: i64) -> NaiveDate {
    today - Duration::days(max_age_days)
}

/// Turn raw entries into candidate articles: resolve publish time (fetch time
/// as fallback) and drop anything published before the age ceiling.
pub fn build_candidates(
    cfg: &CollectorConfig,
    ind: &IndicatorConfig,
    entries: Vec<FeedEntry>,
    today: NaiveDate,
    now: DateTime<FixedOffset>,
) -> (Vec<Article>, u32) {
    let tz = cfg.timezone();
    let ceiling = age_ceiling(today, cfg.limits.max_age_days);
    let mut too_old = 0u32;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.title.trim().is_empty() && entry.link.trim().is_empty() {
            continue;
        }
        let published_at = parse_published(&entry.published, &tz).unwrap_or(now);
        if published_at.with_timezone(&tz).date_naive() < ceiling {
            too_old += 1;
            continue;
        }
        out.push(Article::from_entry(ind.indicator, &entry, published_at, now));
    }
    (out, too_old)
}

/// Run every configured query of one indicator, one at a time. A failing
/// query is logged and skipped.
pub async fn fetch_indicator(
    feed: &dyn FeedSource,
    cfg: &CollectorConfig,
    ind: &IndicatorConfig,
    today: NaiveDate,
    now: DateTime<FixedOffset>,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();
    for query in cfg.queries_for(ind) {
        counter!("collector_queries_total").increment(1);
        let entries = match feed.fetch(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    provider = feed.name(),
                    indicator = %ind.indicator,
                    %query,
                    "feed query failed"
                );
                counter!("collector_query_errors_total").increment(1);
                outcome.queries_failed += 1;
                continue;
            }
        };
        outcome.queries_ok += 1;

        let capped: Vec<FeedEntry> = entries
            .into_iter()
            .take(cfg.limits.max_entries_per_query)
            .collect();
        outcome.fetched += capped.len() as u32;
        tracing::info!(indicator = %ind.indicator, %query, entries = capped.len(), "feed query ok");

        let (mut articles, too_old) = build_candidates(cfg, ind, capped, today, now);
        outcome.too_old += too_old;
        outcome.articles.append(&mut articles);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn parses_rfc2822_and_rfc3339() {
        let d = parse_published("Mon, 03 Mar 2025 20:00:00 GMT", &kst()).unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        let d = parse_published("2025-03-03T10:00:00Z", &kst()).unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert!(parse_published("yesterday-ish", &kst()).is_none());
        assert!(parse_published("", &kst()).is_none());
    }

    #[test]
    fn candidates_drop_old_and_fallback_to_now() {
        let cfg = CollectorConfig::default();
        let ind = cfg.indicator(Indicator::DcVacancy).unwrap().clone();
        let today = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
        let now = kst().with_ymd_and_hms(2025, 3, 25, 7, 0, 0).unwrap();
        let e = |title: &str, published: &str| FeedEntry {
            title: title.into(),
            link: format!("https://x.com/{title}"),
            published: published.into(),
            summary: String::new(),
        };
        let entries = vec![
            // exactly 21 days old: kept
            e("edge", "2025-03-04T12:00:00+09:00"),
            // 22 days old: dropped
            e("old", "2025-03-03T12:00:00+09:00"),
            // unparsable: fetch time
            e("nodate", "garbage"),
            FeedEntry::default(),
        ];
        let (out, too_old) = build_candidates(&cfg, &ind, entries, today, now);
        assert_eq!(too_old, 1);
        let titles: Vec<_> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["edge", "nodate"]);
        assert_eq!(out[1].published_at, now);
    }
}
