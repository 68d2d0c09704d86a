// src/store/logs.rs
//! Per-run output documents: daily snapshot log, risk log, run log (JSON
//! Lines), state record and the plain-text run line.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{load_json_or_default, write_json_atomic};
use crate::indicator::Indicator;
use crate::pipeline::RunStats;
use crate::scoring::{IndicatorResult, IndicatorSummary, RiskBucket};

/// Records keyed by calendar date; one per date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArticleCounts {
    pub total_stored: usize,
    pub recent14: usize,
    pub new_today: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub run_at: DateTime<FixedOffset>,
    pub composite: f64,
    pub bucket: RiskBucket,
    pub scores: BTreeMap<Indicator, u8>,
    pub meta: BTreeMap<Indicator, IndicatorSummary>,
    pub counts: ArticleCounts,
}

impl Dated for DailySnapshot {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLogEntry {
    pub date: NaiveDate,
    pub run_at: DateTime<FixedOffset>,
    pub composite: f64,
    pub bucket: RiskBucket,
    pub scores: BTreeMap<Indicator, u8>,
    /// Per-indicator metadata including evidence.
    pub indicators: BTreeMap<Indicator, IndicatorResult>,
    pub stats: RunStats,
}

impl Dated for RiskLogEntry {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_at: DateTime<FixedOffset>,
    pub mode: String,
    pub classifier: String,
    pub stats: RunStats,
    pub composite: f64,
    pub bucket: RiskBucket,
    pub scores: BTreeMap<Indicator, u8>,
}

/// Last-run summary; informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub last_run_at: DateTime<FixedOffset>,
    pub last_composite: f64,
    pub last_bucket: RiskBucket,
}

/// Load a dated log, dropping records that fail to parse.
pub fn load_dated<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw: Vec<serde_json::Value> = load_json_or_default(path);
    let total = raw.len();
    let out: Vec<T> = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if out.len() < total {
        warn!(
            path = %path.display(),
            dropped = total - out.len(),
            "dropped malformed log records"
        );
    }
    out
}

/// Replace any record with the same date, keep ascending date order.
pub fn upsert_dated<T: Dated>(entries: &mut Vec<T>, entry: T) {
    let date = entry.date();
    entries.retain(|e| e.date() != date);
    entries.push(entry);
    entries.sort_by_key(|e| e.date());
}

/// Load, upsert and atomically rewrite a dated log.
pub fn upsert_dated_file<T>(path: &Path, entry: T) -> Result<Vec<T>>
where
    T: Dated + Serialize + DeserializeOwned,
{
    let mut entries: Vec<T> = load_dated(path);
    upsert_dated(&mut entries, entry);
    write_json_atomic(path, &entries)?;
    Ok(entries)
}

fn open_append(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// Append one JSON line.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut line = serde_json::to_string(record).context("serializing run record")?;
    line.push('\n');
    open_append(path)?
        .write_all(line.as_bytes())
        .with_context(|| format!("appending {}", path.display()))
}

pub fn format_text_line(record: &RunRecord) -> String {
    format!(
        "[{}] mode={} overall={:.1} risk={} new_articles={} llm_calls={} llm_errors={}",
        record.run_at.format("%Y-%m-%d %H:%M:%S"),
        record.mode,
        record.composite,
        record.bucket,
        record.stats.new_articles,
        record.stats.classify_calls,
        record.stats.classify_errors,
    )
}

pub fn append_text_line(path: &Path, line: &str) -> Result<()> {
    writeln!(open_append(path)?, "{line}").with_context(|| format!("appending {}", path.display()))
}
