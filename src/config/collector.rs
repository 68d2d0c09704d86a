// src/config/collector.rs
//! Collector configuration: one immutable value built at startup and passed
//! explicitly into the fetcher, gate and scorer.
//!
//! Lookup order for the config document:
//! 1) $BUBBLE_WATCH_CONFIG
//! 2) config/collector.toml
//! 3) config/collector.json
//! 4) built-in defaults
//!
//! `RUN_MODE=fast|prod` overrides `run_mode`; fast mode then rewrites the
//! limits and retry sections with its preset.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::classifier::ClassifierConfig;
use crate::indicator::Indicator;

pub const ENV_CONFIG_PATH: &str = "BUBBLE_WATCH_CONFIG";
pub const ENV_RUN_MODE: &str = "RUN_MODE";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Fast,
    #[default]
    Prod,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Fast => "fast",
            RunMode::Prod => "prod",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Some(RunMode::Fast),
            "prod" => Some(RunMode::Prod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Directory for legacy-location copies of the article store and risk log.
    pub legacy_dir: PathBuf,
    pub write_legacy_files: bool,
    /// Prometheus text exposition written after each run, if set.
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            legacy_dir: PathBuf::from("."),
            write_legacy_files: false,
            metrics_textfile: None,
        }
    }
}

impl PathsConfig {
    pub fn articles(&self) -> PathBuf {
        self.data_dir.join("articles.json")
    }
    pub fn risk_log(&self) -> PathBuf {
        self.data_dir.join("risk_log.json")
    }
    pub fn daily_scores(&self) -> PathBuf {
        self.data_dir.join("daily_scores.json")
    }
    pub fn state(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
    pub fn run_log(&self) -> PathBuf {
        self.data_dir.join("run_log.jsonl")
    }
    pub fn text_log(&self) -> PathBuf {
        self.log_dir.join("collector.log")
    }
    pub fn legacy_articles(&self) -> PathBuf {
        self.legacy_dir.join("articles.json")
    }
    pub fn legacy_risk_log(&self) -> PathBuf {
        self.legacy_dir.join("risk_log.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_entries_per_query: usize,
    /// Use only the first N queries of each indicator (fast mode uses 1).
    pub queries_per_indicator: Option<usize>,
    pub max_calls_per_run: u32,
    pub max_calls_per_indicator: Option<u32>,
    pub summary_chars: usize,
    pub retention_days: i64,
    /// Entries published earlier than `run_date - max_age_days` are dropped at fetch.
    pub max_age_days: i64,
    pub feed_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_entries_per_query: 50,
            queries_per_indicator: None,
            max_calls_per_run: 60,
            max_calls_per_indicator: None,
            summary_chars: 900,
            retention_days: 45,
            max_age_days: 21,
            feed_timeout_secs: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Linear backoff: attempt `n` (1-based) waits `n * backoff_base_ms`.
    pub backoff_base_ms: u64,
    /// Pause after every classification call.
    pub throttle_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            throttle_ms: 300,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Tunable scoring policy. The blend and corroboration values are uncalibrated
/// constants kept configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub min_confidence: u8,
    pub fresh_blend: f64,
    pub decay_blend: f64,
    pub corroboration_min_hits: usize,
    pub corroboration_bonus: f64,
    pub top_evidence: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 60,
            fresh_blend: 0.6,
            decay_blend: 0.4,
            corroboration_min_hits: 3,
            corroboration_bonus: 0.5,
            top_evidence: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub indicator: Indicator,
    pub weight: f64,
    pub queries: Vec<String>,
    /// Case-insensitive regex patterns, used both as prefilter and as
    /// strong-keyword corroboration in the scorer.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub run_mode: RunMode,
    /// Offset from UTC used for calendar dates (default +9h).
    pub utc_offset_hours: i32,
    pub paths: PathsConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub scoring: ScoringPolicy,
    pub classifier: ClassifierConfig,
    pub indicators: Vec<IndicatorConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Prod,
            utc_offset_hours: 9,
            paths: PathsConfig::default(),
            limits: LimitsConfig::default(),
            retry: RetryConfig::default(),
            scoring: ScoringPolicy::default(),
            classifier: ClassifierConfig::default(),
            indicators: default_indicators(),
        }
    }
}

impl CollectorConfig {
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.saturating_mul(3600)).unwrap_or(Utc.fix())
    }

    pub fn indicator(&self, ind: Indicator) -> Option<&IndicatorConfig> {
        self.indicators.iter().find(|c| c.indicator == ind)
    }

    /// Queries actually issued for an indicator this run.
    pub fn queries_for<'a>(&self, ind: &'a IndicatorConfig) -> &'a [String] {
        match self.limits.queries_per_indicator {
            Some(n) => &ind.queries[..n.min(ind.queries.len())],
            None => &ind.queries,
        }
    }

    /// Overwrite limits/retry/timeouts with the preset for `mode`.
    pub fn apply_run_mode(&mut self, mode: RunMode) {
        self.run_mode = mode;
        if mode == RunMode::Fast {
            self.limits.max_calls_per_run = 8;
            self.limits.max_entries_per_query = 5;
            self.limits.queries_per_indicator = Some(1);
            self.limits.max_calls_per_indicator = Some(2);
            self.retry.max_attempts = 1;
            self.retry.throttle_ms = 150;
            self.classifier.connect_timeout_secs = 5;
            self.classifier.read_timeout_secs = 10;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for ic in &self.indicators {
            if !seen.insert(ic.indicator) {
                bail!("indicator {} configured twice", ic.indicator);
            }
            if !(0.0..=1.0).contains(&ic.weight) {
                bail!("indicator {} weight {} outside [0,1]", ic.indicator, ic.weight);
            }
            if ic.keywords.is_empty() {
                bail!("indicator {} has no keyword patterns", ic.indicator);
            }
        }
        if let Some(missing) = Indicator::ALL.iter().find(|i| !seen.contains(*i)) {
            bail!("indicator {missing} missing from config");
        }
        let sum: f64 = self.indicators.iter().map(|c| c.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("indicator weights must sum to 1.0 (got {sum})");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.limits.retention_days < 0 || self.limits.max_age_days < 0 {
            bail!("retention_days and max_age_days must be non-negative");
        }
        if FixedOffset::east_opt(self.utc_offset_hours.saturating_mul(3600)).is_none() {
            bail!("utc_offset_hours {} out of range", self.utc_offset_hours);
        }
        Ok(())
    }
}

/// Load config from an explicit path. Supports TOML or JSON (by extension).
pub fn load_from(path: &Path) -> Result<CollectorConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing config {}", path.display()))?;
    finish(cfg)
}

/// Load using env var + fallbacks; see module docs.
pub fn load_default() -> Result<CollectorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        return load_from(&pb);
    }
    let toml_p = PathBuf::from("config/collector.toml");
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from("config/collector.json");
    if json_p.exists() {
        return load_from(&json_p);
    }
    finish(CollectorConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<CollectorConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    Ok(toml::from_str(s)?)
}

fn finish(mut cfg: CollectorConfig) -> Result<CollectorConfig> {
    let mode = match std::env::var(ENV_RUN_MODE) {
        Ok(raw) => RunMode::parse(&raw).ok_or_else(|| anyhow!("invalid {ENV_RUN_MODE}: {raw}"))?,
        Err(_) => cfg.run_mode,
    };
    cfg.apply_run_mode(mode);
    cfg.validate()?;
    Ok(cfg)
}

fn ind(indicator: Indicator, weight: f64, queries: &[&str], keywords: &[&str]) -> IndicatorConfig {
    IndicatorConfig {
        indicator,
        weight,
        queries: queries.iter().map(|s| s.to_string()).collect(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn default_indicators() -> Vec<IndicatorConfig> {
    vec![
        ind(
            Indicator::AiPriceCuts,
            0.20,
            &[
                "cloud GPU price cut discount credits when:14d",
                "AI compute price reduction cloud when:14d",
            ],
            &[
                r"\bprice cut\b",
                r"\bdiscount\b",
                r"\bcredit\b",
                r"\breduce prices\b",
                r"\blower pricing\b",
                r"\bcheaper\b",
            ],
        ),
        ind(
            Indicator::MgmtToneSoftening,
            0.15,
            &[
                "earnings call AI capacity lead times easing when:14d",
                "AI compute capacity constraint easing earnings when:14d",
            ],
            &[
                r"\beasing\b",
                r"\blead times\b",
                r"\bcapacity constraint\b",
                r"\bsupply improving\b",
                r"\bmore available\b",
            ],
        ),
        ind(
            Indicator::CapexUpRevenueDown,
            0.20,
            &[
                "hyperscaler capex increase cloud growth slowdown when:14d",
                "AI capex surge cloud revenue slowdown when:14d",
            ],
            &[
                r"\bcapex\b",
                r"\bcapital spending\b",
                r"\bcloud growth slowdown\b",
                r"\brevenue slowdown\b",
                r"\bspending surge\b",
                r"\bcapex risks\b",
            ],
        ),
        ind(
            Indicator::DcVacancy,
            0.15,
            &[
                "colocation vacancy data center lease concessions when:14d",
                "data center oversupply vacancy when:14d",
            ],
            &[
                r"\bvacancy\b",
                r"\boversupply\b",
                r"\bconcession\b",
                r"\bincentive\b",
                r"\blease concessions\b",
                r"\bempty capacity\b",
                r"\brecord-low vacancy\b",
            ],
        ),
        ind(
            Indicator::PowerPermitDelays,
            0.10,
            &[
                "data center power constraint permitting delay when:14d",
                "grid interconnection queue data center when:14d",
                "transformer shortage data center delay when:14d",
            ],
            &[
                r"\bdelay\b",
                r"\bbacklog\b",
                r"\bpermitting\b",
                r"\binterconnection\b",
                r"\bqueue\b",
                r"\bpower constraint\b",
                r"\bgrid\b",
                r"\btransformer shortage\b",
            ],
        ),
        ind(
            Indicator::MarketPositioning,
            0.20,
            &[
                "investors overinvestment AI capex concerns survey when:14d",
                "AI capex bubble concerns fund manager survey when:14d",
            ],
            &[
                r"\boverinvestment\b",
                r"\bbubble\b",
                r"\bconcerns\b",
                r"\bsurvey\b",
                r"\bfund manager\b",
                r"\bpositioning\b",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn defaults_validate() {
        let cfg = CollectorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.indicators.len(), 6);
        assert_eq!(cfg.timezone().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut cfg = CollectorConfig::default();
        cfg.indicators[0].weight = 0.5;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("sum to 1.0"), "{err}");
    }

    #[test]
    fn missing_indicator_is_rejected() {
        let mut cfg = CollectorConfig::default();
        let removed = cfg.indicators.pop().unwrap();
        cfg.indicators[0].weight += removed.weight;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fast_mode_preset() {
        let mut cfg = CollectorConfig::default();
        cfg.apply_run_mode(RunMode::Fast);
        assert_eq!(cfg.limits.max_calls_per_run, 8);
        assert_eq!(cfg.limits.max_entries_per_query, 5);
        assert_eq!(cfg.retry.max_attempts, 1);
        let power = cfg.indicator(Indicator::PowerPermitDelays).unwrap();
        assert_eq!(cfg.queries_for(power).len(), 1);
    }

    #[test]
    fn linear_backoff() {
        let r = RetryConfig::default();
        assert_eq!(r.backoff(1), Duration::from_secs(1));
        assert_eq!(r.backoff(2), Duration::from_secs(2));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_RUN_MODE);

        // No files in the temp CWD -> built-in defaults.
        let cfg = load_default().unwrap();
        assert_eq!(cfg.run_mode, RunMode::Prod);
        assert_eq!(cfg.limits.max_calls_per_run, 60);

        // Env path wins; partial TOML keeps defaults for the rest.
        let p = tmp.path().join("custom.toml");
        fs::write(
            &p,
            "run_mode = \"prod\"\n[limits]\nmax_calls_per_run = 5\n[scoring]\nmin_confidence = 70\n",
        )
        .unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = load_default().unwrap();
        assert_eq!(cfg.limits.max_calls_per_run, 5);
        assert_eq!(cfg.limits.retention_days, 45);
        assert_eq!(cfg.scoring.min_confidence, 70);

        // RUN_MODE overrides the document.
        env::set_var(ENV_RUN_MODE, "fast");
        let cfg = load_default().unwrap();
        assert_eq!(cfg.run_mode, RunMode::Fast);
        assert_eq!(cfg.limits.max_calls_per_run, 8);

        env::set_var(ENV_RUN_MODE, "turbo");
        assert!(load_default().is_err());

        env::remove_var(ENV_RUN_MODE);
        env::remove_var(ENV_CONFIG_PATH);
        env::set_current_dir(&old).unwrap();
    }
}
