//! Weighted composite (0–100) over the six indicator scores, plus bucketing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{score_indicator, IndicatorResult, MAX_SCORE};
use crate::article::Article;
use crate::config::CollectorConfig;
use crate::indicator::Indicator;
use crate::ingest::prefilter::KeywordPrefilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskBucket {
    Low,
    Moderate,
    Caution,
    Warning,
    Danger,
}

impl RiskBucket {
    /// `[0,20) Low … [80,100] Danger`.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 20.0 => RiskBucket::Low,
            s if s < 40.0 => RiskBucket::Moderate,
            s if s < 60.0 => RiskBucket::Caution,
            s if s < 80.0 => RiskBucket::Warning,
            _ => RiskBucket::Danger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Low => "Low",
            RiskBucket::Moderate => "Moderate",
            RiskBucket::Caution => "Caution",
            RiskBucket::Warning => "Warning",
            RiskBucket::Danger => "Danger",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `round(100 * Σ score/4 * weight, 1)`. Indicators missing from `scores`
/// contribute zero.
pub fn composite_score(scores: &BTreeMap<Indicator, u8>, cfg: &CollectorConfig) -> f64 {
    let total: f64 = cfg
        .indicators
        .iter()
        .map(|ic| {
            let s = scores.get(&ic.indicator).copied().unwrap_or(0);
            f64::from(s) / f64::from(MAX_SCORE) * ic.weight
        })
        .sum();
    (total * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallScore {
    pub composite: f64,
    pub bucket: RiskBucket,
    pub indicators: BTreeMap<Indicator, IndicatorResult>,
}

impl OverallScore {
    pub fn scores(&self) -> BTreeMap<Indicator, u8> {
        self.indicators.iter().map(|(k, r)| (*k, r.score)).collect()
    }
}

/// Score every configured indicator against the store contents and aggregate.
pub fn score_overall(
    articles: &[&Article],
    today: NaiveDate,
    cfg: &CollectorConfig,
    keywords: &KeywordPrefilter,
) -> OverallScore {
    let tz = cfg.timezone();
    let indicators: BTreeMap<Indicator, IndicatorResult> = Indicator::ALL
        .iter()
        .map(|ind| {
            let r = score_indicator(
                *ind,
                articles.iter().copied(),
                today,
                &tz,
                &cfg.scoring,
                keywords,
            );
            (*ind, r)
        })
        .collect();
    let scores = indicators.iter().map(|(k, r)| (*k, r.score)).collect();
    let composite = composite_score(&scores, cfg);
    OverallScore {
        composite,
        bucket: RiskBucket::from_score(composite),
        indicators,
    }
}
