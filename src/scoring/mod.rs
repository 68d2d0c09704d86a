//! Indicator scoring: decayed + fresh-weighted strength sums, keyword
//! corroboration, quantization to 0..=4, and evidence selection.
//!
//! ```text
//! decay_weight(age) = 0.85^age        age in [0,14], else 0
//! fresh_weight(age) = 1.0, 0.8, 0.5   age 0, 1, 2; else 0
//! raw = fresh_blend * Σ recent3 strength*fresh
//!     + decay_blend * Σ recent14 strength*decay
//!     + corroboration_bonus   (>= corroboration_min_hits title keyword hits)
//! ```

pub mod aggregate;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::config::ScoringPolicy;
use crate::indicator::Indicator;
use crate::ingest::prefilter::KeywordPrefilter;

pub use aggregate::{composite_score, score_overall, OverallScore, RiskBucket};

pub const WINDOW_DAYS: i64 = 14;
pub const FRESH_DAYS: i64 = 2;
pub const DECAY_BASE: f64 = 0.85;
const FRESH_WEIGHTS: [f64; 3] = [1.0, 0.8, 0.5];
/// Lower bounds of scores 1..=4; half-open intervals.
const THRESHOLDS: [f64; 4] = [0.6, 1.5, 2.5, 3.5];
pub const MAX_SCORE: u8 = 4;

pub fn decay_weight(age_days: i64) -> f64 {
    if age_days > WINDOW_DAYS {
        return 0.0;
    }
    DECAY_BASE.powi(age_days.max(0) as i32)
}

pub fn fresh_weight(age_days: i64) -> f64 {
    FRESH_WEIGHTS
        .get(age_days.max(0) as usize)
        .copied()
        .unwrap_or(0.0)
}

/// Map a raw score onto 0..=4.
pub fn quantize(raw: f64) -> u8 {
    THRESHOLDS.iter().take_while(|t| raw >= **t).count() as u8
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Display-safe projection of one contributing article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub link: String,
    pub published: String,
    pub publish_date: NaiveDate,
    pub strength: u8,
    pub confidence: u8,
    pub reason: String,
    pub signals: Vec<String>,
    pub classifier: String,
}

/// Per-indicator metadata written to the snapshot log (no evidence).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSummary {
    pub recent3_count: usize,
    pub recent14_count: usize,
    pub fresh_sum: f64,
    pub decay_sum: f64,
    pub raw_score: f64,
    pub strong_hits14: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub score: u8,
    #[serde(flatten)]
    pub summary: IndicatorSummary,
    pub evidence: Vec<Evidence>,
}

struct Eligible<'a> {
    article: &'a Article,
    age: i64,
    date: NaiveDate,
    strength: u8,
    confidence: u8,
    reason: &'a str,
    signals: &'a [String],
    classifier: &'a str,
}

/// Score one indicator from the full article set.
pub fn score_indicator<'a>(
    indicator: Indicator,
    articles: impl IntoIterator<Item = &'a Article>,
    today: NaiveDate,
    tz: &FixedOffset,
    policy: &ScoringPolicy,
    keywords: &KeywordPrefilter,
) -> IndicatorResult {
    let mut recent14: Vec<Eligible<'a>> = articles
        .into_iter()
        .filter(|a| a.indicator == indicator)
        .filter_map(|a| {
            let (outcome, classifier) = a.eligible_outcome(policy.min_confidence)?;
            let date = a.publish_date(tz);
            let age = (today - date).num_days();
            (0..=WINDOW_DAYS).contains(&age).then_some(Eligible {
                article: a,
                age,
                date,
                strength: outcome.strength,
                confidence: outcome.confidence,
                reason: &outcome.reason,
                signals: &outcome.signals,
                classifier,
            })
        })
        .collect();

    let mut decay_sum = 0.0;
    let mut fresh_sum = 0.0;
    let mut recent3 = 0usize;
    for e in &recent14 {
        let s = f64::from(e.strength);
        decay_sum += s * decay_weight(e.age);
        if e.age <= FRESH_DAYS {
            recent3 += 1;
            fresh_sum += s * fresh_weight(e.age);
        }
    }

    let strong_hits = recent14
        .iter()
        .filter(|e| keywords.title_hit(indicator, &e.article.title))
        .count();

    let mut raw = policy.fresh_blend * fresh_sum + policy.decay_blend * decay_sum;
    if strong_hits >= policy.corroboration_min_hits {
        raw += policy.corroboration_bonus;
    }
    let score = quantize(raw);

    recent14.sort_by(|a, b| {
        b.strength
            .cmp(&a.strength)
            .then(b.confidence.cmp(&a.confidence))
            .then(b.date.cmp(&a.date))
    });
    let evidence = recent14
        .iter()
        .take(policy.top_evidence)
        .map(|e| Evidence {
            title: e.article.title.clone(),
            link: e.article.link.clone(),
            published: e.article.published.clone(),
            publish_date: e.date,
            strength: e.strength,
            confidence: e.confidence,
            reason: e.reason.to_string(),
            signals: e.signals.to_vec(),
            classifier: e.classifier.to_string(),
        })
        .collect();

    IndicatorResult {
        score,
        summary: IndicatorSummary {
            recent3_count: recent3,
            recent14_count: recent14.len(),
            fresh_sum: round2(fresh_sum),
            decay_sum: round2(decay_sum),
            raw_score: round2(raw),
            strong_hits14: strong_hits,
        },
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Classification, ClassificationStatus};
    use crate::config::CollectorConfig;
    use crate::ingest::types::FeedEntry;
    use chrono::{Duration, TimeZone};

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    fn classified(
        indicator: Indicator,
        title: &str,
        age: i64,
        strength: u8,
        confidence: u8,
    ) -> Article {
        let at = kst()
            .with_ymd_and_hms(2025, 3, 20, 9, 0, 0)
            .unwrap()
            - Duration::days(age);
        let entry = FeedEntry {
            title: title.into(),
            link: format!("https://x.com/{}-{age}", title.replace(' ', "-")),
            published: at.to_rfc2822(),
            summary: String::new(),
        };
        let mut a = Article::from_entry(indicator, &entry, at, at);
        a.classification = ClassificationStatus::Classified {
            outcome: Classification {
                relevant: true,
                strength,
                confidence,
                reason: format!("r{age}"),
                signals: vec![],
            },
            classifier: "test-model".into(),
            classified_at: at,
        };
        a
    }

    fn kw() -> KeywordPrefilter {
        KeywordPrefilter::from_config(&CollectorConfig::default()).unwrap()
    }

    #[test]
    fn decay_weights() {
        assert_eq!(decay_weight(0), 1.0);
        assert!((decay_weight(14) - 0.85f64.powi(14)).abs() < 1e-12);
        assert!((decay_weight(14) - 0.1028).abs() < 1e-4);
        assert_eq!(decay_weight(15), 0.0);
    }

    #[test]
    fn fresh_weight_sequence() {
        let w: Vec<f64> = (0..4).map(fresh_weight).collect();
        assert_eq!(w, vec![1.0, 0.8, 0.5, 0.0]);
        assert_eq!(fresh_weight(30), 0.0);
    }

    #[test]
    fn quantization_boundaries() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.59), 0);
        assert_eq!(quantize(0.6), 1);
        assert_eq!(quantize(1.49), 1);
        assert_eq!(quantize(1.5), 2);
        assert_eq!(quantize(2.49), 2);
        assert_eq!(quantize(2.5), 3);
        assert_eq!(quantize(3.49), 3);
        assert_eq!(quantize(3.5), 4);
        assert_eq!(quantize(100.0), 4);
    }

    #[test]
    fn three_fresh_strong_articles_score_four() {
        // Titles avoid dc_vacancy keywords: no corroboration bonus.
        let arts = vec![
            classified(Indicator::DcVacancy, "Leasing update one", 0, 4, 90),
            classified(Indicator::DcVacancy, "Leasing update two", 1, 4, 90),
            classified(Indicator::DcVacancy, "Leasing update three", 2, 4, 90),
        ];
        let r = score_indicator(
            Indicator::DcVacancy,
            &arts,
            today(),
            &kst(),
            &ScoringPolicy::default(),
            &kw(),
        );
        assert_eq!(r.summary.fresh_sum, 9.2);
        assert_eq!(r.summary.decay_sum, 10.29);
        assert_eq!(r.summary.raw_score, 9.64);
        assert_eq!(r.summary.strong_hits14, 0);
        assert_eq!(r.summary.recent3_count, 3);
        assert_eq!(r.summary.recent14_count, 3);
        assert_eq!(r.score, 4);
    }

    #[test]
    fn corroboration_bonus_needs_three_title_hits() {
        // Single weak old article: raw = 0.4 * 1 * 0.85^10 ≈ 0.079
        let mut arts = vec![classified(Indicator::DcVacancy, "Vacancy one", 10, 1, 90)];
        arts.push(classified(Indicator::DcVacancy, "Vacancy two", 12, 0, 90));
        let policy = ScoringPolicy::default();
        let r = score_indicator(Indicator::DcVacancy, &arts, today(), &kst(), &policy, &kw());
        assert_eq!(r.summary.strong_hits14, 2);
        assert_eq!(r.score, 0);

        arts.push(classified(Indicator::DcVacancy, "Oversupply three", 13, 0, 90));
        let r = score_indicator(Indicator::DcVacancy, &arts, today(), &kst(), &policy, &kw());
        assert_eq!(r.summary.strong_hits14, 3);
        // 0.079 + 0.5 is still under 0.6
        assert_eq!(r.score, 0);
        arts[0] = classified(Indicator::DcVacancy, "Vacancy one", 2, 1, 90);
        let r = score_indicator(Indicator::DcVacancy, &arts, today(), &kst(), &policy, &kw());
        // 0.6*0.5 + 0.4*0.7225 + 0.5 = 1.089
        assert_eq!(r.score, 1);
    }

    #[test]
    fn ineligible_and_out_of_window_articles_are_ignored() {
        let low_conf = classified(Indicator::DcVacancy, "Low conf", 0, 4, 59);
        let future = classified(Indicator::DcVacancy, "Future", -1, 4, 90);
        let old = classified(Indicator::DcVacancy, "Old", 15, 4, 90);
        let other = classified(Indicator::AiPriceCuts, "Other", 0, 4, 90);
        let mut skipped = classified(Indicator::DcVacancy, "Skipped", 0, 4, 90);
        skipped.classification = ClassificationStatus::SkippedBudget;
        let arts = vec![low_conf, future, old, other, skipped];
        let r = score_indicator(
            Indicator::DcVacancy,
            &arts,
            today(),
            &kst(),
            &ScoringPolicy::default(),
            &kw(),
        );
        assert_eq!(r.summary.recent14_count, 0);
        assert_eq!(r.score, 0);
        assert!(r.evidence.is_empty());
    }

    #[test]
    fn evidence_is_sorted_and_capped() {
        let mut arts = Vec::new();
        for age in 0..10 {
            arts.push(classified(
                Indicator::AiPriceCuts,
                &format!("Item {age}"),
                age,
                (age % 5) as u8,
                60 + age as u8,
            ));
        }
        let r = score_indicator(
            Indicator::AiPriceCuts,
            &arts,
            today(),
            &kst(),
            &ScoringPolicy::default(),
            &kw(),
        );
        assert_eq!(r.evidence.len(), 8);
        let keys: Vec<(u8, u8)> = r.evidence.iter().map(|e| (e.strength, e.confidence)).collect();
        let mut sorted = keys.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(keys, sorted);
        assert_eq!(r.evidence[0].strength, 4);
        assert_eq!(r.evidence[0].confidence, 69);
        assert_eq!(r.evidence[0].classifier, "test-model");
    }

    #[test]
    fn evidence_ties_break_on_newer_date() {
        let arts = vec![
            classified(Indicator::AiPriceCuts, "Older", 5, 3, 80),
            classified(Indicator::AiPriceCuts, "Newer", 1, 3, 80),
        ];
        let r = score_indicator(
            Indicator::AiPriceCuts,
            &arts,
            today(),
            &kst(),
            &ScoringPolicy::default(),
            &kw(),
        );
        assert_eq!(r.evidence[0].title, "Newer");
    }
}
