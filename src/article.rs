//! # Article
//! Stored news item plus the explicit outcome of classification gating.
//!
//! Identity (`id`) is a fingerprint of indicator, normalized title and
//! normalized link; uniqueness in the store is by [`Article::dedup_key`].

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::indicator::Indicator;
use crate::ingest::normalize::{dedup_key, fingerprint, normalize_title, normalize_url};
use crate::ingest::types::FeedEntry;

/// Structured relevance judgment returned by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub relevant: bool,
    /// 0..=4
    pub strength: u8,
    /// 0..=100
    pub confidence: u8,
    pub reason: String,
    pub signals: Vec<String>,
}

/// Per-article gating outcome carried on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationStatus {
    Classified {
        outcome: Classification,
        classifier: String,
        classified_at: DateTime<FixedOffset>,
    },
    /// Budget was exhausted; the article stays eligible for a later run.
    SkippedBudget,
    SkippedPrefilter,
    Error {
        detail: String,
        failed_at: DateTime<FixedOffset>,
    },
}

impl ClassificationStatus {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationStatus::Classified { .. } => "classified",
            ClassificationStatus::SkippedBudget => "skipped_budget",
            ClassificationStatus::SkippedPrefilter => "skipped_prefilter",
            ClassificationStatus::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub indicator: Indicator,
    pub title: String,
    pub title_norm: String,
    pub link: String,
    pub link_norm: String,
    /// Raw published string as delivered by the feed.
    pub published: String,
    /// Resolved publish time; fetch time when the feed value was unparsable.
    pub published_at: DateTime<FixedOffset>,
    pub summary: String,
    pub fetched_at: DateTime<FixedOffset>,
    pub classification: ClassificationStatus,
}

impl Article {
    /// Build a new record from a feed entry. Status starts as `SkippedBudget`
    /// until the gate decides otherwise.
    pub fn from_entry(
        indicator: Indicator,
        entry: &FeedEntry,
        published_at: DateTime<FixedOffset>,
        fetched_at: DateTime<FixedOffset>,
    ) -> Self {
        let title_norm = normalize_title(&entry.title);
        let link_norm = normalize_url(&entry.link);
        Self {
            id: fingerprint(indicator, &title_norm, &link_norm),
            indicator,
            title: entry.title.trim().to_string(),
            title_norm,
            link: entry.link.trim().to_string(),
            link_norm,
            published: entry.published.clone(),
            published_at,
            summary: entry.summary.clone(),
            fetched_at,
            classification: ClassificationStatus::SkippedBudget,
        }
    }

    pub fn dedup_key(&self) -> String {
        dedup_key(&self.title_norm, &self.link_norm)
    }

    /// Calendar publish date in `tz`.
    pub fn publish_date(&self, tz: &FixedOffset) -> NaiveDate {
        self.published_at.with_timezone(tz).date_naive()
    }

    /// Whole days between publish date and `today`; negative for future dates.
    pub fn age_days(&self, today: NaiveDate, tz: &FixedOffset) -> i64 {
        (today - self.publish_date(tz)).num_days()
    }

    /// The outcome when the article counts toward scoring.
    pub fn eligible_outcome(&self, min_confidence: u8) -> Option<(&Classification, &str)> {
        match &self.classification {
            ClassificationStatus::Classified {
                outcome, classifier, ..
            } if outcome.relevant && outcome.confidence >= min_confidence => {
                Some((outcome, classifier.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn entry(title: &str, link: &str) -> FeedEntry {
        FeedEntry {
            title: title.into(),
            link: link.into(),
            published: String::new(),
            summary: String::new(),
        }
    }

    #[test]
    fn status_serializes_as_tagged_record() {
        let s = serde_json::to_value(ClassificationStatus::SkippedPrefilter).unwrap();
        assert_eq!(s, serde_json::json!({"status": "skipped_prefilter"}));
    }

    #[test]
    fn publish_date_uses_configured_offset() {
        // 2025-03-01 20:00 UTC is already 2025-03-02 in +09:00.
        let utc = FixedOffset::east_opt(0).unwrap();
        let at = utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        let a = Article::from_entry(Indicator::DcVacancy, &entry("t", ""), at, at);
        let d = a.publish_date(&kst());
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(a.age_days(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(), &kst()), 2);
    }

    #[test]
    fn eligibility_requires_relevance_and_confidence() {
        let at = kst().with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut a = Article::from_entry(Indicator::DcVacancy, &entry("t", "https://a.b/c"), at, at);
        assert!(a.eligible_outcome(60).is_none());

        let outcome = Classification {
            relevant: true,
            strength: 3,
            confidence: 59,
            reason: "r".into(),
            signals: vec![],
        };
        a.classification = ClassificationStatus::Classified {
            outcome: outcome.clone(),
            classifier: "m".into(),
            classified_at: at,
        };
        assert!(a.eligible_outcome(60).is_none());

        a.classification = ClassificationStatus::Classified {
            outcome: Classification {
                confidence: 60,
                ..outcome.clone()
            },
            classifier: "m".into(),
            classified_at: at,
        };
        assert!(a.eligible_outcome(60).is_some());

        a.classification = ClassificationStatus::Classified {
            outcome: Classification {
                relevant: false,
                confidence: 95,
                ..outcome
            },
            classifier: "m".into(),
            classified_at: at,
        };
        assert!(a.eligible_outcome(60).is_none());
    }
}
