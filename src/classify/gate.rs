//! Classification gate: per-run call budget → keyword prefilter → classifier
//! call with linear-backoff retry → throttle. Produces an explicit status for
//! every article it sees; it never fails the run.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use metrics::counter;
use tracing::{info, warn};

use super::{Classifier, ClassifyError, ClassifyRequest};
use crate::article::{Article, Classification, ClassificationStatus};
use crate::config::{CollectorConfig, RetryConfig};
use crate::indicator::Indicator;
use crate::ingest::normalize::truncate_chars;
use crate::ingest::prefilter::KeywordPrefilter;

/// Hard ceiling on classification calls for one run.
#[derive(Debug, Clone)]
pub struct CallBudget {
    max_per_run: u32,
    max_per_indicator: Option<u32>,
    used: u32,
    per_indicator: BTreeMap<Indicator, u32>,
}

impl CallBudget {
    pub fn new(max_per_run: u32, max_per_indicator: Option<u32>) -> Self {
        Self {
            max_per_run,
            max_per_indicator,
            used: 0,
            per_indicator: BTreeMap::new(),
        }
    }

    pub fn from_config(cfg: &CollectorConfig) -> Self {
        Self::new(
            cfg.limits.max_calls_per_run,
            cfg.limits.max_calls_per_indicator,
        )
    }

    pub fn allows(&self, indicator: Indicator) -> bool {
        if self.used >= self.max_per_run {
            return false;
        }
        match self.max_per_indicator {
            Some(cap) => self.per_indicator.get(&indicator).copied().unwrap_or(0) < cap,
            None => true,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.max_per_run
    }

    fn record(&mut self, indicator: Indicator) {
        self.used += 1;
        *self.per_indicator.entry(indicator).or_insert(0) += 1;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn per_indicator(&self) -> &BTreeMap<Indicator, u32> {
        &self.per_indicator
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Articles sent to the classifier (one per article, retries included).
    pub calls: u32,
    pub errors: u32,
    pub prefilter_skips: u32,
    pub budget_skips: u32,
}

pub struct ClassifierGate<'a> {
    classifier: &'a dyn Classifier,
    prefilter: &'a KeywordPrefilter,
    retry: RetryConfig,
    summary_chars: usize,
    budget: CallBudget,
    stats: GateStats,
}

impl<'a> ClassifierGate<'a> {
    pub fn new(
        cfg: &CollectorConfig,
        classifier: &'a dyn Classifier,
        prefilter: &'a KeywordPrefilter,
    ) -> Self {
        Self {
            classifier,
            prefilter,
            retry: cfg.retry.clone(),
            summary_chars: cfg.limits.summary_chars,
            budget: CallBudget::from_config(cfg),
            stats: GateStats::default(),
        }
    }

    pub fn stats(&self) -> GateStats {
        self.stats
    }

    pub fn budget(&self) -> &CallBudget {
        &self.budget
    }

    pub fn budget_exhausted(&self) -> bool {
        self.budget.exhausted()
    }

    /// Decide the status of one article. Budget is checked before the
    /// prefilter, so once the ceiling is hit every further article is
    /// `SkippedBudget`.
    pub async fn evaluate(
        &mut self,
        article: &Article,
        now: DateTime<FixedOffset>,
    ) -> ClassificationStatus {
        let indicator = article.indicator;
        if !self.budget.allows(indicator) {
            self.stats.budget_skips += 1;
            counter!("collector_budget_skips_total").increment(1);
            return ClassificationStatus::SkippedBudget;
        }
        if !self
            .prefilter
            .admits(indicator, &article.title, &article.summary)
        {
            self.stats.prefilter_skips += 1;
            counter!("collector_prefilter_skips_total").increment(1);
            return ClassificationStatus::SkippedPrefilter;
        }

        self.budget.record(indicator);
        self.stats.calls += 1;
        counter!("collector_classify_calls_total").increment(1);
        info!(
            target: "classify",
            call = self.budget.used(),
            indicator = %indicator,
            id = %article.id,
            "classifying"
        );

        let summary = truncate_chars(&article.summary, self.summary_chars);
        let req = ClassifyRequest {
            indicator,
            title: &article.title,
            summary: &summary,
        };
        let result = self.call_with_retry(&req).await;
        tokio::time::sleep(self.retry.throttle()).await;

        match result {
            Ok(outcome) => ClassificationStatus::Classified {
                outcome,
                classifier: self.classifier.identity().to_string(),
                classified_at: now,
            },
            Err(e) => {
                self.stats.errors += 1;
                counter!("collector_classify_errors_total").increment(1);
                warn!(target: "classify", error = %e, id = %article.id, "classification failed");
                ClassificationStatus::Error {
                    detail: e.to_string(),
                    failed_at: now,
                }
            }
        }
    }

    async fn call_with_retry(
        &self,
        req: &ClassifyRequest<'_>,
    ) -> Result<Classification, ClassifyError> {
        let mut attempt = 1u32;
        loop {
            match self.classifier.classify(req).await {
                Ok(c) => return Ok(c),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        target: "classify",
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "transient classifier failure; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
