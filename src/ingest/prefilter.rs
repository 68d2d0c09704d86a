// src/ingest/prefilter.rs
//! Per-indicator keyword gate.
//!
//! The same pattern set serves two purposes: an article must hit at least one
//! pattern (title or summary) before it is sent to the classifier, and title
//! hits among recent eligible articles feed the scorer's corroboration bonus.
//! Missing vocabulary silently suppresses signal; the patterns are policy.

use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

use crate::config::CollectorConfig;
use crate::indicator::Indicator;

#[derive(Debug, Clone)]
pub struct KeywordPrefilter {
    sets: BTreeMap<Indicator, Vec<Regex>>,
}

impl KeywordPrefilter {
    pub fn from_config(cfg: &CollectorConfig) -> Result<Self> {
        let mut sets = BTreeMap::new();
        for ic in &cfg.indicators {
            let compiled = ic
                .keywords
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .with_context(|| format!("compiling keyword {p:?} for {}", ic.indicator))
                })
                .collect::<Result<Vec<_>>>()?;
            sets.insert(ic.indicator, compiled);
        }
        if sets.is_empty() {
            return Err(anyhow!("no keyword sets configured"));
        }
        Ok(Self { sets })
    }

    fn hit(&self, indicator: Indicator, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.sets
            .get(&indicator)
            .is_some_and(|pats| pats.iter().any(|re| re.is_match(text)))
    }

    /// Gate check: title or summary matches any pattern of the indicator.
    pub fn admits(&self, indicator: Indicator, title: &str, summary: &str) -> bool {
        self.hit(indicator, title) || self.hit(indicator, summary)
    }

    /// Strong-keyword hit in the title only (scorer corroboration).
    pub fn title_hit(&self, indicator: Indicator, title: &str) -> bool {
        self.hit(indicator, title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pf() -> KeywordPrefilter {
        KeywordPrefilter::from_config(&CollectorConfig::default()).unwrap()
    }

    #[test]
    fn case_insensitive_and_word_bounded() {
        let p = pf();
        assert!(p.admits(Indicator::DcVacancy, "Data center VACANCY rises", ""));
        // "vacancyless" is not the word "vacancy"
        assert!(!p.admits(Indicator::DcVacancy, "vacancyless market", ""));
    }

    #[test]
    fn summary_counts_for_gate_but_not_title_hit() {
        let p = pf();
        let title = "Hyperscalers report results";
        let summary = "Analysts flag a capex surge";
        assert!(p.admits(Indicator::CapexUpRevenueDown, title, summary));
        assert!(!p.title_hit(Indicator::CapexUpRevenueDown, title));
    }

    #[test]
    fn patterns_are_per_indicator() {
        let p = pf();
        assert!(p.admits(Indicator::MarketPositioning, "AI bubble fears", ""));
        assert!(!p.admits(Indicator::PowerPermitDelays, "AI bubble fears", ""));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let mut cfg = CollectorConfig::default();
        cfg.indicators[0].keywords.push("(unclosed".into());
        let err = KeywordPrefilter::from_config(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("unclosed"));
    }
}
