//! # Indicators
//! The six fixed risk categories tracked by the collector.
//!
//! Keys are stable snake_case strings; they appear as map keys in every
//! persisted document and inside article fingerprints, so renaming a variant
//! changes article identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    AiPriceCuts,
    MgmtToneSoftening,
    CapexUpRevenueDown,
    DcVacancy,
    PowerPermitDelays,
    MarketPositioning,
}

impl Indicator {
    pub const ALL: [Indicator; 6] = [
        Indicator::AiPriceCuts,
        Indicator::MgmtToneSoftening,
        Indicator::CapexUpRevenueDown,
        Indicator::DcVacancy,
        Indicator::PowerPermitDelays,
        Indicator::MarketPositioning,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Indicator::AiPriceCuts => "ai_price_cuts",
            Indicator::MgmtToneSoftening => "mgmt_tone_softening",
            Indicator::CapexUpRevenueDown => "capex_up_revenue_down",
            Indicator::DcVacancy => "dc_vacancy",
            Indicator::PowerPermitDelays => "power_permit_delays",
            Indicator::MarketPositioning => "market_positioning",
        }
    }

    /// Human-readable label for logs and downstream readers.
    pub fn label(self) -> &'static str {
        match self {
            Indicator::AiPriceCuts => "AI price cuts",
            Indicator::MgmtToneSoftening => "Management tone softening",
            Indicator::CapexUpRevenueDown => "CapEx up / revenue slowing",
            Indicator::DcVacancy => "Data center vacancy / oversupply",
            Indicator::PowerPermitDelays => "Power / permitting delays",
            Indicator::MarketPositioning => "Market positioning overheating",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Indicator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Indicator::ALL
            .into_iter()
            .find(|i| i.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown indicator: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_from_str() {
        for ind in Indicator::ALL {
            assert_eq!(ind.key().parse::<Indicator>().unwrap(), ind);
        }
        assert!("bogus".parse::<Indicator>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_keys() {
        let s = serde_json::to_string(&Indicator::DcVacancy).unwrap();
        assert_eq!(s, "\"dc_vacancy\"");
    }
}
