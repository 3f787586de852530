//! Sector-relative valuation and growth scoring.

use analysis_core::{AnalysisError, FinancialMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_SECTOR_PE: f64 = 20.0;

const BUILTIN_SECTOR_PE: &[(&str, f64)] = &[
    ("Technology", 28.5),
    ("Consumer Cyclical", 22.0),
    ("Communication Services", 18.5),
    ("Healthcare", 24.0),
    ("Financial Services", 14.5),
    ("Consumer Defensive", 20.0),
    ("Industrials", 22.5),
    ("Energy", 12.0),
    ("Utilities", 18.0),
    ("Real Estate", 35.0),
    ("Basic Materials", 15.0),
];

/// Below this fraction of the sector average a PE counts as undervalued
const UNDERVALUED_RATIO: f64 = 0.8;
const OVERVALUED_RATIO: f64 = 1.2;

fn builtin_sector_pe() -> BTreeMap<String, f64> {
    BUILTIN_SECTOR_PE
        .iter()
        .map(|(sector, pe)| (sector.to_string(), *pe))
        .collect()
}

fn default_pe() -> f64 {
    DEFAULT_SECTOR_PE
}

/// Average PE per sector, with a default for unknown sectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPeTable {
    #[serde(default = "builtin_sector_pe")]
    pub sector_pe: BTreeMap<String, f64>,
    #[serde(default = "default_pe")]
    pub default_pe: f64,
}

impl Default for SectorPeTable {
    fn default() -> Self {
        Self {
            sector_pe: builtin_sector_pe(),
            default_pe: DEFAULT_SECTOR_PE,
        }
    }
}

impl SectorPeTable {
    /// Case-insensitive lookup; unknown or missing sectors get the default
    pub fn average_pe(&self, sector: Option<&str>) -> f64 {
        sector
            .map(str::trim)
            .and_then(|wanted| {
                self.sector_pe
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                    .map(|(_, pe)| *pe)
            })
            .unwrap_or(self.default_pe)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.default_pe.is_finite() && self.default_pe > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "default_pe must be positive, got {}",
                self.default_pe
            )));
        }
        for (sector, pe) in &self.sector_pe {
            if !(pe.is_finite() && *pe > 0.0) {
                return Err(AnalysisError::InvalidInput(format!(
                    "sector PE for {} must be positive, got {}",
                    sector, pe
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeStatus {
    Undervalued,
    Fair,
    Overvalued,
}

impl PeStatus {
    /// +1 undervalued, -1 overvalued
    pub fn direction(&self) -> i32 {
        match self {
            PeStatus::Undervalued => 1,
            PeStatus::Fair => 0,
            PeStatus::Overvalued => -1,
        }
    }
}

impl fmt::Display for PeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeStatus::Undervalued => "Undervalued",
            PeStatus::Fair => "Fair",
            PeStatus::Overvalued => "Overvalued",
        };
        f.write_str(s)
    }
}

/// PE compared against its sector average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeValuation {
    pub pe: f64,
    pub sector_avg_pe: f64,
    /// Signed distance from the sector average, in percent
    pub pe_vs_sector_pct: f64,
    pub status: PeStatus,
}

impl PeValuation {
    pub fn assess(pe: f64, sector_avg_pe: f64) -> Self {
        let status = if pe < sector_avg_pe * UNDERVALUED_RATIO {
            PeStatus::Undervalued
        } else if pe > sector_avg_pe * OVERVALUED_RATIO {
            PeStatus::Overvalued
        } else {
            PeStatus::Fair
        };
        Self {
            pe,
            sector_avg_pe,
            pe_vs_sector_pct: (pe - sector_avg_pe) / sector_avg_pe * 100.0,
            status,
        }
    }
}

/// Linear ramp from 100 at `best` to 0 at `worst`, clipped
fn ramp(value: f64, best: f64, worst: f64) -> f64 {
    ((worst - value) / (worst - best) * 100.0).clamp(0.0, 100.0)
}

/// 100 at half the sector PE or cheaper, 0 at twice the sector PE; losses score 0
pub fn valuation_score(pe: f64, sector_avg_pe: f64) -> f64 {
    if pe <= 0.0 || sector_avg_pe <= 0.0 {
        return 0.0;
    }
    ramp(pe / sector_avg_pe, 0.5, 2.0)
}

/// 100 at PEG 0.5 or below, 0 at 2.5 or above; negative PEG scores 0
pub fn peg_score(peg: f64) -> f64 {
    if peg < 0.0 {
        return 0.0;
    }
    ramp(peg, 0.5, 2.5)
}

/// 0 at -10% growth, 100 at +30%
pub fn revenue_growth_score(growth: f64) -> f64 {
    ((growth + 0.10) / 0.40 * 100.0).clamp(0.0, 100.0)
}

/// Mean of whichever growth inputs are present
pub fn growth_score(metrics: &FinancialMetrics) -> Option<f64> {
    let parts: Vec<f64> = [
        metrics.peg_ratio.map(peg_score),
        metrics.revenue_growth.map(revenue_growth_score),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.iter().sum::<f64>() / parts.len() as f64)
    }
}

pub struct FundamentalAnalysisEngine {
    table: SectorPeTable,
}

impl Default for FundamentalAnalysisEngine {
    fn default() -> Self {
        Self::new(SectorPeTable::default())
    }
}

impl FundamentalAnalysisEngine {
    pub fn new(table: SectorPeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SectorPeTable {
        &self.table
    }

    pub fn sector_average(&self, metrics: &FinancialMetrics) -> f64 {
        self.table.average_pe(metrics.sector.as_deref())
    }

    pub fn pe_valuation(&self, metrics: &FinancialMetrics) -> Option<PeValuation> {
        let pe = metrics.pe_ratio?;
        Some(PeValuation::assess(pe, self.sector_average(metrics)))
    }

    pub fn valuation_score(&self, metrics: &FinancialMetrics) -> Option<f64> {
        let pe = metrics.pe_ratio?;
        Some(valuation_score(pe, self.sector_average(metrics)))
    }
}
