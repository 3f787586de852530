//! Opportunity scoring: valuation, growth and technical sub-scores blended into 0..=100.

use analysis_core::{AnalysisError, FinancialMetrics, Provenance, Ticker};
use fundamental_analysis::{growth_score, FundamentalAnalysisEngine};
use sentiment_analysis::{SentimentLevel, SentimentSummary};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use technical_analysis::{CompositeScore, TechnicalReport, TrendReading};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpportunityWeights {
    pub valuation: f64,
    pub growth: f64,
    pub technical: f64,
}

impl Default for OpportunityWeights {
    fn default() -> Self {
        Self {
            valuation: 0.4,
            growth: 0.3,
            technical: 0.3,
        }
    }
}

impl OpportunityWeights {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let all = [self.valuation, self.growth, self.technical];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "opportunity weights must be non-negative, got {:?}",
                all
            )));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(AnalysisError::InvalidInput(
                "opportunity weights must not sum to zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Weights rescaled to sum to 1
    pub fn normalized(&self) -> Self {
        let total = self.valuation + self.growth + self.technical;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            valuation: self.valuation / total,
            growth: self.growth / total,
            technical: self.technical / total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub valuation: f64,
    pub growth: f64,
    pub technical: f64,
}

/// Technical state carried into a ranked record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub composite: CompositeScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendReading>,
}

/// Headline sentiment for a scan candidate; reported alongside the score, not weighted into it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub level: SentimentLevel,
    pub average_polarity: f64,
    pub news_count: usize,
}

impl SentimentSnapshot {
    pub fn neutral() -> Self {
        Self {
            level: SentimentLevel::Neutral,
            average_polarity: 0.0,
            news_count: 0,
        }
    }
}

impl From<&SentimentSummary> for SentimentSnapshot {
    fn from(summary: &SentimentSummary) -> Self {
        Self {
            level: summary.level,
            average_polarity: summary.average_polarity,
            news_count: summary.news_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub ticker: Ticker,
    pub price: f64,
    pub sector: Option<String>,
    pub fundamentals: FinancialMetrics,
    pub technical: TechnicalSnapshot,
    pub sentiment: SentimentSnapshot,
    pub opportunity_score: f64,
    pub sub_scores: SubScores,
    pub provenance: Provenance,
}

/// Inputs gathered for one scan candidate
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ticker: Ticker,
    pub price: Option<f64>,
    pub metrics: FinancialMetrics,
    pub technical: TechnicalReport,
    pub sentiment: SentimentSnapshot,
    pub provenance: Provenance,
}

/// Why a candidate could not be ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    MissingPrice,
    MissingPe,
    MissingGrowth,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Exclusion::MissingPrice => "no current price",
            Exclusion::MissingPe => "no PE ratio",
            Exclusion::MissingGrowth => "neither PEG nor revenue growth",
        };
        f.write_str(s)
    }
}

/// `50 + pct_above_sma20 * 5`, clipped; neutral without a trend reading
pub fn trend_score(trend: Option<&TrendReading>) -> f64 {
    trend
        .map(|t| (50.0 + t.pct_above_sma20 * 5.0).clamp(0.0, 100.0))
        .unwrap_or(50.0)
}

pub fn technical_score(technical: &TechnicalReport) -> f64 {
    (trend_score(technical.trend.as_ref()) + technical.composite.normalized()) / 2.0
}

pub struct OpportunityScorer {
    fundamentals: FundamentalAnalysisEngine,
    weights: OpportunityWeights,
}

impl Default for OpportunityScorer {
    fn default() -> Self {
        Self::new(FundamentalAnalysisEngine::default(), OpportunityWeights::default())
    }
}

impl OpportunityScorer {
    pub fn new(fundamentals: FundamentalAnalysisEngine, weights: OpportunityWeights) -> Self {
        Self {
            fundamentals,
            weights: weights.normalized(),
        }
    }

    pub fn fundamentals(&self) -> &FundamentalAnalysisEngine {
        &self.fundamentals
    }

    pub fn weights(&self) -> OpportunityWeights {
        self.weights
    }

    pub fn score(&self, candidate: &Candidate) -> Result<OpportunityRecord, Exclusion> {
        let price = candidate.price.ok_or(Exclusion::MissingPrice)?;
        let valuation = self
            .fundamentals
            .valuation_score(&candidate.metrics)
            .ok_or(Exclusion::MissingPe)?;
        let growth = growth_score(&candidate.metrics).ok_or(Exclusion::MissingGrowth)?;
        let technical = technical_score(&candidate.technical);

        let w = self.weights;
        let opportunity_score =
            (w.valuation * valuation + w.growth * growth + w.technical * technical).clamp(0.0, 100.0);

        Ok(OpportunityRecord {
            ticker: candidate.ticker.clone(),
            price,
            sector: candidate.metrics.sector.clone(),
            fundamentals: candidate.metrics.clone(),
            technical: TechnicalSnapshot {
                composite: candidate.technical.composite,
                trend: candidate.technical.trend,
            },
            sentiment: candidate.sentiment,
            opportunity_score,
            sub_scores: SubScores {
                valuation,
                growth,
                technical,
            },
            provenance: candidate.provenance,
        })
    }
}

/// Score descending, ticker ascending on ties, then truncated
pub fn rank(mut records: Vec<OpportunityRecord>, limit: usize) -> Vec<OpportunityRecord> {
    records.sort_by(|a, b| {
        b.opportunity_score
            .partial_cmp(&a.opportunity_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    records.truncate(limit);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use technical_analysis::TechnicalAnalysisEngine;

    fn technical(closes: &[f64]) -> TechnicalReport {
        TechnicalAnalysisEngine::new().analyze_closes(closes)
    }

    fn candidate(ticker: &str, pe: Option<f64>, peg: Option<f64>, closes: &[f64]) -> Candidate {
        Candidate {
            ticker: Ticker::parse(ticker).unwrap(),
            price: closes.last().copied(),
            metrics: FinancialMetrics {
                pe_ratio: pe,
                peg_ratio: peg,
                sector: Some("Technology".into()),
                ..Default::default()
            },
            technical: technical(closes),
            sentiment: SentimentSnapshot::neutral(),
            provenance: Provenance::Real,
        }
    }

    #[test]
    fn test_weights_normalize() {
        let w = OpportunityWeights {
            valuation: 2.0,
            growth: 1.0,
            technical: 1.0,
        }
        .normalized();
        assert!((w.valuation - 0.5).abs() < 1e-12);
        assert!((w.growth - 0.25).abs() < 1e-12);
        assert!(OpportunityWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_validation() {
        let zero = OpportunityWeights {
            valuation: 0.0,
            growth: 0.0,
            technical: 0.0,
        };
        assert!(zero.validate().is_err());
        let negative = OpportunityWeights {
            valuation: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_trend_score() {
        assert_eq!(trend_score(None), 50.0);
        let mut trend = TrendReading {
            sma20: 100.0,
            close: 104.0,
            pct_above_sma20: 4.0,
            above_sma20: true,
        };
        assert_eq!(trend_score(Some(&trend)), 70.0);
        trend.pct_above_sma20 = -20.0;
        assert_eq!(trend_score(Some(&trend)), 0.0);
    }

    #[test]
    fn test_score_flat_candidate() {
        // flat closes: trend 50, composite 0/4 -> 50
        let record = OpportunityScorer::default()
            .score(&candidate("AAA", Some(28.5), Some(1.5), &[100.0; 250]))
            .unwrap();

        // r = 1.0 -> 66.67; PEG 1.5 -> 50; technical 50
        assert!((record.sub_scores.valuation - 200.0 / 3.0).abs() < 1e-9);
        assert!((record.sub_scores.growth - 50.0).abs() < 1e-9);
        assert!((record.sub_scores.technical - 50.0).abs() < 1e-9);
        let expected = 0.4 * 200.0 / 3.0 + 0.3 * 50.0 + 0.3 * 50.0;
        assert!((record.opportunity_score - expected).abs() < 1e-9);
        assert_eq!(record.sector.as_deref(), Some("Technology"));
    }

    #[test]
    fn test_sentiment_is_reported_not_weighted() {
        let scorer = OpportunityScorer::default();
        let neutral = candidate("AAA", Some(20.0), Some(1.0), &[100.0; 250]);
        let mut gloomy = neutral.clone();
        gloomy.sentiment = SentimentSnapshot {
            level: SentimentLevel::VeryNegative,
            average_polarity: -0.8,
            news_count: 3,
        };

        let a = scorer.score(&neutral).unwrap();
        let b = scorer.score(&gloomy).unwrap();
        assert_eq!(a.opportunity_score, b.opportunity_score);
        assert_eq!(b.sentiment.level, SentimentLevel::VeryNegative);
        assert_eq!(b.sentiment.news_count, 3);
    }

    #[test]
    fn test_missing_inputs_exclude() {
        let scorer = OpportunityScorer::default();
        let closes = [100.0; 30];

        assert_eq!(scorer.score(&candidate("A", None, Some(1.0), &closes)), Err(Exclusion::MissingPe));
        assert_eq!(scorer.score(&candidate("A", Some(20.0), None, &closes)), Err(Exclusion::MissingGrowth));
        assert_eq!(scorer.score(&candidate("A", Some(20.0), Some(1.0), &[])), Err(Exclusion::MissingPrice));

        let mut with_growth = candidate("A", Some(20.0), None, &closes);
        with_growth.metrics.revenue_growth = Some(0.1);
        assert!(scorer.score(&with_growth).is_ok());
    }

    #[test]
    fn test_expensive_falling_stock_ranks_last() {
        let scorer = OpportunityScorer::default();
        let mut falling: Vec<f64> = vec![100.0; 40];
        falling.extend((0..10).map(|i| 95.0 - i as f64));

        let mut bad = candidate("BAD", Some(999.0), Some(5.0), &falling);
        bad.metrics.sector = Some("Unknown".into());
        let good = candidate("GOOD", Some(14.0), Some(0.4), &[100.0; 250]);
        let fair = candidate("FAIR", Some(28.5), Some(1.5), &[100.0; 250]);

        let records: Vec<_> = [bad, good, fair].iter().map(|c| scorer.score(c).unwrap()).collect();
        let ranked = rank(records, 10);

        let order: Vec<&str> = ranked.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["GOOD", "FAIR", "BAD"]);
        assert_eq!(ranked[2].sub_scores.valuation, 0.0);
        assert_eq!(ranked[2].sub_scores.growth, 0.0);
        assert!(ranked[2].sub_scores.technical < 50.0);
    }

    #[test]
    fn test_rank_ties_by_ticker_and_truncates() {
        let scorer = OpportunityScorer::default();
        let records: Vec<_> = ["MSFT", "AAPL", "NVDA"]
            .iter()
            .map(|t| scorer.score(&candidate(t, Some(20.0), Some(1.0), &[100.0; 30])).unwrap())
            .collect();

        let ranked = rank(records, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].ticker.as_str(), "AAPL");
        assert_eq!(ranked[1].ticker.as_str(), "MSFT");
    }
}
