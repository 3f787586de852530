//! Lexicon-based news sentiment with negation handling.

use analysis_core::{most_recent_news, NewsItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Items considered per batch, most recent first
pub const MAX_ITEMS: usize = 20;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const NEGATION_WINDOW: usize = 3;

const TITLE_WEIGHT: f64 = 2.0;
const DESCRIPTION_WEIGHT: f64 = 1.0;

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "rallies", "surge", "surges", "soar", "soars", "gain", "gains",
    "profit", "profitable", "growth", "beat", "beats", "upgrade", "upgraded", "outperform",
    "strong", "positive", "rise", "rises", "increase", "breakthrough", "success", "exceed",
    "exceeds", "momentum", "buy", "optimistic", "record", "high", "highs", "advance",
    "dividend", "buyback", "repurchase", "accretive", "upside", "recovery", "rebound",
    "expansion", "robust", "accelerating", "overweight", "raised", "outpacing", "tailwind",
    "jump", "jumps", "boost",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "declines", "loss", "losses", "fall", "falls", "plunge", "plunges",
    "crash", "miss", "misses", "downgrade", "downgraded", "underperform", "weak", "negative",
    "drop", "drops", "decrease", "concern", "concerns", "risk", "fail", "fails", "disappoint",
    "disappointing", "slump", "sell", "warning", "pessimistic", "low", "lows", "retreat",
    "fear", "fears", "trouble", "dilution", "dilutive", "headwind", "lawsuit", "litigation",
    "recall", "investigation", "probe", "default", "bankruptcy", "restructuring", "layoff",
    "layoffs", "downside", "overvalued", "bubble", "underweight", "lowered", "suspended",
    "tumble", "tumbles", "cut",
];

/// Five polarity bands covering [-1, 1] without overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SentimentLevel {
    #[serde(rename = "Very_Negative")]
    VeryNegative,
    #[serde(rename = "Negative")]
    Negative,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Positive")]
    Positive,
    #[serde(rename = "Very_Positive")]
    VeryPositive,
}

impl SentimentLevel {
    pub const ALL: [SentimentLevel; 5] = [
        SentimentLevel::VeryNegative,
        SentimentLevel::Negative,
        SentimentLevel::Neutral,
        SentimentLevel::Positive,
        SentimentLevel::VeryPositive,
    ];

    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > 0.5 {
            SentimentLevel::VeryPositive
        } else if polarity >= 0.2 {
            SentimentLevel::Positive
        } else if polarity > -0.2 {
            SentimentLevel::Neutral
        } else if polarity >= -0.5 {
            SentimentLevel::Negative
        } else {
            SentimentLevel::VeryNegative
        }
    }

    /// +1 for either positive band, -1 for either negative band
    pub fn direction(&self) -> i32 {
        match self {
            SentimentLevel::VeryPositive | SentimentLevel::Positive => 1,
            SentimentLevel::Neutral => 0,
            SentimentLevel::Negative | SentimentLevel::VeryNegative => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLevel::VeryNegative => "Very_Negative",
            SentimentLevel::Negative => "Negative",
            SentimentLevel::Neutral => "Neutral",
            SentimentLevel::Positive => "Positive",
            SentimentLevel::VeryPositive => "Very_Positive",
        }
    }
}

impl fmt::Display for SentimentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSentiment {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub polarity: f64,
    pub level: SentimentLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub average_polarity: f64,
    pub level: SentimentLevel,
    pub news_count: usize,
    pub distribution: BTreeMap<SentimentLevel, usize>,
    pub items: Vec<ItemSentiment>,
}

impl SentimentSummary {
    pub fn empty() -> Self {
        Self {
            average_polarity: 0.0,
            level: SentimentLevel::Neutral,
            news_count: 0,
            distribution: SentimentLevel::ALL.iter().map(|l| (*l, 0)).collect(),
            items: Vec::new(),
        }
    }
}

/// Weighted positive and negative hit counts
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Hits {
    positive: f64,
    negative: f64,
}

impl Hits {
    fn add(&mut self, other: Hits, weight: f64) {
        self.positive += other.positive * weight;
        self.negative += other.negative * weight;
    }

    /// `(pos - neg) / (pos + neg + 1)`, always inside (-1, 1)
    fn polarity(&self) -> f64 {
        (self.positive - self.negative) / (self.positive + self.negative + 1.0)
    }
}

pub struct SentimentAnalysisEngine {
    positive_words: HashSet<&'static str>,
    negative_words: HashSet<&'static str>,
    negation_words: HashSet<&'static str>,
}

impl Default for SentimentAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentAnalysisEngine {
    pub fn new() -> Self {
        Self {
            positive_words: POSITIVE_WORDS.iter().copied().collect(),
            negative_words: NEGATIVE_WORDS.iter().copied().collect(),
            negation_words: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    fn analyze_text(&self, text: &str) -> Hits {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
            .filter(|w| !w.is_empty())
            .collect();

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.negation_words.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut hits = Hits::default();
        for (i, word) in words.iter().enumerate() {
            let is_positive = self.positive_words.contains(word);
            let is_negative = self.negative_words.contains(word);
            if !is_positive && !is_negative {
                continue;
            }

            let negated = negation_positions
                .iter()
                .any(|&neg_pos| neg_pos < i && i - neg_pos <= NEGATION_WINDOW);

            if is_positive != negated {
                hits.positive += 1.0;
            } else {
                hits.negative += 1.0;
            }
        }
        hits
    }

    /// Polarity of one item; title hits count double
    pub fn item_polarity(&self, item: &NewsItem) -> f64 {
        let mut hits = Hits::default();
        hits.add(self.analyze_text(&item.title), TITLE_WEIGHT);
        if let Some(description) = &item.description {
            hits.add(self.analyze_text(description), DESCRIPTION_WEIGHT);
        }
        hits.polarity()
    }

    /// Aggregates the most recent [`MAX_ITEMS`] items
    pub fn analyze(&self, news: &[NewsItem]) -> SentimentSummary {
        let recent = most_recent_news(news.to_vec(), MAX_ITEMS);
        if recent.is_empty() {
            return SentimentSummary::empty();
        }

        let mut summary = SentimentSummary::empty();
        for item in recent {
            let polarity = self.item_polarity(&item);
            let level = SentimentLevel::from_polarity(polarity);
            *summary.distribution.entry(level).or_insert(0) += 1;
            summary.items.push(ItemSentiment {
                title: item.title,
                published_at: item.published_at,
                polarity,
                level,
            });
        }

        summary.news_count = summary.items.len();
        summary.average_polarity =
            summary.items.iter().map(|i| i.polarity).sum::<f64>() / summary.news_count as f64;
        summary.level = SentimentLevel::from_polarity(summary.average_polarity);

        tracing::debug!(
            "Sentiment over {} items: {:.3} ({})",
            summary.news_count,
            summary.average_polarity,
            summary.level
        );
        summary
    }
}
