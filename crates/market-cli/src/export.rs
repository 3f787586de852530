use analysis_orchestrator::OpportunityRecord;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

const COLUMNS: [&str; 9] = [
    "ticker",
    "sector",
    "price",
    "pe",
    "peg",
    "roe",
    "signal",
    "sentiment",
    "opportunity_score",
];

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

pub fn write_records<W: Write>(records: &[OpportunityRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for record in records {
        let metrics = &record.fundamentals;
        wtr.write_record([
            record.ticker.to_string(),
            record.sector.clone().unwrap_or_default(),
            format!("{:.2}", record.price),
            optional(metrics.pe_ratio),
            optional(metrics.peg_ratio),
            optional(metrics.roe),
            record.technical.composite.recommendation.to_string(),
            record.sentiment.level.to_string(),
            format!("{:.2}", record.opportunity_score),
        ])?;
    }
    wtr.flush().context("failed to flush CSV writer")?;
    Ok(())
}

pub fn write_csv(records: &[OpportunityRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_records(records, file).with_context(|| format!("writing {}", path.display()))
}
