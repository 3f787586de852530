mod cli;
mod export;

use analysis_core::AnalysisError;
use analysis_orchestrator::{AnalysisOrchestrator, ScannerConfig, StockScreener};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::{Cli, Command};

/// 2 for bad input, 3 when the data is unknown or unavailable, 1 otherwise
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::InvalidInput(_)) => 2,
        Some(AnalysisError::UnknownTicker(_)) | Some(AnalysisError::DataUnavailable(_)) => 3,
        _ => 1,
    }
}

fn render<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

async fn run(cli: Cli) -> Result<()> {
    let config = ScannerConfig::from_env().context("loading scanner configuration")?;
    let orchestrator = Arc::new(AnalysisOrchestrator::from_config(config)?);

    let output = match cli.command {
        Command::Analyze { ticker } => render(&orchestrator.analyze(&ticker).await?, cli.pretty)?,
        Command::Quote { ticker } => render(&orchestrator.quote(&ticker).await?, cli.pretty)?,
        Command::Earnings { ticker } => render(&orchestrator.earnings(&ticker).await?, cli.pretty)?,
        Command::Scan(args) => {
            let result = StockScreener::new(Arc::clone(&orchestrator))
                .screen(args.filters())
                .await?;
            if let Some(path) = &args.csv {
                export::write_csv(&result.records, path)?;
                tracing::info!("Wrote {} records to {}", result.records.len(), path.display());
            }
            render(&result, cli.pretty)?
        }
    };

    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    analysis_core::init_tracing(std::io::stderr);

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::from(exit_code(&error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::SourceError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&AnalysisError::InvalidInput("bad".into()).into()), 2);
        assert_eq!(exit_code(&AnalysisError::UnknownTicker("ZZZZ".into()).into()), 3);
        assert_eq!(exit_code(&AnalysisError::DataUnavailable("quote".into()).into()), 3);
        assert_eq!(
            exit_code(&AnalysisError::Source(SourceError::Unavailable("down".into())).into()),
            1
        );
        assert_eq!(exit_code(&anyhow::anyhow!("config")), 1);
    }

    #[test]
    fn test_render_pretty() {
        let value = serde_json::json!({"ticker": "AAPL"});
        assert_eq!(render(&value, false).unwrap(), r#"{"ticker":"AAPL"}"#);
        assert!(render(&value, true).unwrap().contains("\n"));
    }
}
