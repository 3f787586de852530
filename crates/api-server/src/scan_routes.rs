use analysis_core::AnalysisError;
use analysis_orchestrator::{IndexMembership, ScanFilters, ScanResult};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

/// Query-string form of `ScanFilters`; omitted fields keep the scan defaults
#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub index: Option<String>,
    /// Comma-separated custom universe
    pub tickers: Option<String>,
    pub max_pe: Option<f64>,
    pub max_peg: Option<f64>,
    pub above_sma20: Option<bool>,
    pub limit: Option<usize>,
}

impl ScanQuery {
    pub fn into_filters(self) -> Result<ScanFilters, AnalysisError> {
        let defaults = ScanFilters::default();
        let index = match self.index {
            Some(raw) => raw.parse::<IndexMembership>()?,
            None => defaults.index,
        };
        let tickers = self.tickers.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        });

        Ok(ScanFilters {
            index,
            tickers,
            max_pe: self.max_pe.or(defaults.max_pe),
            max_peg: self.max_peg.or(defaults.max_peg),
            above_sma20: self.above_sma20.unwrap_or(defaults.above_sma20),
            limit: self.limit.unwrap_or(defaults.limit),
            ..defaults
        })
    }
}

pub fn scan_routes() -> Router<AppState> {
    Router::new().route("/api/scan", get(scan_query).post(scan_body))
}

async fn scan_query(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ApiResponse<ScanResult>>, AppError> {
    let filters = query.into_filters()?;
    let result = state.screener.screen(filters).await?;
    Ok(Json(ApiResponse::ok(result)))
}

async fn scan_body(
    State(state): State<AppState>,
    Json(filters): Json<ScanFilters>,
) -> Result<Json<ApiResponse<ScanResult>>, AppError> {
    let result = state.screener.screen(filters).await?;
    Ok(Json(ApiResponse::ok(result)))
}
