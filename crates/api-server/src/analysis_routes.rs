use analysis_orchestrator::{AnalysisReport, EarningsResult, QuoteResult};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{ApiResponse, AppError, AppState};

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze/:ticker", get(analyze))
        .route("/api/quote/:ticker", get(quote))
        .route("/api/earnings/:ticker", get(earnings))
}

async fn analyze(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<AnalysisReport>>, AppError> {
    let report = state.orchestrator.analyze(&ticker).await?;
    Ok(Json(ApiResponse::ok(report)))
}

async fn quote(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<QuoteResult>>, AppError> {
    let quote = state.orchestrator.quote(&ticker).await?;
    Ok(Json(ApiResponse::ok(quote)))
}

async fn earnings(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<EarningsResult>>, AppError> {
    let earnings = state.orchestrator.earnings(&ticker).await?;
    Ok(Json(ApiResponse::ok(earnings)))
}
