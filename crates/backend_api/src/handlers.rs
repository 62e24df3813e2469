use ai_client::GoalRequest;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use models::{AnalysisSession, PlanCustomization};
use serde::{Deserialize, Serialize};
use services::flows;

use crate::{error::ApiError, state::AppState, Result};

/// Amounts arrive as typed in the form, but plain numbers are accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(f64),
}

impl AmountInput {
    fn as_text(&self) -> String {
        match self {
            AmountInput::Text(text) => text.clone(),
            AmountInput::Number(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub amount: AmountInput,
    #[serde(default)]
    pub auto_stake: bool,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: AmountInput,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeResponse {
    pub saving_id: u64,
    pub released_icp: f64,
}

#[derive(Debug, Serialize)]
pub struct TipsResponse {
    pub tips: Vec<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "savr-api",
        "llm": state.advisor.is_online(),
    }))
}

// Auth

/// GET /api/auth/session
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.auth.session().await)
}

/// POST /api/auth/login
pub async fn login(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.auth.login().await?;
    Ok(Json(state.auth.session().await))
}

/// POST /api/auth/logout
/// Also drops any analysis in progress.
pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.auth.logout().await?;
    state.analysis.clear().await;
    Ok(Json(state.auth.session().await))
}

// Price

/// GET /api/price
pub async fn get_price(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.price.ensure_fresh(state.price_max_age).await)
}

/// POST /api/price/refresh
pub async fn refresh_price(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.price.refresh_price().await)
}

// Analysis

/// POST /api/analysis
/// Runs the goal analysis and keeps it for the customization step.
pub async fn create_analysis(
    State(state): State<AppState>,
    Json(request): Json<GoalRequest>,
) -> Result<impl IntoResponse> {
    if request.target.trim().is_empty() {
        return Err(ApiError::Validation("Please describe your savings goal".to_string()));
    }
    if !request.monthly_income.is_finite() || request.monthly_income <= 0.0 {
        return Err(ApiError::Validation("Monthly income must be greater than 0".to_string()));
    }

    let price = state.price.ensure_fresh(state.price_max_age).await;
    let now = Utc::now();

    let analysis = state
        .scope
        .run(
            state
                .advisor
                .analyze_savings_goal(&request, price.price, now.date_naive()),
        )
        .await
        .ok_or(services::ServiceError::Cancelled)?;

    let session = AnalysisSession {
        analysis,
        target: request.target.trim().to_string(),
        monthly_income: request.monthly_income,
        icp_rate: price.price,
        saved_at: now,
    };
    state.analysis.set(session.clone()).await;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/analysis
pub async fn get_analysis(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state
        .analysis
        .get()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No analysis in progress".to_string()))
}

/// GET /api/analysis/customization
/// Plan form prefilled from the stored analysis.
pub async fn get_customization(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let session = state
        .analysis
        .get()
        .await
        .ok_or_else(|| ApiError::NotFound("No analysis in progress".to_string()))?;
    Ok(Json(PlanCustomization::from_analysis(&session.target, &session.analysis)))
}

/// DELETE /api/analysis
pub async fn clear_analysis(State(state): State<AppState>) -> impl IntoResponse {
    state.analysis.clear().await;
    StatusCode::NO_CONTENT
}

// Savings

/// GET /api/savings
pub async fn get_dashboard(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let summary = flows::load_dashboard(&handle, Utc::now()).await?;
    Ok(Json(summary))
}

/// POST /api/savings
/// Starts a plan; the analysis that led here is no longer needed.
pub async fn start_plan(
    State(state): State<AppState>,
    Json(plan): Json<PlanCustomization>,
) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let details = flows::start_plan(&handle, &plan, Utc::now()).await?;
    state.analysis.clear().await;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/savings/:id
pub async fn get_plan(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let view = flows::load_plan_view(&handle, id, Utc::now()).await?;
    Ok(Json(view))
}

/// POST /api/savings/:id/top-up
pub async fn top_up(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<TopUpRequest>,
) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let report = flows::top_up(
        &handle,
        id,
        &request.amount.as_text(),
        request.auto_stake,
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}

/// GET /api/savings/:id/withdraw/quote?amount=
pub async fn quote_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<QuoteQuery>,
) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let quote = flows::quote(&handle, id, &query.amount, Utc::now()).await?;
    Ok(Json(quote))
}

/// POST /api/savings/:id/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<WithdrawRequest>,
) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let report = flows::withdraw(&handle, id, &request.amount.as_text(), Utc::now()).await?;
    Ok(Json(report))
}

/// POST /api/savings/:id/stake
pub async fn stake(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let info = flows::stake(&handle, id).await?;
    Ok(Json(info))
}

/// POST /api/savings/:id/unstake
pub async fn unstake(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let released_icp = flows::unstake(&handle, id).await?;
    Ok(Json(UnstakeResponse {
        saving_id: id,
        released_icp,
    }))
}

/// GET /api/savings/:id/tips
pub async fn plan_tips(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    let handle = state.auth.actor().await?;
    let plan = flows::load_plan_details(&handle, id, Utc::now()).await?;
    let tips = state
        .scope
        .run(state.advisor.plan_tips(&plan))
        .await
        .ok_or(services::ServiceError::Cancelled)?;
    Ok(Json(TipsResponse { tips }))
}
