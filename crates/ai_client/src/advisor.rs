use chrono::{Duration, NaiveDate};
use models::{
    AnalysisTimeline, EstimatedCost, MonthlySavings, Priority, SavingPlanDetails, SavingsAnalysis,
};
use serde::{Deserialize, Serialize};

use utils::validation::MAX_PLAN_MONTHS;

use crate::extract::{extract_json_array, extract_json_object};
use crate::LlmClient;

/// Share of income suggested when the model cannot be reached.
const FALLBACK_SAVINGS_RATE: f64 = 20.0;
const FALLBACK_MONTHS: u32 = 12;

/// What the user entered on the goal screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRequest {
    pub target: String,
    /// Monthly income in USD.
    pub monthly_income: f64,
}

/// Turns a savings goal into a [`SavingsAnalysis`].
///
/// The model is optional. Without a client, or whenever the call or the
/// parse fails, the advisor answers with static default content, so callers
/// always get an analysis back.
#[derive(Debug, Clone, Default)]
pub struct SavingsAdvisor {
    client: Option<LlmClient>,
}

impl SavingsAdvisor {
    pub fn new(client: Option<LlmClient>) -> Self {
        Self { client }
    }

    pub fn is_online(&self) -> bool {
        self.client.is_some()
    }

    pub async fn analyze_savings_goal(
        &self,
        request: &GoalRequest,
        icp_price: f64,
        today: NaiveDate,
    ) -> SavingsAnalysis {
        let Some(client) = &self.client else {
            tracing::info!("no LLM client configured, using default analysis");
            return fallback_analysis(request, icp_price, today);
        };

        let system_prompt = analysis_system_prompt();
        let user_prompt = format!(
            "Savings goal: {}\nMonthly income: {:.2} USD\nCurrent ICP price: {:.4} USD\nToday: {}",
            request.target.trim(),
            request.monthly_income,
            icp_price,
            today.format("%B %-d, %Y")
        );

        match client.chat(&system_prompt, &user_prompt).await {
            Ok(raw) => match parse_analysis(&raw) {
                Some(analysis) => reconcile(analysis, request, icp_price, today),
                None => {
                    tracing::warn!(raw = %raw, "model did not return a usable analysis, using default");
                    fallback_analysis(request, icp_price, today)
                }
            },
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "analysis request failed, using default");
                fallback_analysis(request, icp_price, today)
            }
        }
    }

    /// Short tips for an existing plan, shown on the plan detail screen.
    pub async fn plan_tips(&self, plan: &SavingPlanDetails) -> Vec<String> {
        let Some(client) = &self.client else {
            return fallback_tips(plan);
        };

        let system_prompt = "You are a savings coach. Reply with a JSON array of 3 short, practical tips (strings) and nothing else.";
        let user_prompt = format!(
            "Plan: {}\nGoal: {:.2} ICP\nSaved: {:.2} ICP ({:.0}%)\nMonthly target: {:.2} ICP\nMonths left: {}\nStaking: {}",
            plan.target,
            plan.total_amount,
            plan.current_saved,
            plan.progress_percent,
            plan.monthly_target,
            plan.timeline_months,
            if plan.is_staking { "yes" } else { "no" }
        );

        match client.chat(system_prompt, &user_prompt).await {
            Ok(raw) => match parse_tips(&raw) {
                Some(tips) => tips,
                None => {
                    tracing::warn!(raw = %raw, "model did not return a tip list, using default");
                    fallback_tips(plan)
                }
            },
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "tips request failed, using default");
                fallback_tips(plan)
            }
        }
    }
}

fn analysis_system_prompt() -> String {
    r#"You are a personal finance assistant for a savings app where users save in ICP (Internet Computer tokens).

Task:
- Estimate the cost of the user's goal, a realistic timeline, and a monthly saving amount that fits their income.
- Give practical recommendations and short insights.

Rules:
- Amounts in "icp" fields are ICP, amounts in "usd" fields are US dollars.
- "percentage" is the monthly saving as a percentage of monthly income.
- "priority" is one of "High", "Medium", "Low".
- "targetDate" is formatted like "March 2026".
- Do NOT add commentary.
- Output MUST be a single valid JSON object with exactly this shape:

{
  "recommendations": ["..."],
  "insights": ["..."],
  "estimatedCost": {"icp": 0, "usd": 0},
  "timeline": {"months": 0, "targetDate": "..."},
  "monthlySavings": {"icp": 0, "usd": 0, "percentage": 0},
  "priority": "Medium"
}
"#
    .to_string()
}

/// Parses model output into an analysis; `None` if no usable object is found.
pub fn parse_analysis(raw: &str) -> Option<SavingsAnalysis> {
    let json = extract_json_object(raw)?;
    let analysis: SavingsAnalysis = serde_json::from_str(json).ok()?;

    let has_numbers = analysis.estimated_cost.icp > 0.0
        || analysis.estimated_cost.usd > 0.0
        || analysis.monthly_savings.icp > 0.0
        || analysis.monthly_savings.usd > 0.0;
    has_numbers.then_some(analysis)
}

/// Parses a JSON array of tip strings; `None` if empty or missing.
pub fn parse_tips(raw: &str) -> Option<Vec<String>> {
    let json = extract_json_array(raw)?;
    let tips: Vec<String> = serde_json::from_str(json).ok()?;
    let tips: Vec<String> = tips
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    (!tips.is_empty()).then_some(tips)
}

/// Fills whatever the model left out from the numbers it did give.
///
/// ICP and USD are derived from each other at `icp_price`; the income share
/// from the monthly USD amount; the target date from the month count.
pub fn reconcile(
    mut analysis: SavingsAnalysis,
    request: &GoalRequest,
    icp_price: f64,
    today: NaiveDate,
) -> SavingsAnalysis {
    if icp_price > 0.0 {
        fill_pair(&mut analysis.estimated_cost.icp, &mut analysis.estimated_cost.usd, icp_price);
        fill_pair(&mut analysis.monthly_savings.icp, &mut analysis.monthly_savings.usd, icp_price);
    }

    if analysis.monthly_savings.percentage <= 0.0 && request.monthly_income > 0.0 {
        analysis.monthly_savings.percentage =
            analysis.monthly_savings.usd / request.monthly_income * 100.0;
    }

    if analysis.timeline.months > MAX_PLAN_MONTHS {
        tracing::warn!(
            months = analysis.timeline.months,
            "model timeline is out of range, capping it"
        );
        analysis.timeline.months = MAX_PLAN_MONTHS;
        analysis.timeline.target_date.clear();
    }
    if analysis.timeline.months == 0 && analysis.monthly_savings.icp > 0.0 {
        let months = (analysis.estimated_cost.icp / analysis.monthly_savings.icp).ceil();
        analysis.timeline.months = if months.is_finite() {
            months.clamp(1.0, MAX_PLAN_MONTHS as f64) as u32
        } else {
            MAX_PLAN_MONTHS
        };
    }
    if analysis.timeline.target_date.trim().is_empty() && analysis.timeline.months > 0 {
        analysis.timeline.target_date = months_from(today, analysis.timeline.months);
    }

    if analysis.recommendations.is_empty() {
        analysis.recommendations = default_recommendations();
    }
    if analysis.insights.is_empty() {
        analysis.insights = default_insights(request);
    }
    analysis
}

fn fill_pair(icp: &mut f64, usd: &mut f64, price: f64) {
    if *icp <= 0.0 && *usd > 0.0 {
        *icp = *usd / price;
    } else if *usd <= 0.0 && *icp > 0.0 {
        *usd = *icp * price;
    }
}

/// Static analysis used whenever the model is unavailable.
pub fn fallback_analysis(request: &GoalRequest, icp_price: f64, today: NaiveDate) -> SavingsAnalysis {
    let monthly_usd = (request.monthly_income * FALLBACK_SAVINGS_RATE / 100.0).max(0.0);
    let monthly_icp = if icp_price > 0.0 { monthly_usd / icp_price } else { 0.0 };
    let months = FALLBACK_MONTHS;

    SavingsAnalysis {
        recommendations: default_recommendations(),
        insights: default_insights(request),
        estimated_cost: EstimatedCost {
            icp: monthly_icp * months as f64,
            usd: monthly_usd * months as f64,
        },
        timeline: AnalysisTimeline {
            months,
            target_date: months_from(today, months),
        },
        monthly_savings: MonthlySavings {
            icp: monthly_icp,
            usd: monthly_usd,
            percentage: if request.monthly_income > 0.0 {
                FALLBACK_SAVINGS_RATE
            } else {
                0.0
            },
        },
        priority: Priority::Medium,
    }
}

fn default_recommendations() -> Vec<String> {
    vec![
        "Set up a fixed monthly top-up right after payday".to_string(),
        "Keep 3-6 months of expenses in an emergency fund before locking funds".to_string(),
        "Consider staking idle ICP to earn rewards while you save".to_string(),
        "Review your plan monthly and adjust the amount if your income changes".to_string(),
    ]
}

fn default_insights(request: &GoalRequest) -> Vec<String> {
    vec![
        format!(
            "Saving {FALLBACK_SAVINGS_RATE:.0}% of your income is a common, sustainable target"
        ),
        format!(
            "Your goal \"{}\" is easier to reach when broken into monthly milestones",
            request.target.trim()
        ),
        "ICP prices move; the USD value of your savings will change over time".to_string(),
    ]
}

fn fallback_tips(plan: &SavingPlanDetails) -> Vec<String> {
    let mut tips = vec![format!(
        "Top up {:.2} ICP each month to stay on track",
        plan.monthly_target
    )];
    if plan.is_staking {
        tips.push("Your savings are staked; unstaking happens automatically on withdrawal".to_string());
    } else {
        tips.push("Stake your savings to earn rewards while you wait".to_string());
    }
    tips.push(format!("Next up: {}", plan.next_milestone));
    tips
}

/// `today` plus `months` 30-day months, formatted like `"March 2026"`.
/// Month label `months` 30-day months after `today`, capped at the plan
/// timeline limit.
fn months_from(today: NaiveDate, months: u32) -> String {
    let days = 30 * i64::from(months.min(MAX_PLAN_MONTHS));
    Duration::try_days(days)
        .and_then(|d| today.checked_add_signed(d))
        .unwrap_or(today)
        .format("%B %Y")
        .to_string()
}
