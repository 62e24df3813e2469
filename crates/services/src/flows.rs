//! Screen-level operations: each one fetches from the canister, applies the
//! local calculations and returns a display-ready result.
//!
//! Multi-step flows are best-effort. A later step failing does not undo an
//! earlier one; the [`FlowReport`] says which steps went through.

use chrono::{DateTime, Duration, Utc};
use models::{
    DashboardSummary, PlanCustomization, SavingPlanDetails, SavingRaw, SavingStatus, StakingInfo,
    StartSavingArgs, WithdrawalQuote,
};
use serde::Serialize;
use utils::units::datetime_to_ns;
use utils::{
    e8s_to_icp, icp_to_e8s, is_withdrawal_eligible_at, quote_withdrawal, transform_saving_data_at,
    validate_plan_customization, validate_top_up_amount,
};

use crate::auth::ActorHandle;
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStep {
    pub name: String,
    pub status: StepStatus,
    pub message: String,
}

/// Outcome of a multi-step flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowReport {
    pub steps: Vec<FlowStep>,
    /// Some steps went through and at least one failed.
    pub partial: bool,
    pub message: String,
    pub plan: Option<SavingPlanDetails>,
    pub quote: Option<WithdrawalQuote>,
}

impl FlowReport {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            partial: false,
            message: String::new(),
            plan: None,
            quote: None,
        }
    }

    fn succeeded(&mut self, name: &str, message: impl Into<String>) {
        self.steps.push(FlowStep {
            name: name.to_string(),
            status: StepStatus::Succeeded,
            message: message.into(),
        });
    }

    fn failed(&mut self, name: &str, message: impl Into<String>) {
        self.steps.push(FlowStep {
            name: name.to_string(),
            status: StepStatus::Failed,
            message: message.into(),
        });
        self.partial = self.steps.iter().any(|s| s.status == StepStatus::Succeeded);
    }
}

/// Everything the plan detail screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub plan: SavingPlanDetails,
    pub staking: Option<StakingInfo>,
    pub withdrawal_eligible: bool,
}

async fn fetch_raw(handle: &ActorHandle, saving_id: u64) -> Result<SavingRaw> {
    handle
        .actor
        .get_user_savings(&handle.principal)
        .await?
        .into_iter()
        .find(|s| s.id == saving_id)
        .ok_or(ServiceError::PlanNotFound(saving_id))
}

pub async fn load_plan_details(
    handle: &ActorHandle,
    saving_id: u64,
    now: DateTime<Utc>,
) -> Result<SavingPlanDetails> {
    let raw = fetch_raw(handle, saving_id).await?;
    Ok(transform_saving_data_at(&raw, now))
}

/// All plans of the signed-in user, highest priority first.
pub async fn load_dashboard(handle: &ActorHandle, now: DateTime<Utc>) -> Result<DashboardSummary> {
    let mut savings = handle.actor.get_user_savings(&handle.principal).await?;
    savings.sort_by_key(|s| (s.priority_level, s.id));

    let mut summary = DashboardSummary::default();
    for raw in &savings {
        match raw.status {
            SavingStatus::Active => summary.active_plans += 1,
            SavingStatus::Completed => summary.completed_plans += 1,
            SavingStatus::Cancelled => summary.cancelled_plans += 1,
        }
        let plan = transform_saving_data_at(raw, now);
        summary.total_saved += plan.current_saved;
        summary.total_target += plan.total_amount;
        summary.plans.push(plan);
    }
    Ok(summary)
}

pub async fn load_plan_view(handle: &ActorHandle, saving_id: u64, now: DateTime<Utc>) -> Result<PlanView> {
    let plan = load_plan_details(handle, saving_id, now).await?;

    // The detail screen still renders without staking info
    let staking = match handle.actor.get_staking_info(saving_id).await {
        Ok(info) => Some(info),
        Err(err) => {
            tracing::warn!(saving_id, error = %err, "could not load staking info");
            None
        }
    };

    let withdrawal_eligible = is_withdrawal_eligible_at(&plan.target_date, now.date_naive());
    Ok(PlanView {
        plan,
        staking,
        withdrawal_eligible,
    })
}

/// Validates the customized plan and asks the canister to start it.
/// ICP amounts and the timeline are converted to e8s and nanoseconds here.
pub async fn start_plan(
    handle: &ActorHandle,
    plan: &PlanCustomization,
    now: DateTime<Utc>,
) -> Result<SavingPlanDetails> {
    let error = validate_plan_customization(plan);
    if !error.is_empty() {
        return Err(ServiceError::Validation(error));
    }

    let deadline = now + Duration::days(30 * plan.months as i64);
    let args = StartSavingArgs {
        principal_id: handle.principal.clone(),
        saving_name: plan.name.trim().to_string(),
        amount: icp_to_e8s(plan.monthly_icp),
        total_saving: icp_to_e8s(plan.total_icp),
        deadline: datetime_to_ns(deadline),
        priority_level: plan.priority_level,
        savings_rate: plan.savings_rate,
        is_staking: plan.is_staking,
    };

    let raw = handle.actor.start_saving(args).await?;
    tracing::info!(saving_id = raw.id, name = %raw.saving_name, "saving plan started");
    Ok(transform_saving_data_at(&raw, now))
}

/// Top-up, then stake the same amount when requested or when the plan is
/// already staking.
///
/// A failed top-up is an error. A failed stake after a successful top-up is
/// a partial success: the funds stay in the plan, unstaked.
pub async fn top_up(
    handle: &ActorHandle,
    saving_id: u64,
    raw_amount: &str,
    auto_stake: bool,
    now: DateTime<Utc>,
) -> Result<FlowReport> {
    let error = validate_top_up_amount(raw_amount);
    if !error.is_empty() {
        return Err(ServiceError::Validation(error));
    }
    let amount_icp = utils::validation::parse_amount(raw_amount)
        .ok_or_else(|| ServiceError::Validation(utils::validation::MSG_NOT_A_NUMBER.to_string()))?;
    let amount = icp_to_e8s(amount_icp);

    let before = fetch_raw(handle, saving_id).await?;
    let mut report = FlowReport::new();

    let after = handle
        .actor
        .top_up_saving(saving_id, &handle.principal, amount)
        .await?;
    report.succeeded("top_up", format!("Added {} ICP", utils::format_icp(amount_icp)));

    if auto_stake || before.is_staking {
        match handle
            .actor
            .stake_icp(saving_id, &handle.principal, amount)
            .await
        {
            Ok(info) => report.succeeded(
                "stake",
                format!("{} ICP staked", utils::format_icp(e8s_to_icp(info.staked_amount))),
            ),
            Err(err) => {
                tracing::warn!(saving_id, error = %err, "top-up succeeded but staking failed");
                report.failed("stake", err.to_string());
            }
        }
    }

    report.message = if report.partial {
        "Top-up successful, but staking failed. Your funds are saved unstaked.".to_string()
    } else {
        "Top-up successful".to_string()
    };
    report.plan = Some(refreshed_or(handle, saving_id, after, now).await);
    Ok(report)
}

/// Withdraw, unstaking first when the plan is staked.
///
/// Outside the target month this is a force withdrawal with the higher fee.
/// If unstaking fails nothing has happened and the error is returned. If the
/// withdrawal fails after unstaking, the report is a partial success and the
/// funds remain in the plan, unstaked.
pub async fn withdraw(
    handle: &ActorHandle,
    saving_id: u64,
    raw_amount: &str,
    now: DateTime<Utc>,
) -> Result<FlowReport> {
    let raw = fetch_raw(handle, saving_id).await?;
    let plan = transform_saving_data_at(&raw, now);
    let quote = quote_withdrawal(raw_amount, plan.current_saved, &plan.target_date, now.date_naive())
        .map_err(ServiceError::Validation)?;

    let mut report = FlowReport::new();
    report.quote = Some(quote.clone());

    if raw.is_staking {
        let released = handle
            .actor
            .unstake_icp(saving_id, &handle.principal)
            .await?;
        report.succeeded(
            "unstake",
            format!("{} ICP unstaked", utils::format_icp(e8s_to_icp(released))),
        );
    }

    let result = handle
        .actor
        .withdraw_saving(saving_id, &handle.principal, icp_to_e8s(quote.amount), quote.is_force)
        .await;

    match result {
        Ok(after) => {
            report.succeeded(
                "withdraw",
                format!(
                    "Withdrew {} ICP (fee {} ICP, you receive {} ICP)",
                    utils::format_icp(quote.amount),
                    utils::format_icp(quote.fee),
                    utils::format_icp(quote.net_amount)
                ),
            );
            report.message = if quote.is_force {
                "Early withdrawal completed".to_string()
            } else {
                "Withdrawal completed".to_string()
            };
            report.plan = Some(refreshed_or(handle, saving_id, after, now).await);
            Ok(report)
        }
        Err(err) if !report.steps.is_empty() => {
            tracing::warn!(saving_id, error = %err, "unstaked but withdrawal failed");
            report.failed("withdraw", err.to_string());
            report.message =
                "Funds were unstaked, but the withdrawal failed. Please try again.".to_string();
            report.plan = load_plan_details(handle, saving_id, now).await.ok();
            Ok(report)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn stake(handle: &ActorHandle, saving_id: u64) -> Result<StakingInfo> {
    let raw = fetch_raw(handle, saving_id).await?;
    if raw.is_staking {
        return Err(ServiceError::Validation("This plan is already staking".to_string()));
    }
    if raw.current_amount.0 == 0 {
        return Err(ServiceError::Validation("Top up before staking".to_string()));
    }
    Ok(handle
        .actor
        .stake_icp(saving_id, &handle.principal, raw.current_amount)
        .await?)
}

/// Returns the released amount in ICP.
pub async fn unstake(handle: &ActorHandle, saving_id: u64) -> Result<f64> {
    let released = handle.actor.unstake_icp(saving_id, &handle.principal).await?;
    Ok(e8s_to_icp(released))
}

pub async fn quote(
    handle: &ActorHandle,
    saving_id: u64,
    raw_amount: &str,
    now: DateTime<Utc>,
) -> Result<WithdrawalQuote> {
    let plan = load_plan_details(handle, saving_id, now).await?;
    quote_withdrawal(raw_amount, plan.current_saved, &plan.target_date, now.date_naive())
        .map_err(ServiceError::Validation)
}

/// Re-fetches the plan after a mutation, falling back to the record the
/// mutation returned.
async fn refreshed_or(
    handle: &ActorHandle,
    saving_id: u64,
    fallback: SavingRaw,
    now: DateTime<Utc>,
) -> SavingPlanDetails {
    match fetch_raw(handle, saving_id).await {
        Ok(raw) => transform_saving_data_at(&raw, now),
        Err(err) => {
            tracing::warn!(saving_id, error = %err, "refresh after update failed");
            transform_saving_data_at(&fallback, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{CanisterResult, InMemorySavingsActor, SavingsActor};
    use crate::error::CanisterError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use models::E8s;
    use std::sync::Arc;

    const ALICE: &str = "2vxsx-fae";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn in_memory() -> Arc<InMemorySavingsActor> {
        let ns = datetime_to_ns(now());
        Arc::new(InMemorySavingsActor::with_clock(Arc::new(move || ns)))
    }

    fn handle(actor: Arc<dyn SavingsActor>) -> ActorHandle {
        ActorHandle {
            actor,
            principal: ALICE.to_string(),
        }
    }

    fn customization(months: u32) -> PlanCustomization {
        PlanCustomization {
            name: "Emergency fund".to_string(),
            total_icp: 5000.0,
            monthly_icp: 850.0,
            months,
            priority_level: 1,
            savings_rate: 25.0,
            is_staking: false,
        }
    }

    /// Delegates to the in-memory actor but refuses selected operations.
    struct FlakyActor {
        inner: Arc<InMemorySavingsActor>,
        fail_stake: bool,
        fail_withdraw: bool,
    }

    #[async_trait]
    impl SavingsActor for FlakyActor {
        async fn start_saving(&self, args: StartSavingArgs) -> CanisterResult<SavingRaw> {
            self.inner.start_saving(args).await
        }
        async fn get_user_savings(&self, principal: &str) -> CanisterResult<Vec<SavingRaw>> {
            self.inner.get_user_savings(principal).await
        }
        async fn top_up_saving(&self, id: u64, principal: &str, amount: E8s) -> CanisterResult<SavingRaw> {
            self.inner.top_up_saving(id, principal, amount).await
        }
        async fn withdraw_saving(
            &self,
            id: u64,
            principal: &str,
            amount: E8s,
            is_force: bool,
        ) -> CanisterResult<SavingRaw> {
            if self.fail_withdraw {
                return Err(CanisterError::Transport("replica unavailable".to_string()));
            }
            self.inner.withdraw_saving(id, principal, amount, is_force).await
        }
        async fn stake_icp(&self, id: u64, principal: &str, amount: E8s) -> CanisterResult<StakingInfo> {
            if self.fail_stake {
                return Err(CanisterError::Rejected("Neuron creation failed".to_string()));
            }
            self.inner.stake_icp(id, principal, amount).await
        }
        async fn unstake_icp(&self, id: u64, principal: &str) -> CanisterResult<E8s> {
            self.inner.unstake_icp(id, principal).await
        }
        async fn get_staking_info(&self, id: u64) -> CanisterResult<StakingInfo> {
            self.inner.get_staking_info(id).await
        }
    }

    #[tokio::test]
    async fn test_start_plan_converts_units_once() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let plan = start_plan(&h, &customization(6), now()).await.unwrap();

        assert_eq!(plan.total_amount, 5000.0);
        assert_eq!(plan.monthly_target, 850.0);
        assert_eq!(plan.timeline_months, 6);

        let raw = &actor.get_user_savings(ALICE).await.unwrap()[0];
        assert_eq!(raw.total_saving, E8s(500_000_000_000));
        assert_eq!(raw.amount, E8s(85_000_000_000));
        assert_eq!(raw.deadline, datetime_to_ns(now() + Duration::days(180)));
    }

    #[tokio::test]
    async fn test_start_plan_validation() {
        let h = handle(in_memory());
        let err = start_plan(&h, &customization(0), now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let first = start_plan(&h, &customization(6), now()).await.unwrap();
        let mut low = customization(12);
        low.name = "Holiday".to_string();
        low.priority_level = 3;
        start_plan(&h, &low, now()).await.unwrap();
        top_up(&h, first.id, "1000", false, now()).await.unwrap();

        let summary = load_dashboard(&h, now()).await.unwrap();
        assert_eq!(summary.plans.len(), 2);
        assert_eq!(summary.plans[0].target, "Emergency fund");
        assert_eq!(summary.active_plans, 2);
        assert_eq!(summary.total_saved, 1000.0);
        assert_eq!(summary.total_target, 10000.0);
    }

    #[tokio::test]
    async fn test_top_up_with_stake() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;

        let report = top_up(&h, id, "250.5", true, now()).await.unwrap();
        assert!(!report.partial);
        assert_eq!(report.steps.len(), 2);
        let plan = report.plan.unwrap();
        assert_eq!(plan.current_saved, 250.5);
        assert!(plan.is_staking);
    }

    #[tokio::test]
    async fn test_top_up_validation_happens_before_any_call() {
        let h = handle(in_memory());
        let err = top_up(&h, 99, "1001", false, now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stake_failure_keeps_transfer() {
        let inner = in_memory();
        let h = handle(Arc::new(FlakyActor {
            inner: inner.clone(),
            fail_stake: true,
            fail_withdraw: false,
        }));
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;

        let report = top_up(&h, id, "100", true, now()).await.unwrap();
        assert!(report.partial);
        assert_eq!(report.steps[0].status, StepStatus::Succeeded);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        let plan = report.plan.unwrap();
        assert_eq!(plan.current_saved, 100.0);
        assert!(!plan.is_staking);
    }

    #[tokio::test]
    async fn test_force_withdraw_before_target_month() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;
        top_up(&h, id, "500", false, now()).await.unwrap();

        let report = withdraw(&h, id, "100", now()).await.unwrap();
        let quote = report.quote.unwrap();
        assert!(quote.is_force);
        assert!((quote.fee - 5.0).abs() < 1e-9);
        assert_eq!(report.plan.unwrap().current_saved, 400.0);
    }

    #[tokio::test]
    async fn test_withdraw_in_target_month_uses_normal_fee() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;
        top_up(&h, id, "500", false, now()).await.unwrap();

        // Deadline is 180 days out: August 2025
        let in_target_month = Utc.with_ymd_and_hms(2025, 8, 10, 0, 0, 0).unwrap();
        let quote = quote(&h, id, "100", in_target_month).await.unwrap();
        assert!(!quote.is_force);
        assert!((quote.net_amount - 98.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sub_e8_amounts_never_reach_the_canister() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;
        top_up(&h, id, "50", true, now()).await.unwrap();

        let err = withdraw(&h, id, "0.000000001", now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = top_up(&h, id, "0.000000001", false, now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Still staked: the unstake step never ran
        let plan = load_plan_details(&h, id, now()).await.unwrap();
        assert!(plan.is_staking);
        assert_eq!(plan.current_saved, 50.0);
    }

    #[tokio::test]
    async fn test_withdraw_over_balance_is_validation_error() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;
        top_up(&h, id, "10", false, now()).await.unwrap();

        let err = withdraw(&h, id, "10.5", now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unstake_then_withdraw() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;
        top_up(&h, id, "300", true, now()).await.unwrap();

        let report = withdraw(&h, id, "300", now()).await.unwrap();
        assert!(!report.partial);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[0].name, "unstake");
        let plan = report.plan.unwrap();
        assert_eq!(plan.current_saved, 0.0);
        assert!(!plan.is_staking);
    }

    #[tokio::test]
    async fn test_withdraw_failure_after_unstake_is_partial() {
        let inner = in_memory();
        let ok = handle(inner.clone());
        let id = start_plan(&ok, &customization(6), now()).await.unwrap().id;
        top_up(&ok, id, "300", true, now()).await.unwrap();

        let flaky = handle(Arc::new(FlakyActor {
            inner: inner.clone(),
            fail_stake: false,
            fail_withdraw: true,
        }));
        let report = withdraw(&flaky, id, "100", now()).await.unwrap();
        assert!(report.partial);
        let plan = report.plan.unwrap();
        assert!(!plan.is_staking);
        assert_eq!(plan.current_saved, 300.0);
    }

    #[tokio::test]
    async fn test_withdraw_failure_without_unstake_is_error() {
        let inner = in_memory();
        let ok = handle(inner.clone());
        let id = start_plan(&ok, &customization(6), now()).await.unwrap().id;
        top_up(&ok, id, "300", false, now()).await.unwrap();

        let flaky = handle(Arc::new(FlakyActor {
            inner,
            fail_stake: false,
            fail_withdraw: true,
        }));
        let err = withdraw(&flaky, id, "100", now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Backend(CanisterError::Transport(_))));
    }

    #[tokio::test]
    async fn test_plan_view_and_stake_toggle() {
        let actor = in_memory();
        let h = handle(actor.clone());
        let id = start_plan(&h, &customization(6), now()).await.unwrap().id;

        assert!(matches!(stake(&h, id).await, Err(ServiceError::Validation(_))));
        top_up(&h, id, "40", false, now()).await.unwrap();
        let info = stake(&h, id).await.unwrap();
        assert_eq!(info.staked_amount, E8s(4_000_000_000));

        let view = load_plan_view(&h, id, now()).await.unwrap();
        assert!(view.plan.is_staking);
        assert!(view.staking.unwrap().is_staking);
        assert!(!view.withdrawal_eligible);

        assert_eq!(unstake(&h, id).await.unwrap(), 40.0);
        assert!(matches!(
            load_plan_view(&h, 42, now()).await,
            Err(ServiceError::PlanNotFound(42))
        ));
    }
}
