//! Amount validation for the top-up, withdraw and plan forms.
//!
//! Every validator returns the first applicable error message, or an empty
//! string when the input is valid, so the message can be shown inline next
//! to the field as-is.

use models::PlanCustomization;

use crate::units::{checked_icp_to_e8s, format_icp};

/// Ceiling for a single top-up, in ICP.
pub const MAX_TOP_UP_ICP: f64 = 1000.0;

pub const MAX_PLAN_MONTHS: u32 = 120;

pub const MSG_EMPTY: &str = "Please enter an amount";
pub const MSG_NOT_A_NUMBER: &str = "Please enter a valid number";
pub const MSG_NOT_POSITIVE: &str = "Amount must be greater than 0";
pub const MSG_TOO_SMALL: &str = "Amount must be at least 0.00000001 ICP";
pub const MSG_TOO_LARGE: &str = "Amount is too large";

/// Non-empty, numeric, > 0 and at most [`MAX_TOP_UP_ICP`].
pub fn validate_top_up_amount(raw: &str) -> String {
    match parse_positive_amount(raw) {
        Err(msg) => msg.to_string(),
        Ok(amount) if amount > MAX_TOP_UP_ICP => {
            format!("Maximum top-up amount is {} ICP", format_icp(MAX_TOP_UP_ICP))
        }
        Ok(_) => String::new(),
    }
}

/// Non-empty, numeric, > 0 and at most `max_available` (ICP).
pub fn validate_withdraw_amount(raw: &str, max_available: f64) -> String {
    match parse_positive_amount(raw) {
        Err(msg) => msg.to_string(),
        Ok(amount) if amount > max_available => format!(
            "Amount exceeds available balance ({} ICP)",
            format_icp(max_available)
        ),
        Ok(_) => String::new(),
    }
}

/// Parses an already validated amount field. Call the matching validator
/// first; this returns `None` for anything it would reject as non-numeric.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_positive_amount(raw: &str) -> Result<f64, &'static str> {
    if raw.trim().is_empty() {
        return Err(MSG_EMPTY);
    }
    let amount = parse_amount(raw).ok_or(MSG_NOT_A_NUMBER)?;
    if amount <= 0.0 {
        return Err(MSG_NOT_POSITIVE);
    }
    match checked_icp_to_e8s(amount) {
        Some(_) => Ok(amount),
        None if amount < 1.0 => Err(MSG_TOO_SMALL),
        None => Err(MSG_TOO_LARGE),
    }
}

/// Checks a plan before it is sent to the backend.
pub fn validate_plan_customization(plan: &PlanCustomization) -> String {
    if plan.name.trim().is_empty() {
        return "Please give your saving goal a name".to_string();
    }
    if !plan.total_icp.is_finite() || plan.total_icp <= 0.0 {
        return "Goal amount must be greater than 0".to_string();
    }
    if !plan.monthly_icp.is_finite() || plan.monthly_icp <= 0.0 {
        return "Monthly saving must be greater than 0".to_string();
    }
    if checked_icp_to_e8s(plan.total_icp).is_none() {
        return "Goal amount is out of range".to_string();
    }
    if checked_icp_to_e8s(plan.monthly_icp).is_none() {
        return "Monthly saving is out of range".to_string();
    }
    if plan.monthly_icp > plan.total_icp {
        return "Monthly saving cannot exceed the goal amount".to_string();
    }
    if plan.months == 0 || plan.months > MAX_PLAN_MONTHS {
        return format!("Timeline must be between 1 and {MAX_PLAN_MONTHS} months");
    }
    if !(1..=3).contains(&plan.priority_level) {
        return "Priority must be 1 (high), 2 (medium) or 3 (low)".to_string();
    }
    String::new()
}
