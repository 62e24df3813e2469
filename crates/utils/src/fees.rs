use chrono::{Datelike, Local, NaiveDate};
use models::WithdrawalQuote;

use crate::validation::{parse_amount, validate_withdraw_amount};

/// Admin fee when withdrawing in the plan's target month.
pub const NORMAL_FEE_RATE: f64 = 0.02;
/// Admin fee for a force (early) withdrawal.
pub const FORCE_FEE_RATE: f64 = 0.05;

pub fn fee_rate(is_force: bool) -> f64 {
    if is_force {
        FORCE_FEE_RATE
    } else {
        NORMAL_FEE_RATE
    }
}

pub fn calculate_admin_fee(amount: f64, is_force: bool) -> f64 {
    amount * fee_rate(is_force)
}

/// `amount - fee`, floored at zero.
pub fn net_payout(amount: f64, is_force: bool) -> f64 {
    (amount - calculate_admin_fee(amount, is_force)).max(0.0)
}

/// Parses the dates the app shows for plans.
///
/// Accepts the view-model forms `"March 2025"` and `"March 5, 2025"`, short
/// month names, and ISO `2025-03-05` / `2025-03`.
pub fn parse_target_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%B %d, %Y"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("1 {s}"), "%d %B %Y"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .ok()
}

/// True iff `today` falls in the same calendar month and year as the target.
///
/// Day-of-month is ignored, and a target in an earlier month is not eligible
/// either: only the exact target month counts.
pub fn is_withdrawal_eligible_at(target_date: &str, today: NaiveDate) -> bool {
    match parse_target_date(target_date) {
        Some(target) => target.year() == today.year() && target.month() == today.month(),
        None => {
            tracing::warn!(target_date, "unparseable target date, treating as not eligible");
            false
        }
    }
}

/// [`is_withdrawal_eligible_at`] against the local calendar date.
pub fn is_withdrawal_eligible(target_date: &str) -> bool {
    is_withdrawal_eligible_at(target_date, Local::now().date_naive())
}

/// Validates a withdraw request and prices it.
///
/// Outside the target month the withdrawal is a force withdrawal and carries
/// the higher fee. Returns the inline validation message on bad input.
pub fn quote_withdrawal(
    raw_amount: &str,
    available: f64,
    target_date: &str,
    today: NaiveDate,
) -> Result<WithdrawalQuote, String> {
    let error = validate_withdraw_amount(raw_amount, available);
    if !error.is_empty() {
        return Err(error);
    }
    let amount = parse_amount(raw_amount).ok_or_else(|| "Please enter a valid number".to_string())?;

    let is_force = !is_withdrawal_eligible_at(target_date, today);
    let fee = calculate_admin_fee(amount, is_force);
    Ok(WithdrawalQuote {
        amount,
        fee,
        fee_rate: fee_rate(is_force),
        net_amount: net_payout(amount, is_force),
        is_force,
    })
}
