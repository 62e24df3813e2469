use chrono::{DateTime, Utc};
use models::{E8s, SavingPlanDetails, SavingRaw};

use crate::units::{datetime_to_ns, e8s_to_icp, ns_to_datetime, NANOS_PER_MILLI};

/// Plans use a flat 30-day month everywhere, not calendar months.
pub const MS_PER_MONTH: f64 = 30.0 * 24.0 * 60.0 * 60.0 * 1000.0;

const MILESTONES: [u32; 4] = [25, 50, 75, 100];

/// `ceil((end - start) / 30 days)`, timestamps in nanoseconds. May be negative.
pub fn months_between_ns(start_ns: i64, end_ns: i64) -> i64 {
    let elapsed_ms = end_ns.saturating_sub(start_ns) as f64 / NANOS_PER_MILLI as f64;
    (elapsed_ms / MS_PER_MONTH).ceil() as i64
}

/// Months left on the plan's timeline, never negative.
pub fn remaining_months(created_at_ns: i64, deadline_ns: i64, now_ns: i64) -> u32 {
    let total = months_between_ns(created_at_ns, deadline_ns);
    let elapsed = months_between_ns(created_at_ns, now_ns);
    (total - elapsed).clamp(0, u32::MAX as i64) as u32
}

/// Percentage of the goal saved so far; 0 when the goal is 0.
pub fn progress_percent(current: E8s, total: E8s) -> f64 {
    if total.0 == 0 {
        return 0.0;
    }
    current.0 as f64 / total.0 as f64 * 100.0
}

/// The next milestone above `progress`, with its ICP amount:
/// `"50% milestone (2500.00 ICP)"`.
pub fn next_milestone(progress: f64, total_icp: f64) -> String {
    match MILESTONES.iter().find(|m| **m as f64 > progress) {
        Some(m) => format!(
            "{}% milestone ({:.2} ICP)",
            m,
            total_icp * *m as f64 / 100.0
        ),
        None => "Goal reached".to_string(),
    }
}

/// Picks a display icon from keywords in the plan name.
pub fn icon_for(name: &str) -> &'static str {
    let name = name.to_lowercase();
    let rules: [(&[&str], &'static str); 8] = [
        (&["house", "home", "apartment", "rent"], "🏠"),
        (&["car", "vehicle", "motor"], "🚗"),
        (&["travel", "trip", "vacation", "holiday", "flight"], "✈️"),
        (&["school", "education", "tuition", "course", "college"], "🎓"),
        (&["wedding", "ring", "marriage"], "💍"),
        (&["laptop", "computer", "phone", "gadget"], "💻"),
        (&["emergency", "health", "medical"], "🏥"),
        (&["business", "startup", "shop"], "💼"),
    ];
    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| name.contains(k)))
        .map(|(_, icon)| *icon)
        .unwrap_or("💰")
}

/// Builds the view model shown on the dashboard and detail screens.
///
/// Each raw amount goes through [`e8s_to_icp`] exactly once here; callers
/// must not convert the returned ICP values again.
pub fn transform_saving_data_at(raw: &SavingRaw, now: DateTime<Utc>) -> SavingPlanDetails {
    let total_amount = e8s_to_icp(raw.total_saving);
    let current_saved = e8s_to_icp(raw.current_amount);
    let monthly_target = e8s_to_icp(raw.amount);

    let progress = progress_percent(raw.current_amount, raw.total_saving);
    let timeline_months = remaining_months(raw.created_at, raw.deadline, datetime_to_ns(now));

    SavingPlanDetails {
        id: raw.id,
        target: raw.saving_name.clone(),
        total_amount,
        current_saved,
        monthly_target,
        timeline_months,
        progress_percent: progress,
        next_milestone: next_milestone(progress, total_amount),
        start_date: ns_to_datetime(raw.created_at).format("%B %-d, %Y").to_string(),
        target_date: ns_to_datetime(raw.deadline).format("%B %Y").to_string(),
        is_staking: raw.is_staking,
        status: raw.status.as_str().to_string(),
        priority_level: raw.priority_level,
        savings_rate: raw.savings_rate,
        icon: icon_for(&raw.saving_name).to_string(),
    }
}

pub fn transform_saving_data(raw: &SavingRaw) -> SavingPlanDetails {
    transform_saving_data_at(raw, Utc::now())
}
