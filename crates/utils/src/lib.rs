pub mod fees;
pub mod savings_plan;
pub mod units;
pub mod validation;

// Re-export commonly used items
pub use crate::fees::{calculate_admin_fee, is_withdrawal_eligible, is_withdrawal_eligible_at, net_payout, quote_withdrawal};
pub use crate::savings_plan::{transform_saving_data, transform_saving_data_at};
pub use crate::units::{e8s_to_icp, format_icp, format_usd, icp_to_e8s};
pub use crate::validation::{validate_plan_customization, validate_top_up_amount, validate_withdraw_amount};
