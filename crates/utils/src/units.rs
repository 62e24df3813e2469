use chrono::{DateTime, Utc};
use models::E8s;

/// 100_000_000 e8s = 1 ICP
pub const E8S_PER_ICP: u64 = 100_000_000;

pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Converts a raw ledger amount to ICP.
///
/// This is the only place the e8s divisor is applied. The result is a plain
/// `f64`, so it cannot be passed back in by mistake.
pub fn e8s_to_icp(amount: E8s) -> f64 {
    amount.0 as f64 / E8S_PER_ICP as f64
}

/// Converts an ICP amount to e8s, rounding to the nearest e8.
/// Negative, NaN and infinite inputs map to zero.
pub fn icp_to_e8s(icp: f64) -> E8s {
    if !icp.is_finite() || icp <= 0.0 {
        return E8s::ZERO;
    }
    E8s((icp * E8S_PER_ICP as f64).round() as u64)
}

/// Like [`icp_to_e8s`], but `None` when the amount does not survive the
/// conversion: below half an e8, or beyond the `u64` e8s range.
pub fn checked_icp_to_e8s(icp: f64) -> Option<E8s> {
    if !icp.is_finite() || icp <= 0.0 {
        return None;
    }
    let e8s = (icp * E8S_PER_ICP as f64).round();
    if e8s < 1.0 || e8s >= u64::MAX as f64 {
        return None;
    }
    Some(E8s(e8s as u64))
}

/// `1234.5` -> `"1,234.50"`
pub fn format_icp(amount: f64) -> String {
    format_grouped(amount, 2)
}

/// USD value of an ICP amount at `price`, rounded to whole dollars: `"7,500"`.
pub fn format_usd(icp_amount: f64, price: f64) -> String {
    format_grouped(icp_amount * price, 0)
}

/// Fixed-precision number with `,` thousands separators (en-US style).
pub fn format_grouped(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    // No "-0.00"
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn ns_to_datetime(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}

/// Nanoseconds since the epoch; saturates outside the representable range
/// (roughly years 1677..2262).
pub fn datetime_to_ns(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
