use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// Ledger units

/// Raw ledger amount in e8s (100_000_000 e8s = 1 ICP).
///
/// Kept as a distinct type so a value can only be converted to ICP once;
/// converted amounts are plain `f64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct E8s(pub u64);

impl E8s {
	pub const ZERO: E8s = E8s(0);

	pub fn saturating_sub(self, other: E8s) -> E8s {
		E8s(self.0.saturating_sub(other.0))
	}

	pub fn saturating_add(self, other: E8s) -> E8s {
		E8s(self.0.saturating_add(other.0))
	}
}

impl fmt::Display for E8s {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} e8s", self.0)
	}
}

// Backend records

/// Plan status as reported by the canister.
///
/// On the wire this is a tagged union with exactly one key present
/// (`{"Active": null}`, `{"Completed": null}`, `{"Cancelled": null}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SavingStatus {
	#[default]
	Active,
	Completed,
	Cancelled,
}

impl SavingStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SavingStatus::Active => "Active",
			SavingStatus::Completed => "Completed",
			SavingStatus::Cancelled => "Cancelled",
		}
	}

	/// Reads the tagged union sent by the backend.
	///
	/// Only `Completed` and `Cancelled` are looked for explicitly. Any record
	/// carrying neither tag is treated as `Active`, including malformed or
	/// unknown tags; the backend contract does not guarantee this, so it is
	/// the documented default rather than a validated state.
	pub fn from_tagged(value: &serde_json::Value) -> Self {
		let has_tag = |tag: &str| match value {
			serde_json::Value::Object(map) => map.contains_key(tag),
			serde_json::Value::String(s) => s.eq_ignore_ascii_case(tag),
			_ => false,
		};
		if has_tag("Completed") {
			SavingStatus::Completed
		} else if has_tag("Cancelled") {
			SavingStatus::Cancelled
		} else {
			SavingStatus::Active
		}
	}
}

impl fmt::Display for SavingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for SavingStatus {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(1))?;
		map.serialize_entry(self.as_str(), &())?;
		map.end()
	}
}

impl<'de> Deserialize<'de> for SavingStatus {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = serde_json::Value::deserialize(deserializer)?;
		Ok(SavingStatus::from_tagged(&value))
	}
}

/// Saving plan exactly as the canister returns it.
/// Timestamps are nanoseconds since the Unix epoch, amounts are e8s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingRaw {
	pub id: u64,
	pub saving_name: String,
	#[serde(default)]
	pub status: SavingStatus,
	#[serde(default)]
	pub is_staking: bool,
	pub created_at: i64,
	pub deadline: i64,
	#[serde(default)]
	pub updated_at: i64,
	#[serde(default)]
	pub priority_level: u8,
	pub current_amount: E8s,
	/// Monthly target.
	pub amount: E8s,
	/// Goal amount.
	pub total_saving: E8s,
	pub principal_id: String,
	#[serde(default)]
	pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSavingArgs {
	pub principal_id: String,
	pub saving_name: String,
	pub amount: E8s,
	pub total_saving: E8s,
	pub deadline: i64,
	pub priority_level: u8,
	pub savings_rate: f64,
	pub is_staking: bool,
}

/// Plan parameters chosen on the customization screen, in ICP and months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCustomization {
	pub name: String,
	pub total_icp: f64,
	pub monthly_icp: f64,
	pub months: u32,
	#[serde(default = "default_priority_level")]
	pub priority_level: u8,
	#[serde(default)]
	pub savings_rate: f64,
	#[serde(default)]
	pub is_staking: bool,
}

fn default_priority_level() -> u8 {
	Priority::Medium.level()
}

impl PlanCustomization {
	/// Prefills the form from an analysis result.
	pub fn from_analysis(name: &str, analysis: &SavingsAnalysis) -> Self {
		Self {
			name: name.trim().to_string(),
			total_icp: analysis.estimated_cost.icp,
			monthly_icp: analysis.monthly_savings.icp,
			months: analysis.timeline.months,
			priority_level: analysis.priority.level(),
			savings_rate: analysis.monthly_savings.percentage,
			is_staking: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingInfo {
	pub saving_id: u64,
	pub staked_amount: E8s,
	pub staked_at: i64,
	pub is_staking: bool,
}

/// Reply envelope used by every canister method: `{"Ok": T}` or `{"Err": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CanisterReply<T> {
	Ok(T),
	Err(String),
}

impl<T> CanisterReply<T> {
	pub fn into_result(self) -> Result<T, String> {
		match self {
			CanisterReply::Ok(value) => Ok(value),
			CanisterReply::Err(message) => Err(message),
		}
	}
}

// View models

/// Display-ready projection of a [`SavingRaw`]. All amounts are ICP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingPlanDetails {
	pub id: u64,
	pub target: String,
	pub total_amount: f64,
	pub current_saved: f64,
	pub monthly_target: f64,
	pub timeline_months: u32,
	pub progress_percent: f64,
	pub next_milestone: String,
	pub start_date: String,
	pub target_date: String,
	pub is_staking: bool,
	pub status: String,
	pub priority_level: u8,
	pub savings_rate: f64,
	pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalQuote {
	pub amount: f64,
	pub fee: f64,
	pub fee_rate: f64,
	pub net_amount: f64,
	pub is_force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
	pub total_saved: f64,
	pub total_target: f64,
	pub active_plans: usize,
	pub completed_plans: usize,
	pub cancelled_plans: usize,
	pub plans: Vec<SavingPlanDetails>,
}

// AI analysis

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
	High,
	#[default]
	Medium,
	Low,
}

impl Priority {
	/// Lenient parse for model output; anything unrecognised is `Medium`.
	pub fn parse_lenient(raw: &str) -> Self {
		match raw.trim().to_ascii_lowercase().as_str() {
			"high" | "urgent" => Priority::High,
			"low" => Priority::Low,
			_ => Priority::Medium,
		}
	}

	/// Maps to the backend's numeric priority level (1 = highest).
	pub fn level(&self) -> u8 {
		match self {
			Priority::High => 1,
			Priority::Medium => 2,
			Priority::Low => 3,
		}
	}
}

impl<'de> Deserialize<'de> for Priority {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = serde_json::Value::deserialize(deserializer)?;
		Ok(match value {
			serde_json::Value::String(s) => Priority::parse_lenient(&s),
			_ => Priority::Medium,
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimatedCost {
	pub icp: f64,
	pub usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisTimeline {
	pub months: u32,
	pub target_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonthlySavings {
	pub icp: f64,
	pub usd: f64,
	pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SavingsAnalysis {
	pub recommendations: Vec<String>,
	pub insights: Vec<String>,
	pub estimated_cost: EstimatedCost,
	pub timeline: AnalysisTimeline,
	pub monthly_savings: MonthlySavings,
	pub priority: Priority,
}

/// What the user typed on the goal screen plus the analysis built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
	pub analysis: SavingsAnalysis,
	pub target: String,
	pub monthly_income: f64,
	pub icp_rate: f64,
	pub saved_at: DateTime<Utc>,
}

// Price

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpPriceData {
	pub price: f64,
	pub change_24h: f64,
	pub change_percent_24h: f64,
	pub last_updated: Option<DateTime<Utc>>,
	pub is_loading: bool,
	pub error: Option<String>,
}

// Auth

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
	pub principal: Option<String>,
	pub is_authenticated: bool,
	pub is_loading: bool,
}

// Settings models

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSettings {
	pub api_url: String,
	pub refresh_interval_secs: u64,
	pub max_age_secs: u64,
}

impl Default for PriceSettings {
	fn default() -> Self {
		Self {
			api_url: "https://api.coingecko.com/api/v3/simple/price?ids=internet-computer&vs_currencies=usd&include_24hr_change=true".to_string(),
			refresh_interval_secs: 300,
			max_age_secs: 60,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
	pub base_url: String,
	pub model: String,
}

impl Default for LlmSettings {
	fn default() -> Self {
		Self {
			base_url: "https://api.openai.com/v1".to_string(),
			model: "gpt-4o-mini".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
	pub host: String,
	pub port: u16,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 3000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub identity_provider_url: String,
	pub canister_id: String,
	pub price: PriceSettings,
	pub llm: LlmSettings,
	/// Directory for the analysis mirror file; mirroring is off when unset.
	pub analysis_cache_dir: Option<PathBuf>,
	pub server: ServerSettings,
	/// Principal used by the local identity provider.
	pub dev_principal: Option<String>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			identity_provider_url: "https://identity.ic0.app".to_string(),
			canister_id: "bkyz2-fmaaa-aaaaa-qaaaq-cai".to_string(),
			price: PriceSettings::default(),
			llm: LlmSettings::default(),
			analysis_cache_dir: None,
			server: ServerSettings::default(),
			dev_principal: None,
		}
	}
}
