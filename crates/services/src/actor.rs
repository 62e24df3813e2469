use async_trait::async_trait;
use chrono::Utc;
use models::{CanisterReply, E8s, SavingRaw, SavingStatus, StakingInfo, StartSavingArgs};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use utils::units::datetime_to_ns;

use crate::error::CanisterError;

pub type CanisterResult<T> = std::result::Result<T, CanisterError>;

/// Converts the canister's `{"Ok": T} | {"Err": msg}` envelope.
pub fn from_reply<T>(reply: CanisterReply<T>) -> CanisterResult<T> {
    reply.into_result().map_err(CanisterError::Rejected)
}

/// Savings canister interface.
///
/// Amounts are e8s and timestamps are nanoseconds, exactly as the canister
/// stores them; principals are passed in their text form.
#[async_trait]
pub trait SavingsActor: Send + Sync {
    async fn start_saving(&self, args: StartSavingArgs) -> CanisterResult<SavingRaw>;
    async fn get_user_savings(&self, principal: &str) -> CanisterResult<Vec<SavingRaw>>;
    async fn top_up_saving(&self, saving_id: u64, principal: &str, amount: E8s) -> CanisterResult<SavingRaw>;
    async fn withdraw_saving(
        &self,
        saving_id: u64,
        principal: &str,
        amount: E8s,
        is_force: bool,
    ) -> CanisterResult<SavingRaw>;
    async fn stake_icp(&self, saving_id: u64, principal: &str, amount: E8s) -> CanisterResult<StakingInfo>;
    /// Returns the amount released from staking.
    async fn unstake_icp(&self, saving_id: u64, principal: &str) -> CanisterResult<E8s>;
    async fn get_staking_info(&self, saving_id: u64) -> CanisterResult<StakingInfo>;
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Default)]
struct Ledger {
    next_id: u64,
    savings: BTreeMap<u64, SavingRaw>,
    stakes: HashMap<u64, StakingInfo>,
}

/// Local stand-in for the savings canister, used for development and tests.
///
/// It tracks balances and staking flags only; fees, rewards and ledger
/// transfers are the real canister's business.
pub struct InMemorySavingsActor {
    ledger: Mutex<Ledger>,
    clock: Clock,
}

impl Default for InMemorySavingsActor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySavingsActor {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| datetime_to_ns(Utc::now())))
    }

    /// Uses `clock` (nanoseconds) for created/updated timestamps.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                next_id: 1,
                ..Ledger::default()
            }),
            clock,
        }
    }

    /// Inserts an existing record as-is.
    pub async fn seed(&self, saving: SavingRaw) {
        let mut ledger = self.ledger.lock().await;
        ledger.next_id = ledger.next_id.max(saving.id + 1);
        if saving.is_staking {
            ledger.stakes.insert(
                saving.id,
                StakingInfo {
                    saving_id: saving.id,
                    staked_amount: saving.current_amount,
                    staked_at: saving.updated_at,
                    is_staking: true,
                },
            );
        }
        ledger.savings.insert(saving.id, saving);
    }
}

fn owned_saving<'a>(
    ledger: &'a mut Ledger,
    saving_id: u64,
    principal: &str,
) -> CanisterResult<&'a mut SavingRaw> {
    match ledger.savings.get_mut(&saving_id) {
        Some(saving) if saving.principal_id == principal => Ok(saving),
        _ => Err(CanisterError::Rejected(format!("Saving {saving_id} not found"))),
    }
}

fn reject<T>(message: &str) -> CanisterResult<T> {
    Err(CanisterError::Rejected(message.to_string()))
}

#[async_trait]
impl SavingsActor for InMemorySavingsActor {
    async fn start_saving(&self, args: StartSavingArgs) -> CanisterResult<SavingRaw> {
        if args.saving_name.trim().is_empty() {
            return reject("Saving name is required");
        }
        if args.total_saving == E8s::ZERO {
            return reject("Total saving must be greater than 0");
        }
        let now = (self.clock)();
        if args.deadline <= now {
            return reject("Deadline must be in the future");
        }

        let mut ledger = self.ledger.lock().await;
        let id = ledger.next_id;
        ledger.next_id += 1;

        let saving = SavingRaw {
            id,
            saving_name: args.saving_name,
            status: SavingStatus::Active,
            is_staking: false,
            created_at: now,
            deadline: args.deadline,
            updated_at: now,
            priority_level: args.priority_level,
            current_amount: E8s::ZERO,
            amount: args.amount,
            total_saving: args.total_saving,
            principal_id: args.principal_id,
            savings_rate: args.savings_rate,
        };
        ledger.savings.insert(id, saving.clone());
        tracing::debug!(saving_id = id, "saving started");
        Ok(saving)
    }

    async fn get_user_savings(&self, principal: &str) -> CanisterResult<Vec<SavingRaw>> {
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .savings
            .values()
            .filter(|s| s.principal_id == principal)
            .cloned()
            .collect())
    }

    async fn top_up_saving(&self, saving_id: u64, principal: &str, amount: E8s) -> CanisterResult<SavingRaw> {
        if amount == E8s::ZERO {
            return reject("Amount must be greater than 0");
        }
        let now = (self.clock)();
        let mut ledger = self.ledger.lock().await;
        let saving = owned_saving(&mut ledger, saving_id, principal)?;
        if saving.status != SavingStatus::Active {
            return reject("Saving is not active");
        }
        saving.current_amount = saving.current_amount.saturating_add(amount);
        saving.updated_at = now;
        Ok(saving.clone())
    }

    async fn withdraw_saving(
        &self,
        saving_id: u64,
        principal: &str,
        amount: E8s,
        _is_force: bool,
    ) -> CanisterResult<SavingRaw> {
        if amount == E8s::ZERO {
            return reject("Amount must be greater than 0");
        }
        let now = (self.clock)();
        let mut ledger = self.ledger.lock().await;
        let saving = owned_saving(&mut ledger, saving_id, principal)?;
        if saving.is_staking {
            return reject("Funds are staked; unstake before withdrawing");
        }
        if amount > saving.current_amount {
            return reject("Insufficient balance");
        }
        saving.current_amount = saving.current_amount.saturating_sub(amount);
        saving.updated_at = now;
        Ok(saving.clone())
    }

    async fn stake_icp(&self, saving_id: u64, principal: &str, amount: E8s) -> CanisterResult<StakingInfo> {
        let now = (self.clock)();
        let mut ledger = self.ledger.lock().await;
        let saving = owned_saving(&mut ledger, saving_id, principal)?;
        if amount == E8s::ZERO || amount > saving.current_amount {
            return reject("Invalid staking amount");
        }
        saving.is_staking = true;
        saving.updated_at = now;
        let balance = saving.current_amount;

        let info = ledger.stakes.entry(saving_id).or_insert(StakingInfo {
            saving_id,
            staked_amount: E8s::ZERO,
            staked_at: now,
            is_staking: true,
        });
        info.staked_amount = info.staked_amount.saturating_add(amount).min(balance);
        info.is_staking = true;
        Ok(info.clone())
    }

    async fn unstake_icp(&self, saving_id: u64, principal: &str) -> CanisterResult<E8s> {
        let now = (self.clock)();
        let mut ledger = self.ledger.lock().await;
        let saving = owned_saving(&mut ledger, saving_id, principal)?;
        if !saving.is_staking {
            return reject("Saving is not staked");
        }
        saving.is_staking = false;
        saving.updated_at = now;
        let released = ledger
            .stakes
            .remove(&saving_id)
            .map(|info| info.staked_amount)
            .unwrap_or(E8s::ZERO);
        Ok(released)
    }

    async fn get_staking_info(&self, saving_id: u64) -> CanisterResult<StakingInfo> {
        let ledger = self.ledger.lock().await;
        if let Some(info) = ledger.stakes.get(&saving_id) {
            return Ok(info.clone());
        }
        if ledger.savings.contains_key(&saving_id) {
            return Ok(StakingInfo {
                saving_id,
                staked_amount: E8s::ZERO,
                staked_at: 0,
                is_staking: false,
            });
        }
        reject("Saving not found")
    }
}
