use soroban_sdk::{contractevent, Address, BytesN, Symbol};

use crate::types::Outcome;

#[contractevent(topics = ["init"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitEvent {
    pub registry: Address,
    pub staking_pool: Address,
    pub referral_pool: Address,
    pub backup: Address,
    pub operator: Address,
    pub commission_rate: u32,
}

#[contractevent(topics = ["round_opened"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundOpenedEvent {
    pub round_id: BytesN<32>,
    pub game: Symbol,
    pub interval_start: u64,
    pub lock_date: u64,
    pub end_date: u64,
    pub entry_value: i128,
}

#[contractevent(topics = ["prediction_placed"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PredictionPlacedEvent {
    pub round_id: BytesN<32>,
    pub prediction_id: BytesN<32>,
    pub bettor: Address,
    pub outcome: Outcome,
    pub amount: i128,
    pub pool_total: i128,
}

#[contractevent(topics = ["round_resolved"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundResolvedEvent {
    pub round_id: BytesN<32>,
    pub outcome: Outcome,
    /// Exit price value, or 0 when the round resolved without evidence.
    pub exit_value: i128,
    pub timestamp: u64,
}

#[contractevent(topics = ["prediction_claimed"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PredictionClaimedEvent {
    pub round_id: BytesN<32>,
    pub prediction_id: BytesN<32>,
    pub bettor: Address,
    pub payout: i128,
    pub commission: i128,
}

#[contractevent(topics = ["round_archived"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundArchivedEvent {
    pub round_id: BytesN<32>,
    pub timestamp: u64,
}

/// 🟢 INFO — emitted once per commission leg so monitors can reconcile which
/// distribution path ran. `fallback = true` means the reward pool call failed
/// and the share went to the backup account instead.
#[contractevent(topics = ["commission_routed"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommissionRoutedEvent {
    pub round_id: BytesN<32>,
    pub destination: Address,
    pub token: Address,
    pub amount: i128,
    pub fallback: bool,
}

/// 🔴 HIGH ALERT — the contract balance could not cover a due disbursement.
/// The token is suspended for new placements and future resolutions of its
/// rounds degrade to NoContest until the operator clears the flag.
#[contractevent(topics = ["token_flagged"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenFlaggedEvent {
    pub token: Address,
    pub required: i128,
    pub available: i128,
    pub timestamp: u64,
}

#[contractevent(topics = ["token_flag_cleared"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenFlagClearedEvent {
    pub operator: Address,
    pub token: Address,
}

/// 🔴 HIGH ALERT — a claim was attempted on an already-claimed prediction.
/// Repeated attempts may indicate a re-entrancy probe or a front-end bug.
#[contractevent(topics = ["double_claim_attempt"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DoubleClaimAttemptEvent {
    pub round_id: BytesN<32>,
    pub prediction_id: BytesN<32>,
    pub bettor: Address,
    pub timestamp: u64,
}

/// 🔴 HIGH ALERT — `clear_token_flag` was called by an address that is not
/// the configured operator.
#[contractevent(topics = ["unauthorized_flag_clear"])]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnauthorizedFlagClearEvent {
    pub caller: Address,
    pub token: Address,
    pub timestamp: u64,
}
