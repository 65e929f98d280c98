//! Data model for the recurring prediction game.

use soroban_sdk::{contracttype, Address, BytesN, Symbol, Vec};

use crate::errors::GameError;
use crate::oracle::PricePoint;

/// Round outcome. `Undefined` until resolution; once `resolved` is set the
/// outcome never changes again.
#[contracttype]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Outcome {
    Undefined = 0,
    Down = 1,
    Up = 2,
    Flat = 3,
    NoContest = 4,
}

impl Outcome {
    /// The aggregate bucket a side outcome maps to. Only the three playable
    /// sides have a bucket.
    pub fn bucket(self) -> Result<Bucket, GameError> {
        match self {
            Outcome::Down => Ok(Bucket::Down),
            Outcome::Up => Ok(Bucket::Up),
            Outcome::Flat => Ok(Bucket::Flat),
            _ => Err(GameError::InvalidSide),
        }
    }
}

/// Aggregate bucket selector: the round-wide total plus one bucket per side.
#[contracttype]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Bucket {
    Total = 0,
    Down = 1,
    Up = 2,
    Flat = 3,
}

/// Pooled amounts split by outcome bucket. `total` always equals
/// `down + up + flat`.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct SideSplit {
    pub total: i128,
    pub down: i128,
    pub up: i128,
    pub flat: i128,
}

impl SideSplit {
    pub fn zero() -> Self {
        SideSplit {
            total: 0,
            down: 0,
            up: 0,
            flat: 0,
        }
    }

    pub fn get(&self, bucket: Bucket) -> i128 {
        match bucket {
            Bucket::Total => self.total,
            Bucket::Down => self.down,
            Bucket::Up => self.up,
            Bucket::Flat => self.flat,
        }
    }

    /// Add `amount` to one side bucket and to the round-wide total.
    pub fn add_side(&mut self, side: Bucket, amount: i128) {
        self.total = self.total.checked_add(amount).expect("pool overflow");
        match side {
            Bucket::Down => self.down += amount,
            Bucket::Up => self.up += amount,
            Bucket::Flat => self.flat += amount,
            Bucket::Total => (),
        }
    }
}

/// Position counters split by outcome bucket, same shape as [`SideSplit`].
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct CountSplit {
    pub total: u32,
    pub down: u32,
    pub up: u32,
    pub flat: u32,
}

impl CountSplit {
    pub fn zero() -> Self {
        CountSplit {
            total: 0,
            down: 0,
            up: 0,
            flat: 0,
        }
    }

    pub fn get(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Total => self.total,
            Bucket::Down => self.down,
            Bucket::Up => self.up,
            Bucket::Flat => self.flat,
        }
    }

    /// Bump one side bucket and the round-wide total by one.
    pub fn bump_side(&mut self, side: Bucket) {
        self.total += 1;
        match side {
            Bucket::Down => self.down += 1,
            Bucket::Up => self.up += 1,
            Bucket::Flat => self.flat += 1,
            Bucket::Total => (),
        }
    }
}

/// One instance of a recurring prediction contest, spanning a fixed schedule
/// interval. Created lazily by the first position placed after the interval
/// opens; mutated only by resolution and archival; never deleted.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    /// keccak256(game, interval_start) — deterministic, caller-computable.
    pub id: BytesN<32>,
    pub game: Symbol,
    pub outcome: Outcome,
    pub entry_price: PricePoint,
    /// Set only when resolution consumed price evidence; NoContest rounds
    /// resolved without evidence keep the zeroed point.
    pub has_exit_price: bool,
    pub exit_price: PricePoint,
    pub start_date: u64,
    /// Positioning closes here; no new deposits at or after this timestamp.
    pub lock_date: u64,
    pub end_date: u64,
    /// Settlement timeout: past this boundary anyone may resolve NoContest.
    pub expiration_date: u64,
    pub token: Address,
    pub price_source: Address,
    pub resolved: bool,
    pub resolved_at: u64,
    pub archived: bool,
    pub archived_at: u64,
}

/// A bettor's accumulated deposit on one side of one round. At most one per
/// (round, bettor, outcome) triple; a bettor may hold up to three per round.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// keccak256(round, bettor, outcome).
    pub id: BytesN<32>,
    pub round: BytesN<32>,
    pub bettor: Address,
    pub outcome: Outcome,
    pub amount: i128,
    pub claimed: bool,
    pub payout: i128,
    pub commission: i128,
    pub created_at: u64,
}

/// Game configuration supplied by the external registry.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct Game {
    pub pricefeed: Address,
    pub token: Address,
    /// Interval length in seconds; rounds are aligned to multiples of it.
    pub schedule: u64,
    /// Positioning window length in seconds, measured from interval start.
    pub positioning: u64,
    /// Settlement window length in seconds, measured from interval end.
    pub expiration: u64,
    pub min_deposit: i128,
    pub blocked: bool,
}

#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub registry: Address,
    pub staking_pool: Address,
    pub referral_pool: Address,
    /// Direct-transfer fallback for commission when a reward pool call fails.
    pub backup: Address,
    pub operator: Address,
    /// Commission withheld from a winner's prize, in percent.
    pub commission_rate: u32,
}

/// One page of predictions plus the total count behind the filter.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionPage {
    pub items: Vec<Prediction>,
    pub total: u32,
}

/// One page of a game's rounds plus the total round count.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct RoundPage {
    pub items: Vec<Round>,
    pub total: u32,
}

/// Storage keys for contract data.
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    ReentrancyGuard,
    Round(BytesN<32>),
    /// Pooled amounts per bucket for a round.
    RoundPool(BytesN<32>),
    /// Position counts per bucket for a round.
    RoundCounts(BytesN<32>),
    /// Claimed-position counts per bucket for a round.
    RoundClaimedCounts(BytesN<32>),
    /// Cumulative payout+commission released from a round's pool.
    RoundReleased(BytesN<32>),
    /// (round, bucket, i) -> prediction id, appended in placement order.
    RoundPredictionIndex(BytesN<32>, Bucket, u32),
    /// (round, bucket, i) -> prediction id, appended in claim order.
    RoundClaimedIndex(BytesN<32>, Bucket, u32),
    /// Membership flag: prediction is indexed under this round.
    RoundMember(BytesN<32>, BytesN<32>),
    /// Secondary claimed flag, guarding against any path that could
    /// otherwise double-mark.
    ClaimedMember(BytesN<32>, BytesN<32>),
    Prediction(BytesN<32>),
    /// Prediction counts per bucket for a bettor, across all rounds.
    BettorCounts(Address),
    /// (bettor, bucket, i) -> prediction id.
    BettorPredictionIndex(Address, Bucket, u32),
    /// (bettor, token, bucket) -> lifetime claimed payout.
    BettorTotals(Address, Address, Bucket),
    GameRoundCount(Symbol),
    GameRoundIndex(Symbol, u32),
    /// Per-token insolvency circuit breaker. Set on detected pool
    /// insufficiency; cleared only by the operator.
    TokenFlagged(Address),
}
