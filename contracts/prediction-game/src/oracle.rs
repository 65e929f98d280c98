//! Price Evidence Adapter.
//!
//! Wraps an external price feed contract. Every fetch is made through the
//! generated `try_` client so that a failing or misbehaving feed degrades to
//! "no valid point" instead of aborting the caller. A point is only accepted
//! when the feed's own index bookkeeping is self-consistent, which guards
//! against stale "answered in an earlier round" data.

use soroban_sdk::{contractclient, contracttype, Address, Env};

/// Composite price index layout: an 80-bit space where the phase occupies
/// bits 64..80 and the in-phase sequence number bits 0..64.
const PHASE_SHIFT: u32 = 64;
const SEQUENCE_MASK: u128 = (1u128 << PHASE_SHIFT) - 1;

/// Wire shape returned by the external price feed.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct PriceData {
    pub index: u128,
    pub value: i128,
    pub updated_at: u64,
    /// Composite index of the feed round this answer was computed in. Must
    /// equal `index` for the point to be trustworthy.
    pub answered_in: u128,
}

/// A validated, stored price observation.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct PricePoint {
    pub index: u128,
    pub value: i128,
    pub timestamp: u64,
}

impl PricePoint {
    /// The all-zero (invalid) point, used where no evidence was recorded.
    pub fn zero() -> Self {
        PricePoint {
            index: 0,
            value: 0,
            timestamp: 0,
        }
    }

    /// All fields must avoid their sentinel minimum/maximum values and the
    /// value must be strictly positive.
    pub fn is_valid(&self) -> bool {
        self.value > 0
            && self.value != i128::MAX
            && self.timestamp != 0
            && self.timestamp != u64::MAX
            && self.index != 0
            && self.index != u128::MAX
    }

    pub fn phase(&self) -> u16 {
        split_index(self.index).0
    }

    pub fn sequence(&self) -> u64 {
        split_index(self.index).1
    }
}

pub fn split_index(index: u128) -> (u16, u64) {
    ((index >> PHASE_SHIFT) as u16, (index & SEQUENCE_MASK) as u64)
}

pub fn join_index(phase: u16, sequence: u64) -> u128 {
    ((phase as u128) << PHASE_SHIFT) | sequence as u128
}

/// External price feed interface.
#[contractclient(name = "PriceFeedClient")]
pub trait PriceFeed {
    fn latest(env: Env) -> PriceData;
    fn at(env: Env, index: u128) -> PriceData;
}

/// Fetch the most recent point. `None` if the call fails, the point carries
/// sentinel fields, or the feed answered in an earlier round than it reports.
pub fn latest(env: &Env, source: &Address) -> Option<PricePoint> {
    let client = PriceFeedClient::new(env, source);
    match client.try_latest() {
        Ok(Ok(data)) if data.answered_in == data.index => accept(data),
        _ => None,
    }
}

/// Fetch the point at a specific composite index. `None` unless the feed
/// echoes the requested index in both its index and answered-in fields.
pub fn at(env: &Env, source: &Address, index: u128) -> Option<PricePoint> {
    let client = PriceFeedClient::new(env, source);
    match client.try_at(&index) {
        Ok(Ok(data)) if data.index == index && data.answered_in == index => accept(data),
        _ => None,
    }
}

fn accept(data: PriceData) -> Option<PricePoint> {
    let point = PricePoint {
        index: data.index,
        value: data.value,
        timestamp: data.updated_at,
    };
    if point.is_valid() {
        Some(point)
    } else {
        None
    }
}

/// Percentage gap between two strictly positive prices, relative to `base`.
/// Used as a coarse sanity bound against stale or erroneous feed data.
pub fn price_gap_pct(value: i128, base: i128) -> i128 {
    let diff = if value >= base {
        value - base
    } else {
        base - value
    };
    diff.checked_mul(100).expect("gap overflow") / base
}
