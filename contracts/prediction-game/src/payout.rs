//! Payout Calculator.
//!
//! Pure proportional-share arithmetic (side-effect free, verifiable).
//! Prize shares round down; commission rounds up. Integer division across
//! many claimants strands a small residual in the pool, so the final
//! unclaimed position in a bucket sweeps whatever remains undistributed into
//! its commission instead of leaving it behind.

/// Compute `(payout, commission)` for a winning claim.
///
/// * `total_pool`   - the round's full pooled stake.
/// * `winning_pool` - pooled stake on the winning side; must be > 0.
/// * `deposit`      - this prediction's accumulated deposit.
/// * `released`     - payout+commission already released from this round.
/// * `rate`         - commission rate in percent.
/// * `last_unclaimed` - true when this is the final unclaimed position in
///   the winning bucket.
pub fn win_payout(
    total_pool: i128,
    winning_pool: i128,
    deposit: i128,
    released: i128,
    rate: u32,
    last_unclaimed: bool,
) -> (i128, i128) {
    let prize = total_pool
        .checked_mul(deposit)
        .expect("prize overflow")
        .checked_div(winning_pool)
        .expect("empty winning pool");
    let rate = rate as i128;
    let commission = prize
        .checked_mul(rate)
        .expect("commission overflow")
        .checked_add(99)
        .expect("commission overflow")
        / 100;
    let payout = prize - commission;

    if last_unclaimed {
        // Sweep the bucket's rounding residual into the final commission so
        // nothing stays stranded in the pool.
        let remainder = total_pool - released;
        if remainder > prize {
            return (payout, remainder - payout);
        }
    }
    (payout, commission)
}

/// A no-contest claim refunds the full deposit, commission-free.
pub fn refund_payout(deposit: i128) -> (i128, i128) {
    (deposit, 0)
}
