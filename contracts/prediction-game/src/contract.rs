//! Recurring prediction game: round lifecycle, position ledger, oracle
//! resolution and pro-rata settlement with commission routing.

use soroban_sdk::{
    contract, contractclient, contractimpl, panic_with_error, token, xdr::ToXdr, Address, BytesN,
    Env, Symbol, Vec,
};

use crate::errors::GameError;
use crate::events::{
    CommissionRoutedEvent, DoubleClaimAttemptEvent, InitEvent, PredictionClaimedEvent,
    PredictionPlacedEvent, RoundArchivedEvent, RoundOpenedEvent, RoundResolvedEvent,
    TokenFlagClearedEvent, TokenFlaggedEvent, UnauthorizedFlagClearEvent,
};
use crate::oracle::{self, PricePoint};
use crate::payout;
use crate::types::{
    Bucket, Config, CountSplit, DataKey, Game, Outcome, Prediction, PredictionPage, Round,
    RoundPage, SideSplit,
};

const DAY_IN_LEDGERS: u32 = 17280;
const BUMP_THRESHOLD: u32 = DAY_IN_LEDGERS * 14;
const BUMP_AMOUNT: u32 = DAY_IN_LEDGERS * 30;

/// Hard cap on items returned per query page.
pub const PAGE_LIMIT: u32 = 20;

/// External registry of playable games.
#[contractclient(name = "GameRegistryClient")]
pub trait GameRegistry {
    fn get_game(env: Env, game_id: Symbol) -> Game;
}

/// External reward pool. Pulls an approved commission share from `payer`.
#[contractclient(name = "RewardPoolClient")]
pub trait RewardPool {
    fn collect_commission(env: Env, payer: Address, token: Address, amount: i128);
}

fn extend_persistent(env: &Env, key: &DataKey) {
    env.storage()
        .persistent()
        .extend_ttl(key, BUMP_THRESHOLD, BUMP_AMOUNT);
}

fn extend_instance(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(BUMP_THRESHOLD, BUMP_AMOUNT);
}

#[contract]
pub struct PredictionGameContract;

#[contractimpl]
impl PredictionGameContract {
    /// One-time setup. Re-invocation is a no-op so a crashed deploy script
    /// can be replayed safely.
    pub fn init(
        env: Env,
        registry: Address,
        staking_pool: Address,
        referral_pool: Address,
        backup: Address,
        operator: Address,
        commission_rate: u32,
    ) {
        if env.storage().instance().has(&DataKey::Config) {
            return;
        }
        assert!(commission_rate <= 100, "commission rate above 100%");
        let config = Config {
            registry: registry.clone(),
            staking_pool: staking_pool.clone(),
            referral_pool: referral_pool.clone(),
            backup: backup.clone(),
            operator: operator.clone(),
            commission_rate,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        extend_instance(&env);
        InitEvent {
            registry,
            staking_pool,
            referral_pool,
            backup,
            operator,
            commission_rate,
        }
        .publish(&env);
    }

    /// Deterministic id of the round covering the current ledger time for
    /// `game_id`, given the game's schedule length.
    pub fn round_id_for(env: Env, game_id: Symbol, interval_start: u64) -> BytesN<32> {
        Self::derive_round_id(&env, &game_id, interval_start)
    }

    /// Deterministic id of a bettor's position on one side of a round.
    pub fn prediction_id_for(
        env: Env,
        round_id: BytesN<32>,
        bettor: Address,
        outcome: Outcome,
    ) -> BytesN<32> {
        Self::derive_prediction_id(&env, &round_id, &bettor, outcome)
    }

    /// Place (or top up) a position on `outcome` in the round identified by
    /// `round_id`. The round is created on first placement; `round_id` must
    /// match the id the contract derives for the current interval, which
    /// pins the caller's intent to a specific round even across a ledger
    /// boundary.
    pub fn place(
        env: Env,
        bettor: Address,
        game_id: Symbol,
        round_id: BytesN<32>,
        outcome: Outcome,
        amount: i128,
    ) -> Result<BytesN<32>, GameError> {
        bettor.require_auth();

        let side = outcome.bucket()?;
        let config = Self::config(&env);
        let game = GameRegistryClient::new(&env, &config.registry).get_game(&game_id);
        if game.blocked {
            return Err(GameError::GameBlocked);
        }
        if amount <= 0 || amount < game.min_deposit {
            return Err(GameError::BelowMinimumDeposit);
        }
        if Self::is_token_flagged(env.clone(), game.token.clone()) {
            return Err(GameError::TokenSuspended);
        }

        let now = env.ledger().timestamp();
        assert!(game.schedule > 0, "zero schedule");
        let interval_start = now - now % game.schedule;
        if Self::derive_round_id(&env, &game_id, interval_start) != round_id {
            return Err(GameError::WrongRoundId);
        }

        let round = match Self::read_round(&env, &round_id) {
            Some(round) => round,
            None => Self::open_round(&env, &game_id, &game, &round_id, interval_start)?,
        };
        if now >= round.lock_date {
            return Err(GameError::PositioningClosed);
        }

        token::Client::new(&env, &round.token).transfer(
            &bettor,
            &env.current_contract_address(),
            &amount,
        );

        let prediction_id = Self::derive_prediction_id(&env, &round_id, &bettor, outcome);
        let prediction_key = DataKey::Prediction(prediction_id.clone());
        match env
            .storage()
            .persistent()
            .get::<DataKey, Prediction>(&prediction_key)
        {
            Some(mut prediction) => {
                // Top-up of an existing position on the same side.
                prediction.amount = prediction
                    .amount
                    .checked_add(amount)
                    .ok_or(GameError::Overflow)?;
                env.storage().persistent().set(&prediction_key, &prediction);
            }
            None => {
                let prediction = Prediction {
                    id: prediction_id.clone(),
                    round: round_id.clone(),
                    bettor: bettor.clone(),
                    outcome,
                    amount,
                    claimed: false,
                    payout: 0,
                    commission: 0,
                    created_at: now,
                };
                env.storage().persistent().set(&prediction_key, &prediction);
                Self::index_round_prediction(&env, &round_id, side, &prediction_id);
                Self::index_bettor_prediction(&env, &bettor, side, &prediction_id);
            }
        }
        extend_persistent(&env, &prediction_key);

        let pool_key = DataKey::RoundPool(round_id.clone());
        let mut pool = Self::get_round_pool(env.clone(), round_id.clone());
        pool.add_side(side, amount);
        env.storage().persistent().set(&pool_key, &pool);
        extend_persistent(&env, &pool_key);

        PredictionPlacedEvent {
            round_id,
            prediction_id: prediction_id.clone(),
            bettor,
            outcome,
            amount,
            pool_total: pool.total,
        }
        .publish(&env);
        Ok(prediction_id)
    }

    /// Resolve a round. Permissionless: the caller supplies the composite
    /// index of the exit price point and the contract verifies the evidence
    /// (or commits NoContest where no evidence is required).
    pub fn resolve(
        env: Env,
        round_id: BytesN<32>,
        exit_index: Option<u128>,
    ) -> Result<Outcome, GameError> {
        Self::resolve_round(&env, &round_id, exit_index)
    }

    /// Settle one position of a resolved round: pay the bettor, withhold and
    /// route commission, and archive the round when its last relevant
    /// position settles. Returns the payout (0 on soft failure when the
    /// pool balance cannot cover the disbursement).
    pub fn claim(
        env: Env,
        bettor: Address,
        round_id: BytesN<32>,
        prediction_id: BytesN<32>,
        token: Address,
    ) -> Result<i128, GameError> {
        bettor.require_auth();
        Self::enter_guard(&env)?;
        let result = Self::claim_inner(&env, &bettor, &round_id, &prediction_id, &token);
        Self::exit_guard(&env);
        result
    }

    /// Convenience path: resolve the round if still pending, then claim.
    pub fn withdraw(
        env: Env,
        bettor: Address,
        round_id: BytesN<32>,
        prediction_id: BytesN<32>,
        token: Address,
        exit_index: Option<u128>,
    ) -> Result<i128, GameError> {
        bettor.require_auth();
        Self::enter_guard(&env)?;
        let result = Self::withdraw_inner(&env, &bettor, &round_id, &prediction_id, &token, exit_index);
        Self::exit_guard(&env);
        result
    }

    /// Operator-only: lift a token's insolvency flag after the pool has been
    /// replenished. Unauthorized attempts are surfaced to monitoring.
    pub fn clear_token_flag(env: Env, caller: Address, token: Address) -> Result<(), GameError> {
        caller.require_auth();
        let config = Self::config(&env);
        if caller != config.operator {
            UnauthorizedFlagClearEvent {
                caller,
                token,
                timestamp: env.ledger().timestamp(),
            }
            .publish(&env);
            return Err(GameError::Unauthorized);
        }
        env.storage()
            .persistent()
            .remove(&DataKey::TokenFlagged(token.clone()));
        TokenFlagClearedEvent {
            operator: caller,
            token,
        }
        .publish(&env);
        Ok(())
    }

    // ============ Query surface ============

    pub fn get_round(env: Env, round_id: BytesN<32>) -> Option<Round> {
        Self::read_round(&env, &round_id)
    }

    pub fn get_prediction(env: Env, prediction_id: BytesN<32>) -> Option<Prediction> {
        let key = DataKey::Prediction(prediction_id);
        env.storage().persistent().get(&key)
    }

    pub fn get_round_pool(env: Env, round_id: BytesN<32>) -> SideSplit {
        env.storage()
            .persistent()
            .get(&DataKey::RoundPool(round_id))
            .unwrap_or_else(SideSplit::zero)
    }

    pub fn get_round_counts(env: Env, round_id: BytesN<32>) -> CountSplit {
        env.storage()
            .persistent()
            .get(&DataKey::RoundCounts(round_id))
            .unwrap_or_else(CountSplit::zero)
    }

    pub fn get_round_claimed_counts(env: Env, round_id: BytesN<32>) -> CountSplit {
        env.storage()
            .persistent()
            .get(&DataKey::RoundClaimedCounts(round_id))
            .unwrap_or_else(CountSplit::zero)
    }

    /// Cumulative payout+commission released from the round's pool so far.
    pub fn get_round_released(env: Env, round_id: BytesN<32>) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::RoundReleased(round_id))
            .unwrap_or(0)
    }

    pub fn is_token_flagged(env: Env, token: Address) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::TokenFlagged(token))
            .unwrap_or(false)
    }

    /// Lifetime claimed payout for a bettor in one token, optionally
    /// restricted to one side.
    pub fn get_bettor_totals(
        env: Env,
        bettor: Address,
        token: Address,
        outcome: Option<Outcome>,
    ) -> i128 {
        let bucket = match Self::filter_bucket(outcome) {
            Some(bucket) => bucket,
            None => return 0,
        };
        env.storage()
            .persistent()
            .get(&DataKey::BettorTotals(bettor, token, bucket))
            .unwrap_or(0)
    }

    /// Most-recent-first page of a round's positions, optionally filtered to
    /// one side. A filter that is not a playable side yields an empty page.
    pub fn get_round_predictions(
        env: Env,
        round_id: BytesN<32>,
        outcome: Option<Outcome>,
        page: u32,
    ) -> PredictionPage {
        let bucket = match Self::filter_bucket(outcome) {
            Some(bucket) => bucket,
            None => {
                return PredictionPage {
                    items: Vec::new(&env),
                    total: 0,
                }
            }
        };
        let counts = Self::get_round_counts(env.clone(), round_id.clone());
        let total = counts.get(bucket);
        let items = Self::collect_predictions(&env, total, page, |i| {
            DataKey::RoundPredictionIndex(round_id.clone(), bucket, i)
        });
        PredictionPage { items, total }
    }

    /// Most-recent-first page of a bettor's positions across all rounds,
    /// optionally filtered to one side.
    pub fn get_bettor_predictions(
        env: Env,
        bettor: Address,
        outcome: Option<Outcome>,
        page: u32,
    ) -> PredictionPage {
        let bucket = match Self::filter_bucket(outcome) {
            Some(bucket) => bucket,
            None => {
                return PredictionPage {
                    items: Vec::new(&env),
                    total: 0,
                }
            }
        };
        let counts: CountSplit = env
            .storage()
            .persistent()
            .get(&DataKey::BettorCounts(bettor.clone()))
            .unwrap_or_else(CountSplit::zero);
        let total = counts.get(bucket);
        let items = Self::collect_predictions(&env, total, page, |i| {
            DataKey::BettorPredictionIndex(bettor.clone(), bucket, i)
        });
        PredictionPage { items, total }
    }

    /// Most-recent-first page of a game's rounds.
    pub fn get_game_rounds(env: Env, game_id: Symbol, page: u32) -> RoundPage {
        let total: u32 = env
            .storage()
            .persistent()
            .get(&DataKey::GameRoundCount(game_id.clone()))
            .unwrap_or(0);
        let mut items = Vec::new(&env);
        let offset = page.saturating_mul(PAGE_LIMIT);
        let mut cursor = total.saturating_sub(offset);
        while cursor > 0 && items.len() < PAGE_LIMIT {
            cursor -= 1;
            let id: Option<BytesN<32>> = env
                .storage()
                .persistent()
                .get(&DataKey::GameRoundIndex(game_id.clone(), cursor));
            if let Some(round) = id.and_then(|id| Self::read_round(&env, &id)) {
                items.push_back(round);
            }
        }
        RoundPage { items, total }
    }

    pub fn get_config(env: Env) -> Config {
        Self::config(&env)
    }

    // ============ Round lifecycle ============

    fn open_round(
        env: &Env,
        game_id: &Symbol,
        game: &Game,
        round_id: &BytesN<32>,
        interval_start: u64,
    ) -> Result<Round, GameError> {
        let lock_date = interval_start + game.positioning;
        let end_date = interval_start + game.schedule;

        // The entry price anchors every later settlement; only a fresh point
        // observed inside this round's positioning window qualifies.
        let entry = oracle::latest(env, &game.pricefeed)
            .filter(|p| p.timestamp >= interval_start && p.timestamp < lock_date)
            .ok_or(GameError::InvalidEntryPrice)?;

        let round = Round {
            id: round_id.clone(),
            game: game_id.clone(),
            outcome: Outcome::Undefined,
            entry_price: entry.clone(),
            has_exit_price: false,
            exit_price: PricePoint::zero(),
            start_date: interval_start,
            lock_date,
            end_date,
            expiration_date: end_date + game.expiration,
            token: game.token.clone(),
            price_source: game.pricefeed.clone(),
            resolved: false,
            resolved_at: 0,
            archived: false,
            archived_at: 0,
        };
        Self::write_round(env, &round);

        let count_key = DataKey::GameRoundCount(game_id.clone());
        let count: u32 = env.storage().persistent().get(&count_key).unwrap_or(0);
        let index_key = DataKey::GameRoundIndex(game_id.clone(), count);
        env.storage().persistent().set(&index_key, round_id);
        extend_persistent(env, &index_key);
        env.storage().persistent().set(&count_key, &(count + 1));
        extend_persistent(env, &count_key);

        RoundOpenedEvent {
            round_id: round_id.clone(),
            game: game_id.clone(),
            interval_start,
            lock_date,
            end_date,
            entry_value: entry.value,
        }
        .publish(env);
        Ok(round)
    }

    fn resolve_round(
        env: &Env,
        round_id: &BytesN<32>,
        exit_index: Option<u128>,
    ) -> Result<Outcome, GameError> {
        let mut round = Self::read_round(env, round_id).ok_or(GameError::RoundNotFound)?;
        if round.resolved {
            return Err(GameError::AlreadyResolved);
        }
        let pool = Self::get_round_pool(env.clone(), round_id.clone());
        let now = env.ledger().timestamp();

        // A round the whole pool sits on one side of can never pay out; it
        // settles NoContest, but not before positioning has closed (a
        // contesting side may still show up).
        let one_sided = pool.total > 0
            && (pool.down == pool.total || pool.up == pool.total || pool.flat == pool.total);
        if one_sided {
            if now < round.lock_date {
                return Err(GameError::ResolveDuringPositioning);
            }
            return Ok(Self::commit_outcome(env, &mut round, Outcome::NoContest, None));
        }

        if now < round.end_date {
            return Err(GameError::RoundNotEnded);
        }
        if now > round.expiration_date {
            return Ok(Self::commit_outcome(env, &mut round, Outcome::NoContest, None));
        }

        let config = Self::config(env);
        if Self::is_token_flagged(env.clone(), round.token.clone()) {
            return Ok(Self::commit_outcome(env, &mut round, Outcome::NoContest, None));
        }
        let game = GameRegistryClient::new(env, &config.registry).get_game(&round.game);
        if game.blocked {
            return Ok(Self::commit_outcome(env, &mut round, Outcome::NoContest, None));
        }

        let index = exit_index.ok_or(GameError::InvalidResolution)?;
        let exit = oracle::at(env, &round.price_source, index).ok_or(GameError::InvalidResolution)?;
        let (phase, sequence) = oracle::split_index(index);
        let control_index = oracle::join_index(
            phase,
            sequence.checked_add(1).ok_or(GameError::InvalidResolution)?,
        );
        let control =
            oracle::at(env, &round.price_source, control_index).ok_or(GameError::InvalidResolution)?;
        let entry = round.entry_price.clone();

        // The exit must be the last point inside the round: observed in
        // [lock, end), strictly after entry, in the same feed phase, and
        // immediately followed by a control point at or past the round end.
        // Both the exit and entry must sit within 100% of their comparison
        // base, a coarse shield against corrupt feed values.
        let valid = exit.timestamp >= round.lock_date
            && exit.timestamp < round.end_date
            && exit.timestamp > entry.timestamp
            && control.timestamp >= round.end_date
            && entry.phase() == phase
            && control.phase() == phase
            && entry.sequence() < sequence
            && oracle::price_gap_pct(exit.value, control.value) <= 100
            && oracle::price_gap_pct(exit.value, entry.value) <= 100;
        if !valid {
            return Err(GameError::InvalidResolution);
        }

        let side = if exit.value < entry.value {
            Outcome::Down
        } else if exit.value > entry.value {
            Outcome::Up
        } else {
            Outcome::Flat
        };
        let winning = pool.get(side.bucket()?);
        let outcome = if winning == 0 || winning == pool.total {
            // Nobody (or everybody) picked the winner: nothing to contest.
            Outcome::NoContest
        } else {
            side
        };
        Ok(Self::commit_outcome(env, &mut round, outcome, Some(exit)))
    }

    fn commit_outcome(
        env: &Env,
        round: &mut Round,
        outcome: Outcome,
        exit: Option<PricePoint>,
    ) -> Outcome {
        round.outcome = outcome;
        round.resolved = true;
        round.resolved_at = env.ledger().timestamp();
        let exit_value = exit.as_ref().map_or(0, |p| p.value);
        round.has_exit_price = exit.is_some();
        round.exit_price = exit.unwrap_or_else(PricePoint::zero);
        Self::write_round(env, round);
        RoundResolvedEvent {
            round_id: round.id.clone(),
            outcome,
            exit_value,
            timestamp: round.resolved_at,
        }
        .publish(env);
        outcome
    }

    // ============ Settlement ============

    fn withdraw_inner(
        env: &Env,
        bettor: &Address,
        round_id: &BytesN<32>,
        prediction_id: &BytesN<32>,
        token: &Address,
        exit_index: Option<u128>,
    ) -> Result<i128, GameError> {
        let round = Self::read_round(env, round_id).ok_or(GameError::RoundNotFound)?;
        if !round.resolved {
            Self::resolve_round(env, round_id, exit_index)?;
        }
        Self::claim_inner(env, bettor, round_id, prediction_id, token)
    }

    fn claim_inner(
        env: &Env,
        bettor: &Address,
        round_id: &BytesN<32>,
        prediction_id: &BytesN<32>,
        token: &Address,
    ) -> Result<i128, GameError> {
        let mut round = Self::read_round(env, round_id).ok_or(GameError::RoundNotFound)?;
        if *token != round.token {
            return Err(GameError::WrongToken);
        }
        let prediction_key = DataKey::Prediction(prediction_id.clone());
        let mut prediction: Prediction = env
            .storage()
            .persistent()
            .get(&prediction_key)
            .ok_or(GameError::PredictionNotFound)?;
        if prediction.round != *round_id
            || !env
                .storage()
                .persistent()
                .has(&DataKey::RoundMember(round_id.clone(), prediction_id.clone()))
        {
            return Err(GameError::PredictionMismatch);
        }
        if prediction.bettor != *bettor {
            return Err(GameError::NotYourPrediction);
        }
        if prediction.claimed
            || env
                .storage()
                .persistent()
                .has(&DataKey::ClaimedMember(round_id.clone(), prediction_id.clone()))
        {
            DoubleClaimAttemptEvent {
                round_id: round_id.clone(),
                prediction_id: prediction_id.clone(),
                bettor: bettor.clone(),
                timestamp: env.ledger().timestamp(),
            }
            .publish(env);
            return Err(GameError::AlreadyClaimed);
        }
        if !round.resolved {
            return Err(GameError::RoundNotResolved);
        }
        if round.outcome != Outcome::NoContest && round.outcome != prediction.outcome {
            return Err(GameError::LosingClaim);
        }

        let config = Self::config(env);
        let pool = Self::get_round_pool(env.clone(), round_id.clone());
        let counts = Self::get_round_counts(env.clone(), round_id.clone());
        let mut claimed_counts = Self::get_round_claimed_counts(env.clone(), round_id.clone());
        let released = Self::get_round_released(env.clone(), round_id.clone());

        let (payout, commission) = if round.outcome == Outcome::NoContest {
            payout::refund_payout(prediction.amount)
        } else {
            let bucket = round.outcome.bucket()?;
            let last_unclaimed = counts.get(bucket) - claimed_counts.get(bucket) == 1;
            payout::win_payout(
                pool.total,
                pool.get(bucket),
                prediction.amount,
                released,
                config.commission_rate,
                last_unclaimed,
            )
        };
        let due = payout.checked_add(commission).ok_or(GameError::Overflow)?;

        // Insufficiency is a soft failure: flag the token and return without
        // committing claim state, so the position stays claimable once the
        // operator replenishes and clears the flag.
        let token_client = token::Client::new(env, &round.token);
        let available = token_client.balance(&env.current_contract_address());
        if available < due {
            let flag_key = DataKey::TokenFlagged(round.token.clone());
            env.storage().persistent().set(&flag_key, &true);
            extend_persistent(env, &flag_key);
            TokenFlaggedEvent {
                token: round.token.clone(),
                required: due,
                available,
                timestamp: env.ledger().timestamp(),
            }
            .publish(env);
            return Ok(0);
        }

        // Commit every piece of claim state before any outbound transfer.
        prediction.claimed = true;
        prediction.payout = payout;
        prediction.commission = commission;
        env.storage().persistent().set(&prediction_key, &prediction);
        extend_persistent(env, &prediction_key);

        let member_key = DataKey::ClaimedMember(round_id.clone(), prediction_id.clone());
        env.storage().persistent().set(&member_key, &true);
        extend_persistent(env, &member_key);

        let side = prediction.outcome.bucket()?;
        let total_key = DataKey::RoundClaimedIndex(round_id.clone(), Bucket::Total, claimed_counts.total);
        env.storage().persistent().set(&total_key, prediction_id);
        extend_persistent(env, &total_key);
        let side_key =
            DataKey::RoundClaimedIndex(round_id.clone(), side, claimed_counts.get(side));
        env.storage().persistent().set(&side_key, prediction_id);
        extend_persistent(env, &side_key);
        claimed_counts.bump_side(side);
        let counts_key = DataKey::RoundClaimedCounts(round_id.clone());
        env.storage().persistent().set(&counts_key, &claimed_counts);
        extend_persistent(env, &counts_key);

        Self::accrue_bettor_total(env, bettor, &round.token, Bucket::Total, payout);
        Self::accrue_bettor_total(env, bettor, &round.token, side, payout);

        let new_released = released.checked_add(due).ok_or(GameError::Overflow)?;
        if new_released > pool.total {
            panic_with_error!(env, GameError::ReleasedExceedsPool);
        }
        let released_key = DataKey::RoundReleased(round_id.clone());
        env.storage().persistent().set(&released_key, &new_released);
        extend_persistent(env, &released_key);

        // The round closes once every position that can still claim has: all
        // positions on a NoContest round, the winning side otherwise.
        let closing_bucket = if round.outcome == Outcome::NoContest {
            Bucket::Total
        } else {
            round.outcome.bucket()?
        };
        if !round.archived && claimed_counts.get(closing_bucket) == counts.get(closing_bucket) {
            round.archived = true;
            round.archived_at = env.ledger().timestamp();
            Self::write_round(env, &round);
            RoundArchivedEvent {
                round_id: round_id.clone(),
                timestamp: round.archived_at,
            }
            .publish(env);
        }

        if payout > 0 {
            token_client.transfer(&env.current_contract_address(), bettor, &payout);
        }
        if commission > 0 {
            Self::route_commission(env, &config, &round, commission);
        }
        PredictionClaimedEvent {
            round_id: round_id.clone(),
            prediction_id: prediction_id.clone(),
            bettor: bettor.clone(),
            payout,
            commission,
        }
        .publish(env);
        Ok(payout)
    }

    /// Split the commission between the staking and referral pools. The odd
    /// unit of an uneven split lands with the staking pool.
    fn route_commission(env: &Env, config: &Config, round: &Round, commission: i128) {
        let referral_share = commission / 2;
        let staking_share = commission - referral_share;
        Self::route_share(env, config, round, &config.staking_pool, staking_share);
        Self::route_share(env, config, round, &config.referral_pool, referral_share);
    }

    fn route_share(env: &Env, config: &Config, round: &Round, pool: &Address, share: i128) {
        if share == 0 {
            return;
        }
        let this = env.current_contract_address();
        let token_client = token::Client::new(env, &round.token);
        let expiry = env.ledger().sequence() + BUMP_AMOUNT;
        token_client.approve(&this, pool, &share, &expiry);
        let delivered = RewardPoolClient::new(env, pool)
            .try_collect_commission(&this, &round.token, &share)
            .is_ok();
        if !delivered {
            // Revoke the stale allowance so a pool that recovers later
            // cannot still pull the share on top of the fallback transfer.
            token_client.approve(&this, pool, &0, &expiry);
            token_client.transfer(&this, &config.backup, &share);
        }
        CommissionRoutedEvent {
            round_id: round.id.clone(),
            destination: if delivered {
                pool.clone()
            } else {
                config.backup.clone()
            },
            token: round.token.clone(),
            amount: share,
            fallback: !delivered,
        }
        .publish(env);
    }

    // ============ Pure helpers and storage plumbing ============

    fn config(env: &Env) -> Config {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .expect("not initialized")
    }

    fn derive_round_id(env: &Env, game_id: &Symbol, interval_start: u64) -> BytesN<32> {
        let payload = (game_id.clone(), interval_start).to_xdr(env);
        env.crypto().keccak256(&payload).into()
    }

    fn derive_prediction_id(
        env: &Env,
        round_id: &BytesN<32>,
        bettor: &Address,
        outcome: Outcome,
    ) -> BytesN<32> {
        let payload = (round_id.clone(), bettor.clone(), outcome).to_xdr(env);
        env.crypto().keccak256(&payload).into()
    }

    fn filter_bucket(outcome: Option<Outcome>) -> Option<Bucket> {
        match outcome {
            None => Some(Bucket::Total),
            Some(outcome) => outcome.bucket().ok(),
        }
    }

    fn read_round(env: &Env, round_id: &BytesN<32>) -> Option<Round> {
        env.storage()
            .persistent()
            .get(&DataKey::Round(round_id.clone()))
    }

    fn write_round(env: &Env, round: &Round) {
        let key = DataKey::Round(round.id.clone());
        env.storage().persistent().set(&key, round);
        extend_persistent(env, &key);
    }

    fn index_round_prediction(
        env: &Env,
        round_id: &BytesN<32>,
        side: Bucket,
        prediction_id: &BytesN<32>,
    ) {
        let counts_key = DataKey::RoundCounts(round_id.clone());
        let mut counts: CountSplit = env
            .storage()
            .persistent()
            .get(&counts_key)
            .unwrap_or_else(CountSplit::zero);
        let total_key = DataKey::RoundPredictionIndex(round_id.clone(), Bucket::Total, counts.total);
        env.storage().persistent().set(&total_key, prediction_id);
        extend_persistent(env, &total_key);
        let side_key = DataKey::RoundPredictionIndex(round_id.clone(), side, counts.get(side));
        env.storage().persistent().set(&side_key, prediction_id);
        extend_persistent(env, &side_key);
        counts.bump_side(side);
        env.storage().persistent().set(&counts_key, &counts);
        extend_persistent(env, &counts_key);

        let member_key = DataKey::RoundMember(round_id.clone(), prediction_id.clone());
        env.storage().persistent().set(&member_key, &true);
        extend_persistent(env, &member_key);
    }

    fn index_bettor_prediction(env: &Env, bettor: &Address, side: Bucket, prediction_id: &BytesN<32>) {
        let counts_key = DataKey::BettorCounts(bettor.clone());
        let mut counts: CountSplit = env
            .storage()
            .persistent()
            .get(&counts_key)
            .unwrap_or_else(CountSplit::zero);
        let total_key = DataKey::BettorPredictionIndex(bettor.clone(), Bucket::Total, counts.total);
        env.storage().persistent().set(&total_key, prediction_id);
        extend_persistent(env, &total_key);
        let side_key = DataKey::BettorPredictionIndex(bettor.clone(), side, counts.get(side));
        env.storage().persistent().set(&side_key, prediction_id);
        extend_persistent(env, &side_key);
        counts.bump_side(side);
        env.storage().persistent().set(&counts_key, &counts);
        extend_persistent(env, &counts_key);
    }

    fn accrue_bettor_total(env: &Env, bettor: &Address, token: &Address, bucket: Bucket, amount: i128) {
        if amount == 0 {
            return;
        }
        let key = DataKey::BettorTotals(bettor.clone(), token.clone(), bucket);
        let current: i128 = env.storage().persistent().get(&key).unwrap_or(0);
        let updated = current.checked_add(amount).expect("total overflow");
        env.storage().persistent().set(&key, &updated);
        extend_persistent(env, &key);
    }

    /// Walk an index backwards from the newest entry, skipping `page` full
    /// pages, and collect up to one page of predictions.
    fn collect_predictions<F>(env: &Env, total: u32, page: u32, key_at: F) -> Vec<Prediction>
    where
        F: Fn(u32) -> DataKey,
    {
        let mut items = Vec::new(env);
        let offset = page.saturating_mul(PAGE_LIMIT);
        let mut cursor = total.saturating_sub(offset);
        while cursor > 0 && items.len() < PAGE_LIMIT {
            cursor -= 1;
            let id: Option<BytesN<32>> = env.storage().persistent().get(&key_at(cursor));
            if let Some(prediction) = id.and_then(|id| {
                env.storage()
                    .persistent()
                    .get::<DataKey, Prediction>(&DataKey::Prediction(id))
            }) {
                items.push_back(prediction);
            }
        }
        items
    }

    // ============ Re-entrancy guard ============

    fn enter_guard(env: &Env) -> Result<(), GameError> {
        if env
            .storage()
            .instance()
            .get(&DataKey::ReentrancyGuard)
            .unwrap_or(false)
        {
            return Err(GameError::ReentrantCall);
        }
        env.storage().instance().set(&DataKey::ReentrancyGuard, &true);
        Ok(())
    }

    fn exit_guard(env: &Env) {
        env.storage().instance().set(&DataKey::ReentrancyGuard, &false);
    }
}
