use soroban_sdk::contracterror;

/// Contract error codes, grouped by failure family:
/// 1x auth, 2x lookup/state, 3x placement, 4x resolution, 5x-6x claim,
/// 7x invariants. Codes are stable; do not renumber.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GameError {
    Unauthorized = 10,

    RoundNotFound = 20,
    PredictionNotFound = 21,
    RoundNotResolved = 22,
    AlreadyResolved = 23,
    WrongRoundId = 24,
    PredictionMismatch = 25,

    PositioningClosed = 30,
    BelowMinimumDeposit = 31,
    InvalidSide = 32,
    TokenSuspended = 33,
    GameBlocked = 34,
    InvalidEntryPrice = 35,

    ResolveDuringPositioning = 40,
    RoundNotEnded = 41,
    InvalidResolution = 42,

    WrongToken = 50,
    NotYourPrediction = 51,
    LosingClaim = 52,
    AlreadyClaimed = 60,

    /// Released amount would exceed the round's pooled total. Must never
    /// trigger under correct arithmetic; exists purely as a guard.
    ReleasedExceedsPool = 70,
    ReentrantCall = 71,
    Overflow = 72,
}
