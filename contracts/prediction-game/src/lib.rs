#![no_std]

mod contract;
mod errors;
mod events;
mod oracle;
mod payout;
mod types;

pub use contract::{
    GameRegistry, GameRegistryClient, PredictionGameContract, PredictionGameContractClient,
    RewardPool, RewardPoolClient, PAGE_LIMIT,
};
pub use errors::GameError;
pub use oracle::{join_index, split_index, PriceData, PriceFeed, PriceFeedClient, PricePoint};
pub use types::{
    Bucket, Config, CountSplit, Game, Outcome, Prediction, PredictionPage, Round, RoundPage,
    SideSplit,
};
