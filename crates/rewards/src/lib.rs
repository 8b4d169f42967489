pub mod engine;

pub use engine::{RewardComputation, RewardsEngine};
