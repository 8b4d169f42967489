#![warn(clippy::unwrap_used)]

pub mod machine;

pub use machine::{decide, StreakDecision};
