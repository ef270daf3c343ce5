//! Backtest CI Results Commenter
//!
//! Aggregates per-exchange backtest result files produced by the CI pipeline
//! and posts them as Markdown comments on a commit, replacing prior bot
//! comments for the same exchanges.

pub mod github;
pub mod manifest;
pub mod render;
pub mod results;
