//! Scoring Engine: typed signal parsing plus a pure capped-factor scorer.

pub mod money;
pub mod scorer;
pub mod signals;

pub use scorer::{factors_for, score_hit};
pub use signals::{parse_signals, query_terms};
