pub mod events;
pub mod extraction;
pub mod infra;
pub mod macro_data;
pub mod marketplace;
pub mod risk;
pub mod run;
pub mod scoring;
pub mod search;
pub mod services;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod watchlist;
