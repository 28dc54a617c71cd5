pub mod cascade;
pub mod serper;

pub use cascade::{
    rank, stage_queries, CascadeConfig, CascadeOutcome, CascadeRequest, SearchCascade, StagePlan,
};
pub use serper::SerperSearcher;
