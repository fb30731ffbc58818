pub mod graph;
pub mod id;
pub mod record;

pub use graph::{
    Ancestry, Anomaly, CommitGraph, GraphNode, GraphStats, InsertOutcome, OrderViolation,
};
pub use id::{CommitId, InvalidCommitId};
pub use record::{CommitRecord, Parents};
