pub mod lanes;

pub use lanes::{ColorIdx, Edge, GraphRow, Lane, LaneAssigner, LaneIdx, LaneRef, Segment};
