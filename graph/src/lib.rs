//! Commit history traversal and lane layout.
//!
//! A [`HistoryList`] runs `git log` through a [`PlumbingReader`], parses the
//! records, feeds them into a [`CommitGraph`] and lays them out with a
//! [`LaneAssigner`], one [`GraphRow`] per commit.

pub mod core;
pub mod error;
pub mod git_backend;
pub mod history;
pub mod layout;
pub mod render;

pub use crate::core::{Ancestry, CommitGraph, CommitId, CommitRecord, GraphStats};
pub use error::{GraphError, Result};
pub use git_backend::{
    CancelToken, Enumerator, GitSource, ParseMode, PlumbingCommand, PlumbingReader, RefSpec,
    SortOrder, TraversalOptions, TraversalRequest,
};
pub use history::{HistoryList, LoadState, TraversalPlan};
pub use layout::{GraphRow, Lane, LaneAssigner, LaneIdx};
pub use render::TextRenderer;
