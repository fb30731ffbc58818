pub mod binary;
pub mod config;
pub mod error;
pub mod repository;

pub use binary::locate;
pub use config::{Config, Scope};
pub use error::{CoreError, Result};
pub use repository::{RefInfo, RefKind, Repository};
