//! Shared utilities for wardend
//!
//! This crate provides:
//! - ID types (GroupId, SiteId, BlockId, TabId, RuleId, ClientId)
//! - Time utilities (monotonic time, wall-clock minutes, day masks)
//! - Site patterns (normalization, validation, matching)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, and log directories

mod error;
mod ids;
mod paths;
mod pattern;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use pattern::*;
pub use rate_limit::*;
pub use time::*;
