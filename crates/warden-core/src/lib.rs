//! Access policy engine for wardend
//!
//! This crate is the heart of wardend, containing:
//! - URL matching against group site patterns
//! - Schedule evaluation (weekly windows with inclusive end minutes)
//! - The block/allow/pause decision algorithm
//! - The tracking loop state machine (Idle -> Tracking)
//! - Rule compilation for the enforcement sink

mod decision;
mod engine;
mod events;
mod matcher;
mod rules;
mod schedule;
mod tracker;

pub use decision::*;
pub use engine::*;
pub use events::*;
pub use matcher::*;
pub use rules::*;
pub use schedule::*;
pub use tracker::*;
