//! Browser collaborator traits

use async_trait::async_trait;
use thiserror::Error;
use warden_api::CompiledRule;
use warden_util::{RuleId, TabId};

/// Errors from browser collaborator operations
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The tab no longer exists; callers absorb this, never retry
    #[error("Tab {0} is closed")]
    TabClosed(TabId),

    #[error("Redirect failed: {0}")]
    RedirectFailed(String),

    #[error("Rule update failed: {0}")]
    RuleUpdateFailed(String),

    #[error("Browser helper not connected")]
    NotConnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// The currently focused tab, as the browser reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTab {
    pub tab: TabId,
    pub url: String,
}

/// Navigation collaborator: drives and inspects tabs
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Redirect a tab to the given URL.
    ///
    /// Returns `BrowserError::TabClosed` when the tab disappeared between
    /// decision and redirect.
    async fn redirect(&self, tab: TabId, url: &str) -> BrowserResult<()>;

    /// The currently focused tab and its URL, if any
    async fn active_tab(&self) -> BrowserResult<Option<ActiveTab>>;
}

/// Enforcement sink: holds the installed declarative redirect rules
#[async_trait]
pub trait RuleSink: Send + Sync {
    /// Apply a rule delta atomically: `remove` then `add` as one operation.
    /// There is no partial-update path.
    async fn apply(&self, add: Vec<CompiledRule>, remove: Vec<RuleId>) -> BrowserResult<()>;

    /// IDs of the currently installed rules
    async fn installed_ids(&self) -> BrowserResult<Vec<RuleId>>;
}
