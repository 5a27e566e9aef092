//! Mock browser collaborator for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use warden_api::CompiledRule;
use warden_util::{RuleId, TabId};

use crate::{ActiveTab, BrowserError, BrowserResult, Navigator, RuleSink};

/// Mock browser implementing both collaborator traits over in-memory state.
///
/// Tests drive it by setting the focused tab and open-tab set, then assert
/// on the recorded redirects and the installed rule map.
#[derive(Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    focused: Option<ActiveTab>,
    closed_tabs: Vec<TabId>,
    redirects: Vec<(TabId, String)>,
    installed: HashMap<RuleId, CompiledRule>,
    fail_rule_updates: bool,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the focused tab reported by `active_tab`
    pub fn set_focused(&self, tab: Option<ActiveTab>) {
        self.state.lock().unwrap().focused = tab;
    }

    /// Mark a tab as closed so redirects to it fail
    pub fn close_tab(&self, tab: TabId) {
        let mut state = self.state.lock().unwrap();
        state.closed_tabs.push(tab);
        if state.focused.as_ref().is_some_and(|t| t.tab == tab) {
            state.focused = None;
        }
    }

    /// Configure rule updates to fail
    pub fn set_fail_rule_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_rule_updates = fail;
    }

    /// Redirects recorded so far, oldest first
    pub fn redirects(&self) -> Vec<(TabId, String)> {
        self.state.lock().unwrap().redirects.clone()
    }

    /// Currently installed rules
    pub fn installed_rules(&self) -> Vec<CompiledRule> {
        let state = self.state.lock().unwrap();
        let mut rules: Vec<CompiledRule> = state.installed.values().cloned().collect();
        rules.sort_by_key(|r| r.id);
        rules
    }
}

#[async_trait]
impl Navigator for MockBrowser {
    async fn redirect(&self, tab: TabId, url: &str) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed_tabs.contains(&tab) {
            return Err(BrowserError::TabClosed(tab));
        }
        state.redirects.push((tab, url.to_string()));
        Ok(())
    }

    async fn active_tab(&self) -> BrowserResult<Option<ActiveTab>> {
        Ok(self.state.lock().unwrap().focused.clone())
    }
}

#[async_trait]
impl RuleSink for MockBrowser {
    async fn apply(&self, add: Vec<CompiledRule>, remove: Vec<RuleId>) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rule_updates {
            return Err(BrowserError::RuleUpdateFailed("mock failure".into()));
        }
        for id in remove {
            state.installed.remove(&id);
        }
        for rule in add {
            state.installed.insert(rule.id, rule);
        }
        Ok(())
    }

    async fn installed_ids(&self) -> BrowserResult<Vec<RuleId>> {
        let mut ids: Vec<RuleId> = self.state.lock().unwrap().installed.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
