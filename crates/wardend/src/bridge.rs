//! Browser bridge over IPC
//!
//! The real navigation collaborator and enforcement sink live inside the
//! browser helper, which is connected over the IPC socket. This bridge
//! implements the collaborator traits by broadcasting instructions to
//! subscribed helpers and mirroring what has been installed, so reads
//! (installed rule IDs, focused tab) never need a round trip.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;
use warden_api::{CompiledRule, Event, EventPayload};
use warden_browser::{ActiveTab, BrowserResult, Navigator, RuleSink};
use warden_ipc::IpcServer;
use warden_util::{RuleId, TabId};

pub struct IpcBrowserBridge {
    ipc: Arc<IpcServer>,
    state: Mutex<BridgeState>,
}

#[derive(Default)]
struct BridgeState {
    /// Rule IDs we have told the helper to install
    installed: HashSet<RuleId>,
    /// Focus as last reported by the helper
    focused: Option<ActiveTab>,
}

impl IpcBrowserBridge {
    pub fn new(ipc: Arc<IpcServer>) -> Self {
        Self {
            ipc,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Record the focus reported by a FocusChanged message
    pub fn set_focused(&self, focus: Option<ActiveTab>) {
        self.state.lock().unwrap().focused = focus;
    }

    /// Keep the focused-tab URL current when the focused tab navigates
    pub fn note_navigation(&self, tab: TabId, url: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(focused) = state.focused.as_mut() {
            if focused.tab == tab {
                focused.url = url.to_string();
            }
        }
    }
}

#[async_trait]
impl Navigator for IpcBrowserBridge {
    async fn redirect(&self, tab: TabId, url: &str) -> BrowserResult<()> {
        debug!(tab = %tab, url, "Redirect dispatched to browser helper");
        self.ipc.broadcast_event(Event::new(EventPayload::RedirectTab {
            tab,
            url: url.to_string(),
        }));
        Ok(())
    }

    async fn active_tab(&self) -> BrowserResult<Option<ActiveTab>> {
        Ok(self.state.lock().unwrap().focused.clone())
    }
}

#[async_trait]
impl RuleSink for IpcBrowserBridge {
    async fn apply(&self, add: Vec<CompiledRule>, remove: Vec<RuleId>) -> BrowserResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            for id in &remove {
                state.installed.remove(id);
            }
            for rule in &add {
                state.installed.insert(rule.id);
            }
        }

        self.ipc
            .broadcast_event(Event::new(EventPayload::ApplyRules { add, remove }));
        Ok(())
    }

    async fn installed_ids(&self) -> BrowserResult<Vec<RuleId>> {
        let mut ids: Vec<RuleId> = self
            .state
            .lock()
            .unwrap()
            .installed
            .iter()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
