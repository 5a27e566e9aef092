//! The access policy engine
//!
//! Owns the policy, the store handle, and the single optional tracking
//! session. External triggers (navigation, focus changes, ticks, pause
//! messages) come in as method calls; side effects on the browser go out
//! as `CoreEvent`s for the daemon to execute.

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_api::{
    BlockReason, Decision, EngineStateSnapshot, TabStatus, TrackingEndReason, API_VERSION,
};
use warden_config::Policy;
use warden_store::{AuditEvent, AuditEventType, Store};
use warden_util::{BlockId, GroupId, TabId, WardenError};

use crate::{block_notice_url, decide, decide_url, CoreEvent, TickOutcome, TrackedSession};

/// How a (tab, URL) pair classifies, with everything needed to act on it
/// already extracted from the policy
enum SubjectOutcome {
    NoMatch,
    Allowed {
        group_id: GroupId,
        group_name: String,
        block_id: BlockId,
        allowed_secs: u64,
        remaining: Duration,
    },
    Blocked {
        notice_url: String,
    },
    Paused,
}

/// The core policy engine
pub struct Engine {
    policy: Policy,
    store: Arc<dyn Store>,
    /// The sole serialization point for tracking: at most one session, and
    /// starting a new one always stops the previous one first
    session: Option<TrackedSession>,
}

impl Engine {
    pub fn new(policy: Policy, store: Arc<dyn Store>) -> Self {
        info!(group_count = policy.groups.len(), "Engine initialized");

        let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            group_count: policy.groups.len(),
        }));

        Self {
            policy,
            store,
            session: None,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn current_session(&self) -> Option<&TrackedSession> {
        self.session.as_ref()
    }

    pub fn has_active_session(&self) -> bool {
        self.session.is_some()
    }

    /// Swap in a new policy (settings edit observed, or SIGHUP reload).
    ///
    /// The current session is torn down if its group or block no longer
    /// exists; everything else is re-decided by the callers via the
    /// returned `RulesInvalidated`.
    pub fn reload_policy(&mut self, policy: Policy, now: DateTime<Local>) -> Vec<CoreEvent> {
        let group_count = policy.groups.len();
        self.policy = policy;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            group_count,
        }));
        info!(group_count, "Policy reloaded");

        let mut events = Vec::new();

        let session_stale = self.session.as_ref().is_some_and(|s| {
            self.policy
                .get_group(&s.group_id)
                .is_none_or(|g| !g.blocks.iter().any(|b| b.id == s.block_id))
        });
        if session_stale {
            events.extend(self.stop_session(TrackingEndReason::DecisionChanged, now));
        }

        events.push(CoreEvent::PolicyReloaded { group_count });
        events.push(CoreEvent::RulesInvalidated);
        events
    }

    /// Classify a URL for a UI context, without side effects
    pub fn tab_status(&self, url: &str, now: DateTime<Local>) -> TabStatus {
        match decide_url(&self.policy, self.store.as_ref(), url, now) {
            None => TabStatus::unmatched(),
            Some((group, decision)) => TabStatus {
                matched: true,
                group_id: Some(group.id.clone()),
                group_name: Some(group.name.clone()),
                decision: Some(decision),
            },
        }
    }

    /// The browser committed a navigation in a tab
    pub fn handle_navigation(
        &mut self,
        tab: TabId,
        url: &str,
        now: DateTime<Local>,
    ) -> Vec<CoreEvent> {
        debug!(tab = %tab, url, "Navigation committed");
        self.evaluate_subject(tab, url, now, false)
    }

    /// The focused tab changed; `None` means nothing trackable has focus
    pub fn handle_focus(
        &mut self,
        focus: Option<(TabId, String)>,
        now: DateTime<Local>,
    ) -> Vec<CoreEvent> {
        match focus {
            None => self
                .stop_session(TrackingEndReason::FocusLost, now)
                .into_iter()
                .collect(),
            Some((tab, url)) => self.evaluate_subject(tab, &url, now, true),
        }
    }

    /// Re-decide a subject and drive the tracking state machine.
    ///
    /// `stop_on_unmatched` distinguishes focus changes (an unmatched URL
    /// means focus left the tracked subject) from navigations in other
    /// tabs (which leave the session alone).
    fn evaluate_subject(
        &mut self,
        tab: TabId,
        url: &str,
        now: DateTime<Local>,
        stop_on_unmatched: bool,
    ) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        match self.classify_subject(url, now) {
            SubjectOutcome::NoMatch => {
                let tracked_tab_left =
                    self.session.as_ref().is_some_and(|s| s.tab == tab);
                if stop_on_unmatched || tracked_tab_left {
                    events.extend(self.stop_session(TrackingEndReason::FocusLost, now));
                }
            }

            SubjectOutcome::Allowed {
                group_id,
                group_name,
                block_id,
                allowed_secs,
                remaining,
            } => {
                let same_session = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.group_id == group_id && s.block_id == block_id);

                if same_session {
                    // Only the tracked subject reference moves; counters
                    // are untouched.
                    if let Some(session) = self.session.as_mut() {
                        session.refresh_subject(tab, url.to_string());
                    }
                } else {
                    // Stop-then-start handoff: never two live sessions.
                    events.extend(self.stop_session(TrackingEndReason::Superseded, now));

                    let used_secs = allowed_secs - remaining.as_secs();
                    let session = TrackedSession::new(
                        group_id.clone(),
                        group_name.clone(),
                        block_id.clone(),
                        tab,
                        url.to_string(),
                        used_secs,
                        allowed_secs,
                    );

                    let _ = self.store.append_audit(AuditEvent::new(
                        AuditEventType::TrackingStarted {
                            group_id: group_id.clone(),
                            block_id: block_id.clone(),
                            tab,
                        },
                    ));
                    info!(
                        group_id = %group_id,
                        block_id = %block_id,
                        tab = %tab,
                        remaining_secs = remaining.as_secs(),
                        "Tracking started"
                    );

                    self.session = Some(session);
                    events.push(CoreEvent::TrackingStarted {
                        group_id,
                        group_name,
                        block_id,
                        tab,
                        remaining,
                    });
                }
            }

            SubjectOutcome::Blocked { notice_url } => {
                if self.session.as_ref().is_some_and(|s| s.tab == tab) {
                    events.extend(self.stop_session(TrackingEndReason::DecisionChanged, now));
                }
                events.push(CoreEvent::RedirectTab {
                    tab,
                    url: notice_url,
                });
            }

            SubjectOutcome::Paused => {
                // A paused group neither blocks nor tracks.
                if self.session.as_ref().is_some_and(|s| s.tab == tab) {
                    events.extend(self.stop_session(TrackingEndReason::DecisionChanged, now));
                }
            }
        }

        events
    }

    fn classify_subject(&self, url: &str, now: DateTime<Local>) -> SubjectOutcome {
        let Some((group, decision)) = decide_url(&self.policy, self.store.as_ref(), url, now)
        else {
            return SubjectOutcome::NoMatch;
        };

        match decision {
            Decision::Allowed {
                block_id,
                remaining,
            } => {
                let allowed_secs = group
                    .blocks
                    .iter()
                    .find(|b| b.id == block_id)
                    .map(|b| b.allowed_seconds())
                    .unwrap_or(0);
                SubjectOutcome::Allowed {
                    group_id: group.id.clone(),
                    group_name: group.name.clone(),
                    block_id,
                    allowed_secs,
                    remaining,
                }
            }
            Decision::Blocked { reason } => SubjectOutcome::Blocked {
                notice_url: block_notice_url(
                    &self.policy.service.block_page,
                    group,
                    &reason,
                    Some(url),
                ),
            },
            Decision::Paused { .. } => SubjectOutcome::Paused,
        }
    }

    /// One second elapsed while tracking
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        let outcome = match self.session.as_mut() {
            Some(session) => session.tick(),
            None => return events,
        };

        match outcome {
            TickOutcome::Running {
                remaining,
                icon,
                persist,
            } => {
                let session = self.session.as_ref().unwrap();
                if persist {
                    self.persist_usage(session, now);
                }
                events.push(CoreEvent::TrackingTick {
                    group_id: session.group_id.clone(),
                    remaining,
                    icon,
                });
            }

            TickOutcome::Exhausted { used } => {
                let session = self.session.take().unwrap();

                if let Err(e) = self.store.set_used(
                    &session.group_id,
                    now.date_naive(),
                    &session.block_id,
                    used,
                ) {
                    warn!(error = %e, "Failed to persist final usage");
                }

                let group = self.policy.get_group(&session.group_id);
                let allowed_minutes = group
                    .and_then(|g| g.blocks.iter().find(|b| b.id == session.block_id))
                    .map(|b| b.allowed_minutes)
                    .unwrap_or(0);

                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::BudgetExhausted {
                        group_id: session.group_id.clone(),
                        block_id: session.block_id.clone(),
                        allowed_minutes,
                    },
                ));
                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::TrackingStopped {
                        group_id: session.group_id.clone(),
                        used,
                        reason: TrackingEndReason::BudgetExhausted,
                    },
                ));
                info!(
                    group_id = %session.group_id,
                    used_secs = used.as_secs(),
                    "Budget exhausted"
                );

                events.push(CoreEvent::TrackingStopped {
                    group_id: session.group_id.clone(),
                    used,
                    reason: TrackingEndReason::BudgetExhausted,
                });
                events.push(CoreEvent::BudgetExhausted {
                    group_id: session.group_id.clone(),
                    group_name: session.group_name.clone(),
                    block_id: session.block_id.clone(),
                    allowed_minutes,
                    tab: session.tab,
                });
                // The exhausted group must now be enforced.
                events.push(CoreEvent::RulesInvalidated);
                if let Some(group) = group {
                    events.push(CoreEvent::RedirectTab {
                        tab: session.tab,
                        url: block_notice_url(
                            &self.policy.service.block_page,
                            group,
                            &BlockReason::BudgetExhausted { allowed_minutes },
                            Some(&session.url),
                        ),
                    });
                }
            }
        }

        events
    }

    /// A pause was granted for a group
    pub fn pause_group(
        &mut self,
        group_id: &GroupId,
        until: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>, WardenError> {
        if self.policy.get_group(group_id).is_none() {
            return Err(WardenError::GroupNotFound(group_id.clone()));
        }

        self.store
            .set_pause(group_id, until)
            .map_err(|e| WardenError::store(e.to_string()))?;
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PauseStarted {
            group_id: group_id.clone(),
            until,
        }));
        info!(group_id = %group_id, until = %until, "Pause started");

        let mut events = Vec::new();
        if self.session.as_ref().is_some_and(|s| &s.group_id == group_id) {
            events.extend(self.stop_session(TrackingEndReason::DecisionChanged, now));
        }
        events.push(CoreEvent::PauseStarted {
            group_id: group_id.clone(),
            until,
        });
        events.push(CoreEvent::RulesInvalidated);
        Ok(events)
    }

    /// A pause ended, either by expiry or by the user
    pub fn end_pause(
        &mut self,
        group_id: &GroupId,
        expired: bool,
        _now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>, WardenError> {
        self.store
            .clear_pause(group_id)
            .map_err(|e| WardenError::store(e.to_string()))?;
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PauseEnded {
            group_id: group_id.clone(),
            expired,
        }));
        info!(group_id = %group_id, expired, "Pause ended");

        Ok(vec![
            CoreEvent::PauseEnded {
                group_id: group_id.clone(),
                expired,
            },
            CoreEvent::RulesInvalidated,
        ])
    }

    /// Persistence heartbeat: write the live counter even between the
    /// every-10th-tick writes
    pub fn heartbeat(&self, now: DateTime<Local>) {
        if let Some(session) = &self.session {
            self.persist_usage(session, now);
        }
    }

    /// Stop any active session, persisting its usage first
    pub fn stop_tracking(
        &mut self,
        reason: TrackingEndReason,
        now: DateTime<Local>,
    ) -> Option<CoreEvent> {
        self.stop_session(reason, now)
    }

    /// Full state snapshot for clients
    pub fn state_snapshot(&self, now: DateTime<Local>) -> EngineStateSnapshot {
        let blocked_groups = self
            .policy
            .groups
            .iter()
            .filter(|g| decide(g, self.store.as_ref(), now).is_blocked())
            .map(|g| g.id.clone())
            .collect();

        EngineStateSnapshot {
            api_version: API_VERSION,
            policy_loaded: true,
            group_count: self.policy.groups.len(),
            blocked_groups,
            tracking: self.session.as_ref().map(|s| s.snapshot()),
        }
    }

    fn persist_usage(&self, session: &TrackedSession, now: DateTime<Local>) {
        if let Err(e) = self.store.set_used(
            &session.group_id,
            now.date_naive(),
            &session.block_id,
            session.used(),
        ) {
            warn!(error = %e, "Failed to persist usage");
        }
    }

    fn stop_session(
        &mut self,
        reason: TrackingEndReason,
        now: DateTime<Local>,
    ) -> Option<CoreEvent> {
        let session = self.session.take()?;

        self.persist_usage(&session, now);
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TrackingStopped {
            group_id: session.group_id.clone(),
            used: session.used(),
            reason: reason.clone(),
        }));
        info!(
            group_id = %session.group_id,
            used = %warden_util::format_duration(session.used()),
            reason = ?reason,
            "Tracking stopped"
        );

        let used = session.used();
        Some(CoreEvent::TrackingStopped {
            group_id: session.group_id,
            used,
            reason,
        })
    }
}
