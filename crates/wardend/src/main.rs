//! wardend - the warden background service
//!
//! This is the main entry point for the wardend service. It wires together
//! all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine
//! - Browser bridge (navigation + rule enforcement over IPC)
//! - IPC server
//! - Timers: the 1 s tracking ticker, the 30 s persistence heartbeat, and
//!   wall-clock alarms for schedule boundaries, midnight rollover, and
//!   pause expiries

mod bridge;

use anyhow::{Context, Result};
use bridge::IpcBrowserBridge;
use chrono::{DateTime, Local, TimeZone};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload, TrackingEndReason,
};
use warden_browser::{ActiveTab, BrowserError, Navigator};
use warden_config::load_config;
use warden_core::{next_boundary, rebuild, CoreEvent, Engine};
use warden_ipc::{IpcServer, ServerMessage};
use warden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use warden_util::{default_config_path, ClientId, GroupId, RateLimiter};

/// wardend - access policy enforcement for browsing sessions
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "Access policy enforcement for browsing sessions", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/wardend/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set WARDEN_SOCKET env var)
    #[arg(short, long, env = "WARDEN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set WARDEN_DATA_DIR env var)
    #[arg(short, long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Abortable handle for the 1-second tracking ticker.
///
/// The task is aborted on every transition to idle so no orphaned tick can
/// fire against a cleared session.
#[derive(Default)]
struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn start(&mut self, tx: mpsc::UnboundedSender<()>) {
        self.stop();
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; the countdown starts
            // one second after the session does.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(()).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wall-clock deadlines the daemon sleeps toward.
///
/// Each key holds at most one deadline; re-arming supersedes the previous
/// one. Pause expiries are keyed by group.
struct Alarms {
    pause_expiries: HashMap<GroupId, DateTime<Local>>,
    schedule_boundary: Option<DateTime<Local>>,
    midnight: DateTime<Local>,
}

enum AlarmKind {
    PauseExpiry(GroupId),
    ScheduleBoundary,
    Midnight,
}

impl Alarms {
    fn new(now: DateTime<Local>) -> Self {
        Self {
            pause_expiries: HashMap::new(),
            schedule_boundary: None,
            midnight: next_midnight(now),
        }
    }

    /// Time until the earliest deadline
    fn sleep_duration(&self, now: DateTime<Local>) -> Duration {
        let mut next = self.midnight;
        if let Some(boundary) = self.schedule_boundary {
            next = next.min(boundary);
        }
        for until in self.pause_expiries.values() {
            next = next.min(*until);
        }
        (next - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Pop every deadline that has passed
    fn due(&mut self, now: DateTime<Local>) -> Vec<AlarmKind> {
        let mut due = Vec::new();

        let expired: Vec<GroupId> = self
            .pause_expiries
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(group, _)| group.clone())
            .collect();
        for group in expired {
            self.pause_expiries.remove(&group);
            due.push(AlarmKind::PauseExpiry(group));
        }

        if self.schedule_boundary.is_some_and(|b| b <= now) {
            self.schedule_boundary = None;
            due.push(AlarmKind::ScheduleBoundary);
        }

        if self.midnight <= now {
            self.midnight = next_midnight(now);
            due.push(AlarmKind::Midnight);
        }

        due
    }
}

fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .unwrap_or_else(|| now.date_naive());
    Local
        .from_local_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap())
        .earliest()
        .unwrap_or(now + chrono::Duration::hours(24))
}

/// Main service state
struct Service {
    engine: Engine,
    browser: Arc<IpcBrowserBridge>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
    ticker: Ticker,
    tick_tx: mpsc::UnboundedSender<()>,
    alarms: Alarms,
    config_path: PathBuf,
}

impl Service {
    async fn new(args: &Args) -> Result<(Self, mpsc::UnboundedReceiver<()>)> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            group_count = policy.groups.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("wardend.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let engine = Engine::new(policy, store.clone());

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;
        let ipc = Arc::new(ipc);

        info!(socket_path = %socket_path.display(), "IPC server started");

        let browser = Arc::new(IpcBrowserBridge::new(ipc.clone()));

        // Rate limiter: 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        // The main loop keeps one sender alive so the tick channel never
        // closes while tickers come and go.
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let service = Self {
            engine,
            browser,
            ipc,
            store,
            rate_limiter,
            ticker: Ticker::default(),
            tick_tx,
            alarms: Alarms::new(warden_util::now()),
            config_path: args.config.clone(),
        };

        Ok((service, tick_rx))
    }

    async fn run(mut self, mut tick_rx: mpsc::UnboundedReceiver<()>) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .expect("Message receiver should be available");

        // Spawn IPC accept task
        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // Persistence heartbeat between every-10th-tick ledger writes
        let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

        // Startup: restore pause alarms and install the initial rule set
        let now = warden_util::now();
        self.restore_pauses(now).await;
        self.rebuild_rules(now).await;

        info!("Service running");

        loop {
            let sleep_duration = self.alarms.sleep_duration(warden_util::now());

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP: reload configuration in place
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    if let Err(e) = self.reload_config(warden_util::now()).await {
                        error!(error = %e, "Config reload failed; keeping previous policy");
                    }
                }

                // One countdown second while a session is tracked
                Some(_) = tick_rx.recv() => {
                    let now = warden_util::now();
                    let events = self.engine.tick(now);
                    self.execute_events(events, now).await;
                }

                _ = heartbeat.tick() => {
                    self.engine.heartbeat(warden_util::now());
                }

                // Earliest wall-clock alarm (schedule boundary, midnight,
                // pause expiry)
                _ = tokio::time::sleep(sleep_duration) => {
                    self.handle_alarms(warden_util::now()).await;
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down wardend");

        let now = warden_util::now();
        if self
            .engine
            .stop_tracking(TrackingEndReason::Shutdown, now)
            .is_some()
        {
            self.ticker.stop();
        }

        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Execute the engine's side effects against the collaborators
    async fn execute_events(&mut self, events: Vec<CoreEvent>, now: DateTime<Local>) {
        for event in events {
            match event {
                CoreEvent::TrackingStarted {
                    group_id,
                    group_name,
                    block_id,
                    tab,
                    remaining,
                } => {
                    self.ticker.start(self.tick_tx.clone());
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::TrackingStarted {
                            group_id,
                            group_name,
                            block_id,
                            tab,
                            remaining,
                        }));
                }

                CoreEvent::TrackingTick {
                    group_id,
                    remaining,
                    icon,
                } => {
                    // Badge updates are best-effort: a helper that fails
                    // to render simply misses this event.
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::TrackingTick {
                            group_id,
                            remaining,
                            icon,
                        }));
                }

                CoreEvent::TrackingStopped {
                    group_id,
                    used,
                    reason,
                } => {
                    self.ticker.stop();
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::TrackingStopped {
                            group_id,
                            used,
                            reason,
                        }));
                }

                CoreEvent::BudgetExhausted {
                    group_id,
                    group_name,
                    allowed_minutes,
                    tab,
                    ..
                } => {
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::BudgetExhausted {
                            group_id,
                            group_name,
                            allowed_minutes,
                            tab,
                        }));
                }

                CoreEvent::RedirectTab { tab, url } => {
                    match self.browser.redirect(tab, &url).await {
                        Ok(()) => {}
                        Err(BrowserError::TabClosed(tab)) => {
                            // The tab vanished between decision and
                            // redirect; nothing left to redirect.
                            warn!(tab = %tab, "Tab closed before redirect; ignored");
                        }
                        Err(e) => {
                            warn!(error = %e, "Redirect failed");
                        }
                    }
                }

                CoreEvent::RulesInvalidated => {
                    self.rebuild_rules(now).await;
                }

                CoreEvent::PauseStarted { group_id, until } => {
                    self.alarms.pause_expiries.insert(group_id.clone(), until);
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::PauseStarted {
                            group_id,
                            until,
                        }));
                }

                CoreEvent::PauseEnded { group_id, expired } => {
                    self.alarms.pause_expiries.remove(&group_id);
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::PauseEnded {
                            group_id,
                            expired,
                        }));
                }

                CoreEvent::PolicyReloaded { group_count } => {
                    self.ipc
                        .broadcast_event(Event::new(EventPayload::PolicyReloaded {
                            group_count,
                        }));
                }
            }
        }
    }

    /// Replace the enforcement rule set and re-arm the schedule alarm
    async fn rebuild_rules(&mut self, now: DateTime<Local>) {
        match rebuild(
            self.engine.policy(),
            self.store.as_ref(),
            self.browser.as_ref(),
            now,
        )
        .await
        {
            Ok(summary) => {
                self.ipc
                    .broadcast_event(Event::new(EventPayload::RulesRebuilt {
                        added: summary.added,
                        removed: summary.removed,
                    }));
            }
            Err(e) => {
                warn!(error = %e, "Rule rebuild failed");
            }
        }

        self.alarms.schedule_boundary = next_boundary(&self.engine.policy().groups, now);
        if let Some(boundary) = self.alarms.schedule_boundary {
            debug!(boundary = %boundary, "Schedule alarm armed");
        }
    }

    /// Re-arm expiry alarms for pauses that survived a restart
    async fn restore_pauses(&mut self, now: DateTime<Local>) {
        let pauses = match self.store.list_pauses() {
            Ok(pauses) => pauses,
            Err(e) => {
                warn!(error = %e, "Failed to list pauses");
                return;
            }
        };

        for (group_id, until) in pauses {
            if until <= now {
                if let Ok(events) = self.engine.end_pause(&group_id, true, now) {
                    self.execute_events(events, now).await;
                }
            } else {
                info!(group_id = %group_id, until = %until, "Pause restored");
                self.alarms.pause_expiries.insert(group_id, until);
            }
        }
    }

    /// Re-decide the focused tab after a state change
    async fn reevaluate_active_tab(&mut self, now: DateTime<Local>) {
        if let Ok(Some(active)) = self.browser.active_tab().await {
            let events = self.engine.handle_focus(Some((active.tab, active.url)), now);
            self.execute_events(events, now).await;
        }
    }

    async fn handle_alarms(&mut self, now: DateTime<Local>) {
        for alarm in self.alarms.due(now) {
            match alarm {
                AlarmKind::PauseExpiry(group_id) => {
                    info!(group_id = %group_id, "Pause expired");
                    match self.engine.end_pause(&group_id, true, now) {
                        Ok(events) => self.execute_events(events, now).await,
                        Err(e) => warn!(error = %e, "Failed to end expired pause"),
                    }
                    self.reevaluate_active_tab(now).await;
                }

                AlarmKind::ScheduleBoundary => {
                    debug!("Schedule boundary crossed");
                    self.rebuild_rules(now).await;
                    self.reevaluate_active_tab(now).await;
                }

                AlarmKind::Midnight => {
                    info!("Daily rollover");
                    self.rebuild_rules(now).await;
                    self.reevaluate_active_tab(now).await;
                }
            }
        }
    }

    async fn reload_config(&mut self, now: DateTime<Local>) -> Result<usize> {
        let policy = load_config(&self.config_path)
            .with_context(|| format!("Failed to load config from {:?}", self.config_path))?;
        let group_count = policy.groups.len();

        let events = self.engine.reload_policy(policy, now);
        self.execute_events(events, now).await;
        self.reevaluate_active_tab(now).await;

        Ok(group_count)
    }

    async fn handle_ipc_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                if !self.rate_limiter.check(&client_id) {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                let response = self
                    .handle_command(&client_id, request.request_id, request.command)
                    .await;

                let _ = self.ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        role: format!("{:?}", info.role),
                        uid: info.uid,
                    }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    }));

                self.rate_limiter.remove_client(&client_id);
            }
        }
    }

    async fn handle_command(
        &mut self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = warden_util::now();
        let role = self
            .ipc
            .get_client_info(client_id)
            .await
            .map(|info| info.role)
            .unwrap_or(ClientRole::Observer);

        match command {
            Command::GetState => {
                let state = self.engine.state_snapshot(now);
                Response::success(request_id, ResponsePayload::State(state))
            }

            Command::GetTabStatus { url } => {
                let status = self.engine.tab_status(&url, now);
                Response::success(request_id, ResponsePayload::TabStatus(status))
            }

            Command::GetTrackingState => Response::success(
                request_id,
                ResponsePayload::TrackingState {
                    session: self.engine.current_session().map(|s| s.snapshot()),
                },
            ),

            Command::PauseActivated {
                group_id,
                paused_until,
            } => {
                if !role.can_pause() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Pause not permitted"),
                    );
                }

                match self.engine.pause_group(&group_id, paused_until, now) {
                    Ok(events) => {
                        self.execute_events(events, now).await;
                        Response::success(
                            request_id,
                            ResponsePayload::PauseSet {
                                group_id,
                                until: paused_until,
                            },
                        )
                    }
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::GroupNotFound, e.to_string()),
                    ),
                }
            }

            Command::PauseEnded { group_id } => {
                if !role.can_pause() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Pause not permitted"),
                    );
                }

                match self.engine.end_pause(&group_id, false, now) {
                    Ok(events) => {
                        self.execute_events(events, now).await;
                        Response::success(
                            request_id,
                            ResponsePayload::PauseCleared { group_id },
                        )
                    }
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InternalError, e.to_string()),
                    ),
                }
            }

            Command::NavigationCommitted { tab, url } => {
                if !role.can_report_navigation() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Navigation reports not permitted"),
                    );
                }

                self.browser.note_navigation(tab, &url);
                let events = self.engine.handle_navigation(tab, &url, now);
                self.execute_events(events, now).await;
                Response::success(request_id, ResponsePayload::Ack)
            }

            Command::FocusChanged { tab, url } => {
                if !role.can_report_navigation() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Focus reports not permitted"),
                    );
                }

                let focus = match (tab, url) {
                    (Some(tab), Some(url)) => Some((tab, url)),
                    _ => None,
                };

                self.browser
                    .set_focused(focus.clone().map(|(tab, url)| ActiveTab { tab, url }));
                let events = self.engine.handle_focus(focus, now);
                self.execute_events(events, now).await;
                Response::success(request_id, ResponsePayload::Ack)
            }

            Command::ReloadConfig => {
                if !role.can_reload_config() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    );
                }

                match self.reload_config(now).await {
                    Ok(group_count) => Response::success(
                        request_id,
                        ResponsePayload::ConfigReloaded { group_count },
                    ),
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::ConfigError, e.to_string()),
                    ),
                }
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    policy_loaded: true,
                    browser_ok: self.ipc.client_count().await > 0,
                    store_ok: self.store.is_healthy(),
                };
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    let (service, tick_rx) = Service::new(&args).await?;
    service.run(tick_rx).await
}
