//! Background refresh loops for visible sessions.
//!
//! Three independent loops, each with its own cadence and its own abortable
//! task handle:
//!
//! - **metrics**: full summary per session, merged key-by-key;
//! - **liveness**: only the "is authorized" flag, patched in place;
//! - **log tail**: last N lines of one session's log, one task per open
//!   panel, with an immediate fetch before the interval starts.
//!
//! A failed fetch for one session never aborts the batch and never blanks
//! out that session's previous value. Every handle is aborted on restart,
//! on panel close, and on drop; a leaked loop would keep burning remote
//! quota for sessions nobody is looking at.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::api::AccountApi;
use crate::api::types::{MetricsSnapshot, Outcome, SessionRecord};
use crate::config::PollConfig;

/// Latest tail of one session's operational log.
#[derive(Debug, Clone, Default)]
pub struct LogView {
    pub text: String,
    pub mtime: Option<DateTime<Utc>>,
}

/// Merge-only caches fed by the loops.
#[derive(Debug, Default)]
pub struct PollState {
    metrics: HashMap<String, MetricsSnapshot>,
    liveness: HashMap<String, bool>,
    logs: HashMap<String, LogView>,
}

/// The poller. Owns the loop tasks; reads go through cheap lock scopes.
pub struct SessionPoller {
    api: Arc<dyn AccountApi>,
    config: PollConfig,
    state: Arc<RwLock<PollState>>,
    metrics_task: Mutex<Option<JoinHandle<()>>>,
    liveness_task: Mutex<Option<JoinHandle<()>>>,
    log_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SessionPoller {
    pub fn new(api: Arc<dyn AccountApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            state: Arc::new(RwLock::new(PollState::default())),
            metrics_task: Mutex::new(None),
            liveness_task: Mutex::new(None),
            log_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// (Re)start the metrics and liveness loops for a session set. Called
    /// whenever the visible set changes; the previous loops are aborted
    /// first.
    pub fn watch(&self, phones: Vec<String>) {
        self.stop_watch();
        if phones.is_empty() {
            return;
        }

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let metrics_phones = phones.clone();
        let metrics_secs = self.config.metrics_interval_secs;
        let metrics = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                poll_metrics_once(&api, &metrics_phones, &state).await;
            }
        });
        *self.metrics_task.lock().expect("metrics task lock") = Some(metrics);

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let liveness_secs = self.config.liveness_interval_secs;
        let liveness = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(liveness_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                poll_liveness_once(&api, &phones, &state).await;
            }
        });
        *self.liveness_task.lock().expect("liveness task lock") = Some(liveness);
    }

    fn stop_watch(&self) {
        if let Some(task) = self.metrics_task.lock().expect("metrics task lock").take() {
            task.abort();
        }
        if let Some(task) = self.liveness_task.lock().expect("liveness task lock").take() {
            task.abort();
        }
    }

    /// Open a log panel: immediate fetch, then the tail loop.
    pub fn open_log(&self, phone: &str) {
        let mut tasks = self.log_tasks.lock().expect("log task lock");
        if tasks.contains_key(phone) {
            return;
        }

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let phone_key = phone.to_string();
        let lines = self.config.log_lines;
        let secs = self.config.log_interval_secs;
        let task = tokio::spawn(async move {
            poll_log_once(&api, &phone_key, lines, &state).await;
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // the immediate fetch above covers tick zero
            loop {
                interval.tick().await;
                poll_log_once(&api, &phone_key, lines, &state).await;
            }
        });
        tasks.insert(phone.to_string(), task);
    }

    /// Close a log panel: abort the loop and drop the cached tail.
    pub fn close_log(&self, phone: &str) {
        if let Some(task) = self.log_tasks.lock().expect("log task lock").remove(phone) {
            task.abort();
        }
        self.state
            .write()
            .expect("poll state lock")
            .logs
            .remove(phone);
    }

    pub fn log_is_open(&self, phone: &str) -> bool {
        self.log_tasks.lock().expect("log task lock").contains_key(phone)
    }

    /// Stop every loop. Also runs on drop.
    pub fn shutdown(&self) {
        self.stop_watch();
        let mut tasks = self.log_tasks.lock().expect("log task lock");
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }

    // --- reads and patches ----------------------------------------------

    pub fn metrics(&self, phone: &str) -> Option<MetricsSnapshot> {
        self.state
            .read()
            .expect("poll state lock")
            .metrics
            .get(phone)
            .cloned()
    }

    pub fn liveness(&self, phone: &str) -> Option<bool> {
        self.state
            .read()
            .expect("poll state lock")
            .liveness
            .get(phone)
            .copied()
    }

    pub fn log_view(&self, phone: &str) -> Option<LogView> {
        self.state
            .read()
            .expect("poll state lock")
            .logs
            .get(phone)
            .cloned()
    }

    /// Patch one session's cached metrics in place (dispatcher results like
    /// a login-email status check land here).
    pub fn patch_metrics(&self, phone: &str, patch: impl FnOnce(&mut MetricsSnapshot)) {
        let mut state = self.state.write().expect("poll state lock");
        patch(state.metrics.entry(phone.to_string()).or_default());
    }

    /// Overlay polled liveness onto cached session records.
    pub fn apply_liveness(&self, sessions: &mut [SessionRecord]) {
        let state = self.state.read().expect("poll state lock");
        for session in sessions {
            if let Some(active) = state.liveness.get(&session.phone_number) {
                session.is_active = *active;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state_handle(&self) -> Arc<RwLock<PollState>> {
        Arc::clone(&self.state)
    }
}

impl Drop for SessionPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One metrics sweep. Fetches run concurrently; each session merges (or is
/// skipped) independently.
pub(crate) async fn poll_metrics_once(
    api: &Arc<dyn AccountApi>,
    phones: &[String],
    state: &Arc<RwLock<PollState>>,
) {
    let fetches = phones.iter().map(|phone| {
        let api = Arc::clone(api);
        let phone = phone.clone();
        async move {
            let result = api.session_metrics(&phone).await;
            (phone, result)
        }
    });

    let results = join_all(fetches).await;
    let mut state = state.write().expect("poll state lock");
    for (phone, result) in results {
        match result {
            Ok(Outcome::Success(snapshot)) => {
                if let Some(authorized) = snapshot.is_authorized {
                    state.liveness.insert(phone.clone(), authorized);
                }
                state.metrics.insert(phone, snapshot);
            }
            Ok(Outcome::Rejected(rejection)) => {
                tracing::debug!(%phone, "metrics poll rejected: {rejection}");
            }
            Err(e) => {
                tracing::debug!(%phone, "metrics poll failed: {e}");
            }
        }
    }
}

/// One liveness sweep. Touches nothing but the authorized flag.
pub(crate) async fn poll_liveness_once(
    api: &Arc<dyn AccountApi>,
    phones: &[String],
    state: &Arc<RwLock<PollState>>,
) {
    let fetches = phones.iter().map(|phone| {
        let api = Arc::clone(api);
        let phone = phone.clone();
        async move {
            let result = api.session_metrics(&phone).await;
            (phone, result)
        }
    });

    let results = join_all(fetches).await;
    let mut state = state.write().expect("poll state lock");
    for (phone, result) in results {
        if let Ok(Outcome::Success(snapshot)) = result
            && let Some(authorized) = snapshot.is_authorized
        {
            state.liveness.insert(phone, authorized);
        }
    }
}

/// One log-tail fetch for an open panel.
pub(crate) async fn poll_log_once(
    api: &Arc<dyn AccountApi>,
    phone: &str,
    lines: usize,
    state: &Arc<RwLock<PollState>>,
) {
    match api.session_log(phone, lines).await {
        Ok(Outcome::Success(tail)) => {
            let mut state = state.write().expect("poll state lock");
            state.logs.insert(
                phone.to_string(),
                LogView {
                    text: tail.text,
                    mtime: tail.mtime,
                },
            );
        }
        Ok(Outcome::Rejected(rejection)) => {
            tracing::debug!(%phone, "log tail rejected: {rejection}");
        }
        Err(e) => {
            tracing::debug!(%phone, "log tail fetch failed: {e}");
        }
    }
}
