//! Alert lifecycle: open, update in place, resolve.
//!
//! One active alert per SLO check id. Every open prepends an entry to the
//! history; the entry mirrors later updates and the resolution of that alert.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use benchops_core::{Clock, SystemClock};

use crate::slo::{SloCheck, SloEvaluation};

/// Default number of history entries retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// A breach of one SLO check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Same as the check id.
    pub id: String,
    pub status: AlertStatus,
    pub message: String,
    pub metric: String,
    pub target: f64,
    pub actual: f64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    fn open(check: &SloCheck, now: DateTime<Utc>) -> Self {
        Self {
            id: check.id.clone(),
            status: AlertStatus::Active,
            message: check.message.clone(),
            metric: check.metric.clone(),
            target: check.target,
            actual: check.observed,
            started_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    fn is_same_incident(&self, other: &Alert) -> bool {
        self.id == other.id && self.started_at == other.started_at
    }
}

/// Ids touched by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertTransitions {
    pub opened: Vec<String>,
    pub updated: Vec<String>,
    pub resolved: Vec<String>,
    pub dropped: Vec<String>,
}

impl AlertTransitions {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
            && self.updated.is_empty()
            && self.resolved.is_empty()
            && self.dropped.is_empty()
    }
}

#[derive(Debug, Default)]
struct AlertState {
    active: HashMap<String, Alert>,
    /// Newest first.
    history: VecDeque<Alert>,
}

impl AlertState {
    fn mirror(&mut self, alert: &Alert) {
        if let Some(entry) = self.history.iter_mut().find(|h| h.is_same_incident(alert)) {
            *entry = alert.clone();
        }
    }
}

/// In-memory alert tracker. State lives for the process lifetime only.
pub struct AlertManager {
    clock: Arc<dyn Clock>,
    history_limit: usize,
    state: RwLock<AlertState>,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AlertManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            history_limit: DEFAULT_HISTORY_LIMIT,
            state: RwLock::new(AlertState::default()),
        }
    }

    /// Cap the number of history entries kept (oldest are evicted). Minimum 1.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Apply a fresh evaluation to the active set.
    pub fn reconcile(&self, evaluation: &SloEvaluation) -> AlertTransitions {
        let now = self.clock.now();
        let mut transitions = AlertTransitions::default();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        for check in &evaluation.checks {
            match (check.passed, state.active.contains_key(&check.id)) {
                (false, false) => {
                    let alert = Alert::open(check, now);
                    warn!(
                        alert_id = %alert.id,
                        metric = %alert.metric,
                        target = alert.target,
                        actual = alert.actual,
                        "alert opened"
                    );
                    state.history.push_front(alert.clone());
                    state.history.truncate(self.history_limit);
                    state.active.insert(alert.id.clone(), alert);
                    transitions.opened.push(check.id.clone());
                }
                (false, true) => {
                    let updated = state.active.get_mut(&check.id).map(|alert| {
                        alert.actual = check.observed;
                        alert.message = check.message.clone();
                        alert.updated_at = now;
                        alert.clone()
                    });
                    if let Some(alert) = updated {
                        state.mirror(&alert);
                    }
                    transitions.updated.push(check.id.clone());
                }
                (true, true) => {
                    if let Some(mut alert) = state.active.remove(&check.id) {
                        alert.status = AlertStatus::Resolved;
                        alert.actual = check.observed;
                        alert.updated_at = now;
                        alert.resolved_at = Some(now);
                        info!(alert_id = %alert.id, actual = alert.actual, "alert resolved");
                        state.mirror(&alert);
                    }
                    transitions.resolved.push(check.id.clone());
                }
                (true, false) => {}
            }
        }

        let stale: Vec<String> = state
            .active
            .keys()
            .filter(|id| !evaluation.checks.iter().any(|c| &c.id == *id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(mut alert) = state.active.remove(&id) {
                warn!(alert_id = %id, "dropping alert for check missing from evaluation");
                alert.status = AlertStatus::Resolved;
                alert.updated_at = now;
                alert.resolved_at = Some(now);
                state.mirror(&alert);
            }
            transitions.dropped.push(id);
        }

        transitions
    }

    /// Active alerts ordered by start time, oldest first.
    pub fn active(&self) -> Vec<Alert> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut alerts: Vec<Alert> = state.active.values().cloned().collect();
        alerts.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    /// The `limit` most recently opened alerts, newest first.
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.history.iter().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }
}
