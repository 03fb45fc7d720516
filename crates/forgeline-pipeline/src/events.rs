//! Per-run event log.
//!
//! Progress is an explicit handle owned by one run and passed to every
//! stage, not ambient process-wide state. Events are append-only and
//! sequence-numbered for auditability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forgeline_core::domain::state::Stage;

/// Event kinds recorded over a run's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StageStarted,
    StageCompleted,
    StageFailed,
    RepairApplied,
    RunFinished,
}

/// One recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,

    /// Stage the event belongs to.
    pub stage: Stage,

    /// Event kind.
    pub kind: EventKind,

    /// Structured detail payload.
    pub detail: serde_json::Value,

    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

/// Append-only event log for one run.
#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: Uuid,
    events: Vec<RunEvent>,
    next_seq: u64,
}

impl RunLog {
    /// Create an empty log for a run.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            events: Vec::new(),
            next_seq: 1,
        }
    }

    /// The owning run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append an event.
    pub fn record(&mut self, stage: Stage, kind: EventKind, detail: serde_json::Value) {
        self.events.push(RunEvent {
            seq: self.next_seq,
            stage,
            kind,
            detail,
            at: Utc::now(),
        });
        self.next_seq += 1;
    }

    /// All recorded events, in order.
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Consume the log, returning the events.
    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }
}
