//! Event system for read-only observers of the queue and engine.
//!
//! [`EventBus`] publishes over a `tokio::sync::broadcast` channel and keeps
//! the most recent events so that a late subscriber can catch up.
//! Jobs are identified by their submission order index.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::ids::{ArtifactId, EventId};
use crate::plan::ResolutionTier;

/// Events kept for late subscribers.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Engine --------------------------------------------------------------
    EngineLoading,
    EngineReady {
        backend: String,
    },
    EngineFailed {
        error: String,
    },

    // -- Job lifecycle -------------------------------------------------------
    JobQueued {
        index: u64,
        file_name: String,
    },
    JobStarted {
        index: u64,
    },
    JobPlanned {
        index: u64,
        duration_secs: f64,
        bitrate_kbps: u32,
        resolution: ResolutionTier,
    },
    JobProgress {
        index: u64,
        progress: u8,
    },
    JobCompleted {
        index: u64,
        artifact_id: ArtifactId,
        size_bytes: u64,
    },
    JobFailed {
        index: u64,
        error: String,
    },
    JobRemoved {
        index: u64,
    },

    // -- Queue ---------------------------------------------------------------
    QueueCleared {
        removed: usize,
    },
    QueueDrained {
        completed: usize,
        failed: usize,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

impl EventPayload {
    /// Index of the job this event concerns, if any.
    pub fn job_index(&self) -> Option<u64> {
        match self {
            EventPayload::JobQueued { index, .. }
            | EventPayload::JobStarted { index }
            | EventPayload::JobPlanned { index, .. }
            | EventPayload::JobProgress { index, .. }
            | EventPayload::JobCompleted { index, .. }
            | EventPayload::JobFailed { index, .. }
            | EventPayload::JobRemoved { index } => Some(*index),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of queue and engine events plus a short history.
///
/// Publishing never blocks and never fails; slow subscribers lag rather than
/// hold up the worker.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    history: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// `capacity` bounds each subscriber's backlog. History is kept
    /// separately and holds at most [`MAX_RECENT_EVENTS`].
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Timestamp `payload`, record it and deliver it to live subscribers.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut history = self.history.write();
            while history.len() >= MAX_RECENT_EVENTS {
                history.pop_back();
            }
            history.push_front(event.clone());
        }

        // Nobody listening is normal for batch runs.
        let _ = self.sender.send(event);
    }

    /// Up to `n` events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.history.read().iter().take(n).cloned().collect()
    }

    /// Retained events for one job, oldest first.
    pub fn job_history(&self, index: u64) -> Vec<Event> {
        let history = self.history.read();
        history
            .iter()
            .rev()
            .filter(|e| e.payload.job_index() == Some(index))
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
