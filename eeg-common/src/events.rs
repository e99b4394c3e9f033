//! Event types for the pipeline event system
//!
//! Job lifecycle and import notifications are broadcast over an [`EventBus`].
//! Publishing never blocks and never fails the operation that emits it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::JobStatus;

/// Pipeline event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Job moved between lifecycle states
    JobStatusChanged {
        job_id: Uuid,
        old_status: JobStatus,
        new_status: JobStatus,
        timestamp: DateTime<Utc>,
    },

    /// Job progress advanced (0-100)
    JobProgress {
        job_id: Uuid,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Background metadata validation finished for a submitted file
    MetadataValidated {
        job_id: Uuid,
        validated: bool,
        validation_error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Time-series import finished (possibly partially)
    ImportCompleted {
        subject_label: String,
        rows_read: u64,
        rows_accepted: u64,
        rows_rejected: u64,
        rows_inserted: u64,
        batches_failed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Job the event belongs to, if any
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            PipelineEvent::JobStatusChanged { job_id, .. }
            | PipelineEvent::JobProgress { job_id, .. }
            | PipelineEvent::MetadataValidated { job_id, .. } => Some(*job_id),
            PipelineEvent::ImportCompleted { .. } => None,
        }
    }
}

/// Broadcast bus for [`PipelineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning how many subscribers received it (0 when none)
    pub fn emit(&self, event: PipelineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
