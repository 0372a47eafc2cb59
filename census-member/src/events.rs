//! Member events and the broadcast bus that carries them
//!
//! The coordinator returns the events describing every side effect it
//! performed, in the order performed. `MemberService` publishes them on the
//! [`EventBus`] once the aggregate has been committed.

use crate::enrollment::LossReason;
use crate::status::MemberStatus;
use crate::types::labeled_enum;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

labeled_enum! {
    /// Record types attached to a member besides the checklist
    pub enum SatelliteKind {
        Absentee => "absentee",
        Undecided => "undecided",
        Refusal => "refusal",
        Deceased => "deceased",
        Htc => "htc",
    }
}

/// Side effect of a member operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MemberEvent {
    /// Member first saved
    MemberEnumerated {
        member_id: Uuid,
        household_identifier: String,
        survey: String,
    },

    /// Persisted status changed
    StatusChanged {
        member_id: Uuid,
        /// None on the first save
        from: Option<MemberStatus>,
        to: MemberStatus,
    },

    /// Enrollment checklist saved and evaluated
    ChecklistRecorded { member_id: Uuid, is_eligible: bool },

    /// Checklist and its loss record removed
    ChecklistVoided { member_id: Uuid },

    /// Failed checklist mirrored into an enrollment loss
    LossRecorded {
        member_id: Uuid,
        reasons: Vec<LossReason>,
    },

    /// Stale enrollment loss removed after a passing checklist
    LossCleared { member_id: Uuid },

    SatelliteRecorded { member_id: Uuid, kind: SatelliteKind },

    SatelliteRemoved { member_id: Uuid, kind: SatelliteKind },

    ConsentRecorded { member_id: Uuid },

    /// Member carried forward into a new survey round
    MemberCloned {
        source_id: Uuid,
        member_id: Uuid,
        survey: String,
    },
}

impl MemberEvent {
    /// Event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            MemberEvent::MemberEnumerated { .. } => "MemberEnumerated",
            MemberEvent::StatusChanged { .. } => "StatusChanged",
            MemberEvent::ChecklistRecorded { .. } => "ChecklistRecorded",
            MemberEvent::ChecklistVoided { .. } => "ChecklistVoided",
            MemberEvent::LossRecorded { .. } => "LossRecorded",
            MemberEvent::LossCleared { .. } => "LossCleared",
            MemberEvent::SatelliteRecorded { .. } => "SatelliteRecorded",
            MemberEvent::SatelliteRemoved { .. } => "SatelliteRemoved",
            MemberEvent::ConsentRecorded { .. } => "ConsentRecorded",
            MemberEvent::MemberCloned { .. } => "MemberCloned",
        }
    }

    /// Member the event concerns
    pub fn member_id(&self) -> Uuid {
        match self {
            MemberEvent::MemberEnumerated { member_id, .. }
            | MemberEvent::StatusChanged { member_id, .. }
            | MemberEvent::ChecklistRecorded { member_id, .. }
            | MemberEvent::ChecklistVoided { member_id }
            | MemberEvent::LossRecorded { member_id, .. }
            | MemberEvent::LossCleared { member_id }
            | MemberEvent::SatelliteRecorded { member_id, .. }
            | MemberEvent::SatelliteRemoved { member_id, .. }
            | MemberEvent::ConsentRecorded { member_id }
            | MemberEvent::MemberCloned { member_id, .. } => *member_id,
        }
    }
}

/// Broadcast bus for member events
///
/// Cloning shares the underlying channel. Subscribers only see events
/// emitted after they subscribe; a subscriber that falls more than
/// `capacity` events behind loses the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MemberEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MemberEvent,
    ) -> Result<usize, broadcast::error::SendError<MemberEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MemberEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
