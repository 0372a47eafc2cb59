//! # Census Member Engine
//!
//! Eligibility and participation status of household members:
//! - Screening, enrollment and HTC eligibility evaluation
//! - Member status derivation and the statuses a worker may select next
//! - Coordination of checklist, loss and satellite records on each save
//! - Household roster and carrying members into a new survey round
//! - Persistence of the member aggregate and event publication

pub mod coordinator;
pub mod db;
pub mod eligibility;
pub mod enrollment;
pub mod enumeration;
pub mod error;
pub mod events;
pub mod htc;
pub mod record;
pub mod service;
pub mod status;
pub mod types;

pub use coordinator::MemberCoordinator;
pub use eligibility::{is_eligible_member, EligibilityCheck};
pub use enrollment::{evaluate, ChecklistAnswers, EnrollmentOutcome, LossReason};
pub use enumeration::{clone_for_round, HouseholdRoster};
pub use error::{Error, InvariantViolation, Result, ValidationError};
pub use events::{EventBus, MemberEvent, SatelliteKind};
pub use htc::evaluate_htc;
pub use record::{
    DeceasedMember, EnrollmentChecklistRecord, EnrollmentLossRecord, HtcMember, MemberAggregate,
    MemberEdit, MemberRecord, RefusedMember, VisitEntry, VisitLog,
};
pub use service::MemberService;
pub use status::{member_status, member_status_choices, MemberStatus};
pub use types::{
    ConfirmParticipation, Gender, InabilityToParticipate, Relation, StudyResident,
    SurvivalStatus, YesNo, YesNoNa,
};
