//! Error types for census-member
//!
//! Two failure classes reach callers:
//! - [`ValidationError`]: the submitted data is inconsistent and the field
//!   worker can correct it. Nothing is saved.
//! - [`InvariantViolation`]: the stored flags are in a combination the rules
//!   never produce, or no status rule matched. Indicates a logic bug or
//!   corrupted prior state; the save is aborted.

use crate::status::MemberStatus;
use thiserror::Error;

/// Main error type for census-member
#[derive(Error, Debug)]
pub enum Error {
    /// User-correctable validation failure
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Broken rule-engine contract
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors from the shared census layer
    #[error(transparent)]
    Common(#[from] census_common::Error),

    /// Requested member or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Convenience Result type using census-member Error
pub type Result<T> = std::result::Result<T, Error>;

/// User-correctable inconsistencies in submitted data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("age from date of birth ({computed}) does not match the member's age ({recorded})")]
    AgeMismatch { computed: u32, recorded: u8 },

    #[error("report date precedes date of birth")]
    ReportBeforeBirth,

    #[error("initials '{checklist}' do not match the member's initials '{member}'")]
    InitialsMismatch { checklist: String, member: String },

    #[error("gender on the checklist does not match the member's gender")]
    GenderMismatch,

    #[error("member is not a study resident but the checklist reports part-time residency")]
    ResidencyMismatch,

    #[error("guardian question: {0}")]
    GuardianAnswer(&'static str),

    #[error("marriage questions: {0}")]
    MarriageAnswer(&'static str),

    #[error("member is reported dead but also present today")]
    DeceasedButPresent,

    #[error("age {0} is not a plausible age in years")]
    ImplausibleAge(u8),

    #[error("member is not eligible for screening")]
    NotEligibleForScreening,

    #[error("member has not passed the enrollment checklist")]
    NotEligibleForConsent,

    #[error("member is not eligible for HTC")]
    NotEligibleForHtc,

    #[error("member has already consented")]
    AlreadyConsented,

    #[error("member has refused; remove the refusal first")]
    Refused,

    #[error("status {selected} is not one of the allowed choices")]
    StatusNotAllowed { selected: MemberStatus },

    #[error("a visit entry for {0} already exists")]
    DuplicateVisitDate(chrono::NaiveDate),

    #[error("household roster: {0}")]
    Roster(String),

    #[error("a deceased member cannot be carried into a new survey round")]
    CloneDeceased,
}

/// A rule-engine contract that was broken
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
