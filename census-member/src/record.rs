//! Member record, its satellite records, and the aggregate saved as a unit

use crate::enrollment::{ChecklistAnswers, LossReason};
use crate::error::ValidationError;
use crate::status::MemberStatus;
use crate::types::{
    Gender, InabilityToParticipate, Relation, StudyResident, SurvivalStatus, YesNo,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Oldest age accepted at enumeration
pub const MAX_PLAUSIBLE_AGE: u8 = 120;

/// One person in one survey round
///
/// Reported attributes are edited by field workers; the derived flags below
/// them are only written by the evaluators and the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Row identifier for this survey round
    pub id: Uuid,
    /// Identifies the person across survey rounds
    pub internal_identifier: Uuid,
    /// Study subject identifier, assigned at consent
    pub subject_identifier: Option<String>,
    pub survey: String,
    pub household_identifier: String,
    pub first_name: String,
    pub initials: String,
    pub gender: Gender,
    pub relation: Relation,
    /// 0 means the age is unknown
    pub age_in_years: u8,
    pub survival_status: SurvivalStatus,
    pub study_resident: StudyResident,
    pub inability_to_participate: InabilityToParticipate,
    pub present_today: YesNo,

    pub eligible_member: bool,
    pub eligible_subject: bool,
    pub eligible_htc: bool,
    pub eligible_hoh: bool,
    pub is_consented: bool,
    pub enrollment_checklist_completed: bool,
    pub enrollment_loss_completed: bool,
    pub refused: bool,
    pub undecided: bool,
    pub absent: bool,
    pub htc: bool,
    pub refused_htc: bool,
    /// None until the first save
    pub member_status: Option<MemberStatus>,

    /// Carried forward from an earlier survey round
    pub cloned: bool,
    /// Consented in any earlier survey round
    pub consented_in_previous_round: bool,
}

impl MemberRecord {
    /// Freshly enumerated member
    ///
    /// Defaults to alive, study resident, able to participate and present
    /// today. Derived flags are all false until the first save.
    pub fn new(
        survey: impl Into<String>,
        household_identifier: impl Into<String>,
        first_name: impl Into<String>,
        initials: impl Into<String>,
        gender: Gender,
        relation: Relation,
        age_in_years: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            internal_identifier: Uuid::new_v4(),
            subject_identifier: None,
            survey: survey.into(),
            household_identifier: household_identifier.into(),
            first_name: first_name.into(),
            initials: initials.into(),
            gender,
            relation,
            age_in_years,
            survival_status: SurvivalStatus::Alive,
            study_resident: StudyResident::Yes,
            inability_to_participate: InabilityToParticipate::NotApplicable,
            present_today: YesNo::Yes,
            eligible_member: false,
            eligible_subject: false,
            eligible_htc: false,
            eligible_hoh: false,
            is_consented: false,
            enrollment_checklist_completed: false,
            enrollment_loss_completed: false,
            refused: false,
            undecided: false,
            absent: false,
            htc: false,
            refused_htc: false,
            member_status: None,
            cloned: false,
            consented_in_previous_round: false,
        }
    }

    /// Check reported attributes for contradictions
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.survival_status == SurvivalStatus::Dead && self.present_today == YesNo::Yes {
            return Err(ValidationError::DeceasedButPresent);
        }
        if self.age_in_years > MAX_PLAUSIBLE_AGE {
            return Err(ValidationError::ImplausibleAge(self.age_in_years));
        }
        Ok(())
    }

    /// Reset everything that only holds for a single survey round
    pub(crate) fn clear_round_flags(&mut self) {
        self.eligible_member = false;
        self.eligible_subject = false;
        self.eligible_htc = false;
        self.eligible_hoh = false;
        self.is_consented = false;
        self.enrollment_checklist_completed = false;
        self.enrollment_loss_completed = false;
        self.refused = false;
        self.undecided = false;
        self.absent = false;
        self.htc = false;
        self.refused_htc = false;
        self.member_status = None;
    }
}

/// Field worker corrections to a member's reported attributes
///
/// Only the fields that are `Some` are changed. Derived flags and the status
/// cannot be set this way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberEdit {
    pub first_name: Option<String>,
    pub initials: Option<String>,
    pub gender: Option<Gender>,
    pub relation: Option<Relation>,
    pub age_in_years: Option<u8>,
    pub survival_status: Option<SurvivalStatus>,
    pub study_resident: Option<StudyResident>,
    pub inability_to_participate: Option<InabilityToParticipate>,
    pub present_today: Option<YesNo>,
}

impl MemberEdit {
    pub fn apply_to(self, member: &mut MemberRecord) {
        if let Some(first_name) = self.first_name {
            member.first_name = first_name;
        }
        if let Some(initials) = self.initials {
            member.initials = initials;
        }
        if let Some(gender) = self.gender {
            member.gender = gender;
        }
        if let Some(relation) = self.relation {
            member.relation = relation;
        }
        if let Some(age) = self.age_in_years {
            member.age_in_years = age;
        }
        if let Some(status) = self.survival_status {
            member.survival_status = status;
        }
        if let Some(resident) = self.study_resident {
            member.study_resident = resident;
        }
        if let Some(inability) = self.inability_to_participate {
            member.inability_to_participate = inability;
        }
        if let Some(present) = self.present_today {
            member.present_today = present;
        }
    }
}

/// Saved enrollment checklist with its evaluated outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentChecklistRecord {
    pub answers: ChecklistAnswers,
    pub is_eligible: bool,
    /// In rule order, first failed check first
    pub loss_reasons: Vec<LossReason>,
    pub non_citizen: bool,
}

/// System record mirroring a failed enrollment checklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentLossRecord {
    pub report_date: NaiveDate,
    pub loss_reason: String,
}

/// One visit attempt for an absent or undecided member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEntry {
    pub report_date: NaiveDate,
    pub reason: String,
    pub next_appointment: Option<NaiveDate>,
}

/// Visit attempts recorded against an absent or undecided member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitLog {
    /// Ordered by report date
    pub entries: Vec<VisitEntry>,
}

impl VisitLog {
    /// Add an entry, keeping report-date order
    ///
    /// Only one entry per report date.
    pub fn add(&mut self, entry: VisitEntry) -> Result<(), ValidationError> {
        if self.entries.iter().any(|e| e.report_date == entry.report_date) {
            return Err(ValidationError::DuplicateVisitDate(entry.report_date));
        }
        let pos = self
            .entries
            .partition_point(|e| e.report_date < entry.report_date);
        self.entries.insert(pos, entry);
        Ok(())
    }

    pub fn latest(&self) -> Option<&VisitEntry> {
        self.entries.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefusedMember {
    pub refusal_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeceasedMember {
    pub death_date: NaiveDate,
    pub cause: Option<String>,
}

/// HTC offer outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtcMember {
    pub report_date: NaiveDate,
    /// Accepted testing and counseling; false records a refusal
    pub accepted: bool,
    pub referred: bool,
}

/// A member together with every record hanging off it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAggregate {
    pub member: MemberRecord,
    pub checklist: Option<EnrollmentChecklistRecord>,
    pub loss: Option<EnrollmentLossRecord>,
    pub absentee: Option<VisitLog>,
    pub undecided: Option<VisitLog>,
    pub refusal: Option<RefusedMember>,
    pub deceased: Option<DeceasedMember>,
    pub htc: Option<HtcMember>,
}

impl MemberAggregate {
    pub fn new(member: MemberRecord) -> Self {
        Self {
            member,
            checklist: None,
            loss: None,
            absentee: None,
            undecided: None,
            refusal: None,
            deceased: None,
            htc: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.member.id
    }
}
