//! Screening eligibility of a household member
//!
//! `eligible_member` is a pure function of survival status, age, residency
//! and ability to participate. It is recomputed on every member save and
//! never set any other way.

use crate::record::MemberRecord;
use crate::types::{InabilityToParticipate, Relation, StudyResident, SurvivalStatus};
use census_common::EligibilityRules;

/// Whether a member is eligible for study screening under the standard rules
///
/// Equivalent to `EligibilityRules::STANDARD.is_eligible_member(..)`.
pub fn is_eligible_member(
    survival_status: SurvivalStatus,
    age_in_years: u8,
    study_resident: StudyResident,
    inability_to_participate: InabilityToParticipate,
) -> bool {
    EligibilityRules::STANDARD.is_eligible_member(
        survival_status,
        age_in_years,
        study_resident,
        inability_to_participate,
    )
}

/// Eligibility checks parameterized by the configured age bounds
pub trait EligibilityCheck {
    /// Screening eligibility
    ///
    /// False for a dead member regardless of the other inputs. Otherwise the
    /// age must lie within the inclusive bounds, the member must be a study
    /// resident ("does not want to answer" counts as not resident) and no
    /// inability reason may be selected.
    fn is_eligible_member(
        &self,
        survival_status: SurvivalStatus,
        age_in_years: u8,
        study_resident: StudyResident,
        inability_to_participate: InabilityToParticipate,
    ) -> bool;

    /// Age range requiring a guardian on the enrollment checklist
    fn is_minor(&self, age_in_years: u8) -> bool;

    /// Whether the member can act as the household's head respondent
    fn is_eligible_hoh(&self, member: &MemberRecord) -> bool;
}

impl EligibilityCheck for EligibilityRules {
    fn is_eligible_member(
        &self,
        survival_status: SurvivalStatus,
        age_in_years: u8,
        study_resident: StudyResident,
        inability_to_participate: InabilityToParticipate,
    ) -> bool {
        if survival_status == SurvivalStatus::Dead {
            return false;
        }
        (self.min_age..=self.max_age).contains(&age_in_years)
            && study_resident == StudyResident::Yes
            && inability_to_participate == InabilityToParticipate::NotApplicable
    }

    fn is_minor(&self, age_in_years: u8) -> bool {
        (self.min_age..=self.minor_max_age).contains(&age_in_years)
    }

    fn is_eligible_hoh(&self, member: &MemberRecord) -> bool {
        member.relation == Relation::Head
            && member.survival_status != SurvivalStatus::Dead
            && member.age_in_years >= self.hoh_min_age
    }
}
