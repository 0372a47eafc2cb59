//! Household roster and carrying members into a new survey round

use crate::eligibility::EligibilityCheck;
use crate::error::ValidationError;
use crate::record::MemberRecord;
use crate::types::{Relation, SurvivalStatus};
use census_common::EligibilityRules;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Members enumerated in one household for one survey round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRoster {
    pub survey: String,
    pub household_identifier: String,
    /// In enumeration order; the head of household comes first
    pub members: Vec<MemberRecord>,
    #[serde(skip, default)]
    rules: EligibilityRules,
}

impl HouseholdRoster {
    pub fn new(survey: impl Into<String>, household_identifier: impl Into<String>) -> Self {
        Self::with_rules(survey, household_identifier, EligibilityRules::default())
    }

    pub fn with_rules(
        survey: impl Into<String>,
        household_identifier: impl Into<String>,
        rules: EligibilityRules,
    ) -> Self {
        Self {
            survey: survey.into(),
            household_identifier: household_identifier.into(),
            members: Vec::new(),
            rules,
        }
    }

    /// Enumerate a member into the household
    ///
    /// The head of household has to be confirmed before anyone else is
    /// added, and there can only be one.
    pub fn add_member(&mut self, member: MemberRecord) -> Result<&MemberRecord, ValidationError> {
        if member.survey != self.survey {
            return Err(ValidationError::Roster(format!(
                "member belongs to survey '{}', roster is for '{}'",
                member.survey, self.survey
            )));
        }
        if member.household_identifier != self.household_identifier {
            return Err(ValidationError::Roster(format!(
                "member belongs to household '{}', roster is for '{}'",
                member.household_identifier, self.household_identifier
            )));
        }

        if self.members.is_empty() {
            if !self.rules.is_eligible_hoh(&member) {
                return Err(ValidationError::Roster(
                    "the first member must be an eligible head of household".to_string(),
                ));
            }
        } else if member.relation == Relation::Head {
            return Err(ValidationError::Roster(
                "household already has a head".to_string(),
            ));
        }

        if self
            .members
            .iter()
            .any(|m| m.internal_identifier == member.internal_identifier)
        {
            return Err(ValidationError::Roster(format!(
                "member {} is already enumerated",
                member.internal_identifier
            )));
        }

        debug!(
            household = %self.household_identifier,
            member_id = %member.id,
            relation = %member.relation,
            "Enumerated household member"
        );
        self.members.push(member);
        Ok(&self.members[self.members.len() - 1])
    }

    pub fn head(&self) -> Option<&MemberRecord> {
        self.members.iter().find(|m| m.relation == Relation::Head)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Carry every living member into `survey`
    ///
    /// Members are cloned directly, so a roster whose head has died keeps
    /// its remaining members.
    pub fn clone_into(&self, survey: &str, years_elapsed: u8) -> HouseholdRoster {
        let members = self
            .members
            .iter()
            .filter(|m| m.survival_status != SurvivalStatus::Dead)
            .filter_map(|m| clone_for_round(m, survey, years_elapsed).ok())
            .collect();
        HouseholdRoster {
            survey: survey.to_string(),
            household_identifier: self.household_identifier.clone(),
            members,
            rules: self.rules,
        }
    }
}

/// Copy a member into a new survey round
///
/// Identity and reported attributes carry over with the age advanced by
/// `years_elapsed`. Round-specific flags and the status are cleared; they
/// are derived again on the first save in the new round.
pub fn clone_for_round(
    member: &MemberRecord,
    survey: &str,
    years_elapsed: u8,
) -> Result<MemberRecord, ValidationError> {
    if member.survival_status == SurvivalStatus::Dead {
        return Err(ValidationError::CloneDeceased);
    }

    let mut clone = member.clone();
    clone.id = Uuid::new_v4();
    clone.survey = survey.to_string();
    clone.age_in_years = member.age_in_years.saturating_add(years_elapsed);
    clone.cloned = true;
    clone.consented_in_previous_round = member.is_consented || member.consented_in_previous_round;
    clone.clear_round_flags();
    Ok(clone)
}
