//! HIV testing and counseling (HTC) referral eligibility
//!
//! HTC is offered to members who cannot take part in the main survey.
//! Rules are evaluated in order and the first match decides.

use crate::record::{EnrollmentChecklistRecord, MemberRecord};
use crate::types::{ConfirmParticipation, InabilityToParticipate};
use census_common::EligibilityRules;

/// HTC eligibility under the standard age bounds
pub fn evaluate_htc(member: &MemberRecord, checklist: Option<&EnrollmentChecklistRecord>) -> bool {
    evaluate_htc_with_rules(&EligibilityRules::STANDARD, member, checklist)
}

/// HTC eligibility
///
/// 1. Older than the screening range and not consented.
/// 2. Not screening-eligible, no inability reason, at least the minimum age.
/// 3. Screening-eligible but refused.
/// 4. Checklist completed and failed: eligible unless the checklist blocked
///    participation.
pub fn evaluate_htc_with_rules(
    rules: &EligibilityRules,
    member: &MemberRecord,
    checklist: Option<&EnrollmentChecklistRecord>,
) -> bool {
    if member.age_in_years > rules.max_age && !member.is_consented {
        return true;
    }

    if !member.eligible_member
        && member.inability_to_participate == InabilityToParticipate::NotApplicable
        && member.age_in_years >= rules.min_age
    {
        return true;
    }

    if member.eligible_member && member.refused {
        return true;
    }

    if member.enrollment_checklist_completed && !member.eligible_subject {
        return checklist
            .map(|c| c.answers.confirm_participation != ConfirmParticipation::Blocked)
            .unwrap_or(true);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::tests::{member, passing_answers};
    use crate::enrollment::{evaluate, LossReason};
    use crate::types::StudyResident;

    fn eligible_member(age: u8) -> MemberRecord {
        let mut m = member(age);
        m.eligible_member = true;
        m
    }

    #[test]
    fn test_older_than_range_and_not_consented() {
        assert!(evaluate_htc(&member(65), None));

        let mut consented = member(70);
        consented.is_consented = true;
        consented.inability_to_participate = InabilityToParticipate::TooSick;
        assert!(!evaluate_htc(&consented, None));
    }

    #[test]
    fn test_not_screening_eligible_but_able() {
        let mut m = member(30);
        m.study_resident = StudyResident::No;
        assert!(evaluate_htc(&m, None));

        m.inability_to_participate = InabilityToParticipate::Incarcerated;
        assert!(!evaluate_htc(&m, None));
    }

    #[test]
    fn test_too_young() {
        assert!(!evaluate_htc(&member(15), None));
        assert!(!evaluate_htc(&member(0), None));
    }

    #[test]
    fn test_eligible_member_only_after_refusal() {
        let mut m = eligible_member(30);
        assert!(!evaluate_htc(&m, None));

        m.refused = true;
        assert!(evaluate_htc(&m, None));
    }

    #[test]
    fn test_failed_checklist() {
        let mut answers = passing_answers(30);
        answers.literacy = crate::types::YesNo::No;
        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert_eq!(outcome.loss_reasons, vec![LossReason::Illiterate]);
        let record = outcome.into_record(answers.clone());

        let mut m = eligible_member(30);
        m.enrollment_checklist_completed = true;
        assert!(evaluate_htc(&m, Some(&record)));

        let mut blocked_answers = answers;
        blocked_answers.confirm_participation = ConfirmParticipation::Blocked;
        let blocked = evaluate(&blocked_answers, &member(30))
            .unwrap()
            .into_record(blocked_answers);
        assert!(!evaluate_htc(&m, Some(&blocked)));
    }

    #[test]
    fn test_passed_checklist_is_not_htc() {
        let mut m = eligible_member(30);
        m.enrollment_checklist_completed = true;
        m.eligible_subject = true;
        assert!(!evaluate_htc(&m, None));
    }
}
