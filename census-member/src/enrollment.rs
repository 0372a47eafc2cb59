//! Enrollment checklist evaluation
//!
//! Evaluation happens in two passes. The consistency pass compares the
//! checklist against what was recorded on the member at enumeration; any
//! mismatch is a [`ValidationError`] the field worker has to fix before the
//! checklist can be saved. The loss pass then runs every eligibility check
//! (no short-circuit) and collects one [`LossReason`] per failed check, in a
//! fixed order.

use crate::eligibility::EligibilityCheck;
use crate::error::ValidationError;
use crate::record::{EnrollmentChecklistRecord, MemberRecord};
use crate::types::{ConfirmParticipation, Gender, StudyResident, YesNo, YesNoNa};
use census_common::EligibilityRules;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator used when loss reasons are stored as one string
pub const LOSS_REASON_DELIMITER: &str = "; ";

/// Raw enrollment checklist answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistAnswers {
    pub report_date: NaiveDate,
    pub dob: NaiveDate,
    pub initials: String,
    pub gender: Gender,
    /// Holds a valid identity document
    pub has_identity: YesNo,
    pub citizen: YesNo,
    /// Legally married to a citizen
    pub legal_marriage: YesNoNa,
    /// Produced a marriage certificate
    pub marriage_certificate: YesNoNa,
    /// Spends 3 or more nights per month in the community
    pub part_time_resident: YesNo,
    /// Confirmed as a member of this household
    pub household_residency: YesNo,
    /// Literate, or a literate witness is available
    pub literacy: YesNo,
    /// Guardian available (minors only)
    pub guardian: YesNoNa,
    pub confirm_participation: ConfirmParticipation,
}

/// Why a screened member failed enrollment
///
/// Declaration order is the evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossReason {
    NoIdentity,
    HouseholdResidency,
    PartTimeResidency,
    NotCitizenNotMarried,
    NoMarriageCertificate,
    Illiterate,
    MinorWithoutGuardian,
    AlreadyEnrolled,
}

impl LossReason {
    /// Human-readable reason, as stored on the loss record
    pub fn message(&self) -> &'static str {
        match self {
            LossReason::NoIdentity => "No valid identity.",
            LossReason::HouseholdResidency => "Failed household residency requirement.",
            LossReason::PartTimeResidency => {
                "Does not spend 3 or more nights per month in the community."
            }
            LossReason::NotCitizenNotMarried => "Not a citizen and not married to a citizen.",
            LossReason::NoMarriageCertificate => {
                "Not a citizen, married to a citizen but does not have a marriage certificate."
            }
            LossReason::Illiterate => "Illiterate with no literate witness.",
            LossReason::MinorWithoutGuardian => "Minor without guardian available.",
            LossReason::AlreadyEnrolled => "Already enrolled.",
        }
    }

    pub fn from_message(message: &str) -> Option<Self> {
        Self::all_variants()
            .iter()
            .copied()
            .find(|r| r.message() == message.trim())
    }

    pub fn all_variants() -> &'static [LossReason] {
        &[
            LossReason::NoIdentity,
            LossReason::HouseholdResidency,
            LossReason::PartTimeResidency,
            LossReason::NotCitizenNotMarried,
            LossReason::NoMarriageCertificate,
            LossReason::Illiterate,
            LossReason::MinorWithoutGuardian,
            LossReason::AlreadyEnrolled,
        ]
    }
}

impl std::fmt::Display for LossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Join reasons for storage
pub fn join_loss_reasons(reasons: &[LossReason]) -> String {
    reasons
        .iter()
        .map(LossReason::message)
        .collect::<Vec<_>>()
        .join(LOSS_REASON_DELIMITER)
}

/// Split a stored reason string back into reasons
///
/// Returns None if any part is not a known reason.
pub fn split_loss_reasons(joined: &str) -> Option<Vec<LossReason>> {
    if joined.trim().is_empty() {
        return Some(Vec::new());
    }
    joined
        .split(LOSS_REASON_DELIMITER.trim())
        .map(LossReason::from_message)
        .collect()
}

/// Result of the loss pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentOutcome {
    /// True exactly when `loss_reasons` is empty
    pub is_eligible: bool,
    pub loss_reasons: Vec<LossReason>,
    pub non_citizen: bool,
}

impl EnrollmentOutcome {
    pub fn joined_loss_reasons(&self) -> String {
        join_loss_reasons(&self.loss_reasons)
    }

    /// Combine with the answers into the record that gets saved
    pub fn into_record(self, answers: ChecklistAnswers) -> EnrollmentChecklistRecord {
        EnrollmentChecklistRecord {
            answers,
            is_eligible: self.is_eligible,
            loss_reasons: self.loss_reasons,
            non_citizen: self.non_citizen,
        }
    }
}

/// Evaluate a checklist under the standard age bounds
pub fn evaluate(
    answers: &ChecklistAnswers,
    member: &MemberRecord,
) -> Result<EnrollmentOutcome, ValidationError> {
    evaluate_with_rules(&EligibilityRules::STANDARD, answers, member)
}

/// Evaluate a checklist against the member it was completed for
pub fn evaluate_with_rules(
    rules: &EligibilityRules,
    answers: &ChecklistAnswers,
    member: &MemberRecord,
) -> Result<EnrollmentOutcome, ValidationError> {
    check_consistency(rules, answers, member)?;

    let minor = rules.is_minor(member.age_in_years);
    let mut loss_reasons = Vec::new();
    let mut non_citizen = false;

    if answers.has_identity == YesNo::No {
        loss_reasons.push(LossReason::NoIdentity);
    }
    // Residency was confirmed in the round the member was cloned from
    if !member.cloned && answers.household_residency == YesNo::No {
        loss_reasons.push(LossReason::HouseholdResidency);
    }
    if !member.cloned && answers.part_time_resident == YesNo::No {
        loss_reasons.push(LossReason::PartTimeResidency);
    }
    if answers.citizen == YesNo::No && answers.legal_marriage == YesNoNa::No {
        loss_reasons.push(LossReason::NotCitizenNotMarried);
        non_citizen = true;
    }
    if answers.citizen == YesNo::No
        && answers.legal_marriage == YesNoNa::Yes
        && answers.marriage_certificate == YesNoNa::No
    {
        loss_reasons.push(LossReason::NoMarriageCertificate);
        non_citizen = true;
    }
    if answers.literacy == YesNo::No {
        loss_reasons.push(LossReason::Illiterate);
    }
    if minor && answers.guardian == YesNoNa::No {
        loss_reasons.push(LossReason::MinorWithoutGuardian);
    }
    if answers.confirm_participation == ConfirmParticipation::Blocked {
        loss_reasons.push(LossReason::AlreadyEnrolled);
    }

    debug!(
        member_id = %member.id,
        reasons = loss_reasons.len(),
        "Evaluated enrollment checklist"
    );

    Ok(EnrollmentOutcome {
        is_eligible: loss_reasons.is_empty(),
        loss_reasons,
        non_citizen,
    })
}

fn check_consistency(
    rules: &EligibilityRules,
    answers: &ChecklistAnswers,
    member: &MemberRecord,
) -> Result<(), ValidationError> {
    let computed = census_common::time::age_in_years(answers.dob, answers.report_date)
        .ok_or(ValidationError::ReportBeforeBirth)?;
    if computed != u32::from(member.age_in_years) {
        return Err(ValidationError::AgeMismatch {
            computed,
            recorded: member.age_in_years,
        });
    }

    if !answers
        .initials
        .trim()
        .eq_ignore_ascii_case(member.initials.trim())
    {
        return Err(ValidationError::InitialsMismatch {
            checklist: answers.initials.clone(),
            member: member.initials.clone(),
        });
    }

    if answers.gender != member.gender {
        return Err(ValidationError::GenderMismatch);
    }

    if member.study_resident != StudyResident::Yes && answers.part_time_resident == YesNo::Yes {
        return Err(ValidationError::ResidencyMismatch);
    }

    let minor = rules.is_minor(member.age_in_years);
    if minor && answers.guardian == YesNoNa::NotApplicable {
        return Err(ValidationError::GuardianAnswer(
            "an answer is required for a minor",
        ));
    }
    if !minor && answers.guardian != YesNoNa::NotApplicable {
        return Err(ValidationError::GuardianAnswer(
            "must be not applicable for an adult",
        ));
    }

    match (answers.citizen, answers.legal_marriage) {
        (YesNo::Yes, YesNoNa::Yes | YesNoNa::No) => {
            return Err(ValidationError::MarriageAnswer(
                "legal marriage must be not applicable for a citizen",
            ));
        }
        (YesNo::No, YesNoNa::NotApplicable) => {
            return Err(ValidationError::MarriageAnswer(
                "legal marriage must be answered for a non-citizen",
            ));
        }
        _ => {}
    }

    let certificate_answered = answers.marriage_certificate != YesNoNa::NotApplicable;
    if answers.legal_marriage == YesNoNa::Yes && !certificate_answered {
        return Err(ValidationError::MarriageAnswer(
            "marriage certificate must be answered when legally married",
        ));
    }
    if answers.legal_marriage != YesNoNa::Yes && certificate_answered {
        return Err(ValidationError::MarriageAnswer(
            "marriage certificate is only asked when legally married",
        ));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Relation;

    pub(crate) fn member(age: u8) -> MemberRecord {
        MemberRecord::new("bhs-year-1", "hh-1", "Kabo", "KM", Gender::Male, Relation::Head, age)
    }

    /// Answers with no disqualifying entries for a member of `age`
    pub(crate) fn passing_answers(age: u8) -> ChecklistAnswers {
        let report_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let dob = NaiveDate::from_ymd_opt(2024 - i32::from(age), 1, 15).unwrap();
        ChecklistAnswers {
            report_date,
            dob,
            initials: "KM".to_string(),
            gender: Gender::Male,
            has_identity: YesNo::Yes,
            citizen: YesNo::Yes,
            legal_marriage: YesNoNa::NotApplicable,
            marriage_certificate: YesNoNa::NotApplicable,
            part_time_resident: YesNo::Yes,
            household_residency: YesNo::Yes,
            literacy: YesNo::Yes,
            guardian: if (16..=17).contains(&age) {
                YesNoNa::Yes
            } else {
                YesNoNa::NotApplicable
            },
            confirm_participation: ConfirmParticipation::NotApplicable,
        }
    }

    #[test]
    fn test_all_passing_answers_are_eligible() {
        let outcome = evaluate(&passing_answers(30), &member(30)).unwrap();
        assert!(outcome.is_eligible);
        assert!(outcome.loss_reasons.is_empty());
        assert!(!outcome.non_citizen);
        assert_eq!(outcome.joined_loss_reasons(), "");
    }

    #[test]
    fn test_non_citizen_not_married() {
        let mut answers = passing_answers(30);
        answers.citizen = YesNo::No;
        answers.legal_marriage = YesNoNa::No;

        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert_eq!(outcome.loss_reasons, vec![LossReason::NotCitizenNotMarried]);
        assert!(outcome.non_citizen);
        assert!(!outcome.is_eligible);
    }

    #[test]
    fn test_non_citizen_married_without_certificate() {
        let mut answers = passing_answers(30);
        answers.citizen = YesNo::No;
        answers.legal_marriage = YesNoNa::Yes;
        answers.marriage_certificate = YesNoNa::No;

        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert_eq!(outcome.loss_reasons, vec![LossReason::NoMarriageCertificate]);
        assert!(outcome.non_citizen);
    }

    #[test]
    fn test_non_citizen_married_with_certificate_passes() {
        let mut answers = passing_answers(30);
        answers.citizen = YesNo::No;
        answers.legal_marriage = YesNoNa::Yes;
        answers.marriage_certificate = YesNoNa::Yes;

        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert!(outcome.is_eligible);
        assert!(!outcome.non_citizen);
    }

    #[test]
    fn test_illiterate() {
        let mut answers = passing_answers(30);
        answers.literacy = YesNo::No;

        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert_eq!(
            outcome.joined_loss_reasons(),
            "Illiterate with no literate witness."
        );
    }

    #[test]
    fn test_multiple_reasons_keep_check_order() {
        let mut answers = passing_answers(17);
        answers.confirm_participation = ConfirmParticipation::Blocked;
        answers.guardian = YesNoNa::No;
        answers.literacy = YesNo::No;
        answers.part_time_resident = YesNo::No;
        answers.has_identity = YesNo::No;

        let outcome = evaluate(&answers, &member(17)).unwrap();
        assert_eq!(
            outcome.loss_reasons,
            vec![
                LossReason::NoIdentity,
                LossReason::PartTimeResidency,
                LossReason::Illiterate,
                LossReason::MinorWithoutGuardian,
                LossReason::AlreadyEnrolled,
            ]
        );
        assert_eq!(
            outcome.joined_loss_reasons(),
            "No valid identity.; Does not spend 3 or more nights per month in the community.; \
             Illiterate with no literate witness.; Minor without guardian available.; Already enrolled."
        );
    }

    #[test]
    fn test_residency_checks_skipped_for_clone() {
        let mut answers = passing_answers(30);
        answers.household_residency = YesNo::No;
        answers.part_time_resident = YesNo::No;

        let mut cloned = member(30);
        cloned.cloned = true;
        let outcome = evaluate(&answers, &cloned).unwrap();
        assert!(outcome.is_eligible);

        let outcome = evaluate(&answers, &member(30)).unwrap();
        assert_eq!(
            outcome.loss_reasons,
            vec![LossReason::HouseholdResidency, LossReason::PartTimeResidency]
        );
    }

    #[test]
    fn test_age_mismatch_is_validation_error() {
        let answers = passing_answers(30);
        let err = evaluate(&answers, &member(31)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::AgeMismatch {
                computed: 30,
                recorded: 31
            }
        );
    }

    #[test]
    fn test_report_before_birth() {
        let mut answers = passing_answers(30);
        answers.report_date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert_eq!(
            evaluate(&answers, &member(30)).unwrap_err(),
            ValidationError::ReportBeforeBirth
        );
    }

    #[test]
    fn test_initials_and_gender_must_match() {
        let mut answers = passing_answers(30);
        answers.initials = "km ".to_string();
        assert!(evaluate(&answers, &member(30)).is_ok(), "case and whitespace ignored");

        answers.initials = "KX".to_string();
        assert!(matches!(
            evaluate(&answers, &member(30)),
            Err(ValidationError::InitialsMismatch { .. })
        ));

        let mut answers = passing_answers(30);
        answers.gender = Gender::Female;
        assert_eq!(
            evaluate(&answers, &member(30)).unwrap_err(),
            ValidationError::GenderMismatch
        );
    }

    #[test]
    fn test_residency_mismatch() {
        let mut non_resident = member(30);
        non_resident.study_resident = StudyResident::No;
        assert_eq!(
            evaluate(&passing_answers(30), &non_resident).unwrap_err(),
            ValidationError::ResidencyMismatch
        );
    }

    #[test]
    fn test_guardian_answer_depends_on_age() {
        let mut answers = passing_answers(16);
        answers.guardian = YesNoNa::NotApplicable;
        assert!(matches!(
            evaluate(&answers, &member(16)),
            Err(ValidationError::GuardianAnswer(_))
        ));

        let mut answers = passing_answers(30);
        answers.guardian = YesNoNa::Yes;
        assert!(matches!(
            evaluate(&answers, &member(30)),
            Err(ValidationError::GuardianAnswer(_))
        ));
    }

    #[test]
    fn test_marriage_answers_consistency() {
        let mut answers = passing_answers(30);
        answers.legal_marriage = YesNoNa::Yes;
        assert!(matches!(
            evaluate(&answers, &member(30)),
            Err(ValidationError::MarriageAnswer(_))
        ));

        let mut answers = passing_answers(30);
        answers.citizen = YesNo::No;
        assert!(matches!(
            evaluate(&answers, &member(30)),
            Err(ValidationError::MarriageAnswer(_))
        ));

        let mut answers = passing_answers(30);
        answers.citizen = YesNo::No;
        answers.legal_marriage = YesNoNa::No;
        answers.marriage_certificate = YesNoNa::Yes;
        assert!(matches!(
            evaluate(&answers, &member(30)),
            Err(ValidationError::MarriageAnswer(_))
        ));
    }

    #[test]
    fn test_split_loss_reasons_reads_back_stored_string() {
        let reasons = vec![LossReason::NoIdentity, LossReason::AlreadyEnrolled];
        let joined = join_loss_reasons(&reasons);
        assert_eq!(split_loss_reasons(&joined), Some(reasons));
        assert_eq!(split_loss_reasons(""), Some(vec![]));
        assert_eq!(split_loss_reasons("Something else."), None);
    }
}
