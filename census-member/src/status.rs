//! Member status derivation
//!
//! `member_status` folds the member's flags and the status the field worker
//! selected into the single status label the rest of the system reads.
//! `member_status_choices` gives the statuses the worker may select next.
//!
//! Both are pure functions of the member record. Neither ever falls back to
//! a default: a flag combination the rules do not cover is reported as an
//! [`InvariantViolation`].

use crate::error::InvariantViolation;
use crate::record::MemberRecord;
use crate::types::{labeled_enum, SurvivalStatus};
use tracing::debug;

labeled_enum! {
    /// Canonical member status
    pub enum MemberStatus {
        /// Passed the enrollment checklist, awaiting consent
        EligibleForConsent => "BHS_ELIGIBLE",
        /// Eligible member, not yet screened
        EligibleForScreening => "BHS_SCREEN",
        /// Consented in the current round
        Bhs => "BHS",
        /// Consented, carried into a follow-up round
        Annual => "ANNUAL",
        Absent => "ABSENT",
        Undecided => "UNDECIDED",
        Refused => "REFUSED",
        NotEligible => "NOT_ELIGIBLE",
        Htc => "HTC",
        HtcEligible => "HTC_ELIGIBLE",
        RefusedHtc => "REFUSED_HTC",
        Deceased => "DECEASED",
        /// Screened and found ineligible
        BhsLoss => "BHS_LOSS",
    }
}

impl MemberStatus {
    /// Statuses on the HTC referral track
    pub fn is_htc_track(&self) -> bool {
        matches!(
            self,
            MemberStatus::Htc | MemberStatus::HtcEligible | MemberStatus::RefusedHtc
        )
    }
}

/// Reject flag combinations the rules never produce
fn check_flag_consistency(member: &MemberRecord) -> Result<(), InvariantViolation> {
    if member.eligible_subject && !member.enrollment_checklist_completed {
        return Err(InvariantViolation::new(format!(
            "member {} is eligible_subject without a completed enrollment checklist",
            member.id
        )));
    }
    if member.eligible_subject && member.enrollment_loss_completed {
        return Err(InvariantViolation::new(format!(
            "member {} is eligible_subject but has an enrollment loss",
            member.id
        )));
    }
    if member.is_consented && member.refused {
        return Err(InvariantViolation::new(format!(
            "member {} is both consented and refused",
            member.id
        )));
    }
    if member.htc && member.refused_htc {
        return Err(InvariantViolation::new(format!(
            "member {} both accepted and refused HTC",
            member.id
        )));
    }
    Ok(())
}

/// Derive the member's status
///
/// Rules in order; the first that applies decides:
/// 1. Deceased (selected, or survival status dead) absorbs everything.
/// 2. Consented and not absent: `ANNUAL` if consented in an earlier round,
///    else `BHS`.
/// 3. Passed the enrollment checklist: `BHS_ELIGIBLE`.
/// 4. Undecided, absent, refused (selected or flagged, in that order).
///    Absent degrades to `NOT_ELIGIBLE` for a member not eligible for
///    screening.
/// 5. HTC track: accepted, refused, or selected while HTC eligible.
/// 6. Screened and lost: `HTC_ELIGIBLE` when HTC eligible, else `BHS_LOSS`.
/// 7. Eligibility: screening only, HTC only, or neither.
pub fn member_status(
    selected: Option<MemberStatus>,
    member: &MemberRecord,
) -> Result<MemberStatus, InvariantViolation> {
    check_flag_consistency(member)?;

    let status = derive_status(selected, member)?;
    debug!(
        member_id = %member.id,
        selected = ?selected,
        status = %status,
        "Derived member status"
    );
    Ok(status)
}

fn derive_status(
    selected: Option<MemberStatus>,
    member: &MemberRecord,
) -> Result<MemberStatus, InvariantViolation> {
    use MemberStatus::*;

    let selected_is = |status: MemberStatus| selected == Some(status);

    if selected_is(Deceased) || member.survival_status == SurvivalStatus::Dead {
        return Ok(Deceased);
    }

    if member.is_consented && !member.absent {
        return Ok(if member.consented_in_previous_round {
            Annual
        } else {
            Bhs
        });
    }

    if member.eligible_subject {
        return Ok(EligibleForConsent);
    }

    if selected_is(Undecided) || member.undecided {
        return Ok(Undecided);
    }
    if selected_is(Absent) || member.absent {
        return Ok(if member.eligible_member {
            Absent
        } else {
            NotEligible
        });
    }
    if selected_is(Refused) || member.refused {
        return Ok(Refused);
    }

    if member.htc || (selected_is(Htc) && member.eligible_htc) {
        return Ok(Htc);
    }
    if member.refused_htc || (selected_is(RefusedHtc) && member.eligible_htc) {
        return Ok(RefusedHtc);
    }
    if selected_is(HtcEligible) && member.eligible_htc {
        return Ok(HtcEligible);
    }

    if member.enrollment_loss_completed {
        return Ok(if member.eligible_htc {
            HtcEligible
        } else {
            BhsLoss
        });
    }

    match (member.eligible_member, member.eligible_htc) {
        (true, false) => Ok(EligibleForScreening),
        (false, true) => Ok(HtcEligible),
        (false, false) => Ok(NotEligible),
        (true, true) => Err(InvariantViolation::new(format!(
            "member {} is eligible for screening and HTC with no refusal or enrollment loss",
            member.id
        ))),
    }
}

/// Statuses the field worker may select next, sorted by label
///
/// The current status is always included.
pub fn member_status_choices(
    member: &MemberRecord,
) -> Result<Vec<MemberStatus>, InvariantViolation> {
    use MemberStatus::*;

    let current = member.member_status.ok_or_else(|| {
        InvariantViolation::new(format!(
            "member {} has no status; save it before offering choices",
            member.id
        ))
    })?;

    let mut options: Vec<MemberStatus> = if member.survival_status == SurvivalStatus::Dead {
        vec![Deceased]
    } else if member.is_consented {
        let enrolled = if member.consented_in_previous_round {
            Annual
        } else {
            Bhs
        };
        vec![enrolled, Absent]
    } else if member.eligible_member {
        let mut options = vec![
            Absent,
            Undecided,
            Refused,
            EligibleForScreening,
            EligibleForConsent,
            NotEligible,
            HtcEligible,
            Htc,
            RefusedHtc,
            Deceased,
        ];
        if !member.eligible_subject {
            options.retain(|s| *s != EligibleForConsent);
        } else {
            options.retain(|s| *s != NotEligible && !s.is_htc_track());
        }
        if !member.eligible_htc {
            options.retain(|s| !s.is_htc_track());
        }
        if member.refused {
            options.retain(|s| !matches!(s, Absent | Undecided | EligibleForConsent));
        }
        if member.enrollment_loss_completed {
            options.push(BhsLoss);
        }
        options
    } else if member.eligible_htc {
        let mut options = vec![HtcEligible, Htc, RefusedHtc, NotEligible, Deceased];
        if member.refused_htc {
            options.retain(|s| *s != Htc);
        }
        if member.htc {
            options.retain(|s| *s != RefusedHtc);
        }
        options
    } else {
        vec![NotEligible, Deceased]
    };

    options.push(current);
    options.sort_by_key(|s| s.as_str());
    options.dedup();
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Gender, Relation, YesNo};
    use MemberStatus::*;

    fn member() -> MemberRecord {
        MemberRecord::new("bhs-year-1", "hh-1", "Kabo", "KM", Gender::Male, Relation::Head, 30)
    }

    fn eligible() -> MemberRecord {
        let mut m = member();
        m.eligible_member = true;
        m
    }

    #[test]
    fn test_labels_sort_lexically() {
        let mut all = MemberStatus::all_variants().to_vec();
        all.sort_by_key(|s| s.as_str());
        assert_eq!(all.first(), Some(&Absent));
        assert_eq!(all.last(), Some(&Undecided));
    }

    #[test]
    fn test_deceased_absorbs_everything() {
        let mut m = eligible();
        m.eligible_subject = true;
        m.enrollment_checklist_completed = true;
        m.is_consented = true;
        assert_eq!(member_status(Some(Deceased), &m), Ok(Deceased));

        m.survival_status = SurvivalStatus::Dead;
        m.present_today = YesNo::No;
        assert_eq!(member_status(Some(Absent), &m), Ok(Deceased));
        assert_eq!(member_status(None, &m), Ok(Deceased));
    }

    #[test]
    fn test_consented_current_and_previous_round() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.eligible_subject = true;
        m.is_consented = true;
        assert_eq!(member_status(None, &m), Ok(Bhs));

        m.consented_in_previous_round = true;
        assert_eq!(member_status(None, &m), Ok(Annual));
    }

    #[test]
    fn test_consented_but_absent_is_absent() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.is_consented = true;
        m.absent = true;
        assert_eq!(member_status(None, &m), Ok(Absent));
    }

    #[test]
    fn test_eligible_subject_awaits_consent() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.eligible_subject = true;
        assert_eq!(member_status(Some(Refused), &m), Ok(EligibleForConsent));
    }

    #[test]
    fn test_decided_states_in_order() {
        let mut m = eligible();
        assert_eq!(member_status(Some(Undecided), &m), Ok(Undecided));
        assert_eq!(member_status(Some(Absent), &m), Ok(Absent));
        assert_eq!(member_status(Some(Refused), &m), Ok(Refused));

        m.undecided = true;
        m.absent = true;
        assert_eq!(member_status(Some(Refused), &m), Ok(Undecided));
    }

    #[test]
    fn test_absent_degrades_when_not_eligible() {
        let m = member();
        assert_eq!(member_status(Some(Absent), &m), Ok(NotEligible));
    }

    #[test]
    fn test_htc_track() {
        let mut m = member();
        m.eligible_htc = true;
        assert_eq!(member_status(None, &m), Ok(HtcEligible));
        assert_eq!(member_status(Some(Htc), &m), Ok(Htc));
        assert_eq!(member_status(Some(RefusedHtc), &m), Ok(RefusedHtc));

        m.htc = true;
        assert_eq!(member_status(None, &m), Ok(Htc));

        m.htc = false;
        m.refused_htc = true;
        assert_eq!(member_status(None, &m), Ok(RefusedHtc));
    }

    #[test]
    fn test_htc_selection_ignored_without_eligibility() {
        let m = eligible();
        assert_eq!(member_status(Some(Htc), &m), Ok(EligibleForScreening));
    }

    #[test]
    fn test_enrollment_loss() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.enrollment_loss_completed = true;
        assert_eq!(member_status(None, &m), Ok(BhsLoss));

        m.eligible_htc = true;
        assert_eq!(member_status(None, &m), Ok(HtcEligible));
    }

    #[test]
    fn test_plain_eligibility() {
        assert_eq!(member_status(None, &eligible()), Ok(EligibleForScreening));
        assert_eq!(member_status(None, &member()), Ok(NotEligible));
    }

    #[test]
    fn test_unmatched_state_is_invariant_violation() {
        let mut m = eligible();
        m.eligible_htc = true;
        assert!(member_status(None, &m).is_err());
    }

    #[test]
    fn test_inconsistent_flags_rejected() {
        let mut m = eligible();
        m.eligible_subject = true;
        assert!(member_status(None, &m).is_err(), "eligible_subject without checklist");

        let mut m = eligible();
        m.is_consented = true;
        m.refused = true;
        assert!(member_status(None, &m).is_err());

        let mut m = member();
        m.eligible_htc = true;
        m.htc = true;
        m.refused_htc = true;
        assert!(member_status(None, &m).is_err());
    }

    #[test]
    fn test_idempotent() {
        let mut m = eligible();
        m.absent = true;
        let first = member_status(Some(Absent), &m);
        let second = member_status(Some(Absent), &m);
        assert_eq!(first, second);
    }

    #[test]
    fn test_choices_require_saved_status() {
        assert!(member_status_choices(&eligible()).is_err());
    }

    #[test]
    fn test_choices_for_fresh_eligible_member() {
        let mut m = eligible();
        m.member_status = Some(EligibleForScreening);
        assert_eq!(
            member_status_choices(&m).unwrap(),
            vec![Absent, EligibleForScreening, Deceased, NotEligible, Refused, Undecided]
        );
    }

    #[test]
    fn test_choices_for_eligible_subject() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.eligible_subject = true;
        m.member_status = Some(EligibleForConsent);
        assert_eq!(
            member_status_choices(&m).unwrap(),
            vec![Absent, EligibleForConsent, EligibleForScreening, Deceased, Refused, Undecided]
        );
    }

    #[test]
    fn test_choices_after_refusal_offer_htc() {
        let mut m = eligible();
        m.refused = true;
        m.eligible_htc = true;
        m.member_status = Some(Refused);
        assert_eq!(
            member_status_choices(&m).unwrap(),
            vec![EligibleForScreening, Deceased, Htc, HtcEligible, NotEligible, Refused, RefusedHtc]
        );
    }

    #[test]
    fn test_choices_after_enrollment_loss() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.enrollment_loss_completed = true;
        m.member_status = Some(NotEligible);
        let choices = member_status_choices(&m).unwrap();
        assert!(choices.contains(&BhsLoss));
        assert!(!choices.contains(&EligibleForConsent));
    }

    #[test]
    fn test_choices_for_htc_only_member() {
        let mut m = member();
        m.eligible_htc = true;
        m.htc = true;
        m.member_status = Some(Htc);
        assert_eq!(
            member_status_choices(&m).unwrap(),
            vec![Deceased, Htc, HtcEligible, NotEligible]
        );
    }

    #[test]
    fn test_choices_for_ineligible_and_dead() {
        let mut m = member();
        m.member_status = Some(NotEligible);
        assert_eq!(member_status_choices(&m).unwrap(), vec![Deceased, NotEligible]);

        m.survival_status = SurvivalStatus::Dead;
        m.member_status = Some(Deceased);
        assert_eq!(member_status_choices(&m).unwrap(), vec![Deceased]);
    }

    #[test]
    fn test_choices_for_consented() {
        let mut m = eligible();
        m.enrollment_checklist_completed = true;
        m.eligible_subject = true;
        m.is_consented = true;
        m.consented_in_previous_round = true;
        m.member_status = Some(Annual);
        assert_eq!(member_status_choices(&m).unwrap(), vec![Absent, Annual]);
    }
}
