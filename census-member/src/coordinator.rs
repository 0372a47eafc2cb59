//! Keeps a member's satellite records consistent with its status
//!
//! Every operation works on a draft copy of the aggregate. The caller's
//! aggregate is replaced only when the whole operation succeeds, so a
//! validation error or invariant violation leaves it exactly as it was.
//!
//! Operations return the events for the side effects they performed, in
//! order. Persisting the aggregate and publishing the events is left to the
//! caller.

use crate::eligibility::EligibilityCheck;
use crate::enrollment::{self, ChecklistAnswers};
use crate::error::{Result, ValidationError};
use crate::events::{MemberEvent, SatelliteKind};
use crate::htc::evaluate_htc_with_rules;
use crate::record::{
    DeceasedMember, EnrollmentLossRecord, HtcMember, MemberAggregate, MemberEdit, RefusedMember,
    VisitEntry, VisitLog,
};
use crate::status::{member_status, member_status_choices, MemberStatus};
use crate::types::{SurvivalStatus, YesNo};
use census_common::EligibilityRules;
use tracing::debug;

/// Applies member operations and their cascading side effects
#[derive(Debug, Clone, Default)]
pub struct MemberCoordinator {
    rules: EligibilityRules,
}

impl MemberCoordinator {
    pub fn new(rules: EligibilityRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    /// Save the member record with an optional selected status
    ///
    /// Once the member has a status, `selected` must be one of
    /// [`member_status_choices`]. Selecting a status different from the
    /// current one applies that status's transition side effects before the
    /// eligibility flags are refreshed and the status is re-derived. With no
    /// selection the stored status is re-evaluated as if selected again.
    pub fn save_member(
        &self,
        agg: &mut MemberAggregate,
        selected: Option<MemberStatus>,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| self.select_and_persist(draft, selected, events))
    }

    /// Apply corrections to the reported attributes, then save
    pub fn update_member(
        &self,
        agg: &mut MemberAggregate,
        selected: Option<MemberStatus>,
        edit: MemberEdit,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            edit.apply_to(&mut draft.member);
            self.select_and_persist(draft, selected, events)
        })
    }

    /// Record an enrollment checklist
    ///
    /// A failed checklist is mirrored into an enrollment loss record and the
    /// member is set to `NOT_ELIGIBLE` so the loss can be reviewed. A
    /// passing checklist removes any stale loss record.
    pub fn save_checklist(
        &self,
        agg: &mut MemberAggregate,
        answers: ChecklistAnswers,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            require_not_refused(draft)?;
            self.refresh_eligibility(draft);
            if !draft.member.eligible_member {
                return Err(ValidationError::NotEligibleForScreening.into());
            }

            let outcome = enrollment::evaluate_with_rules(&self.rules, &answers, &draft.member)?;
            let member_id = draft.id();
            let is_eligible = outcome.is_eligible;
            let reasons = outcome.loss_reasons.clone();
            let joined = outcome.joined_loss_reasons();
            let report_date = answers.report_date;

            draft.checklist = Some(outcome.into_record(answers));
            draft.member.enrollment_checklist_completed = true;
            draft.member.eligible_subject = is_eligible;
            events.push(MemberEvent::ChecklistRecorded {
                member_id,
                is_eligible,
            });

            if is_eligible {
                if draft.loss.take().is_some() {
                    events.push(MemberEvent::LossCleared { member_id });
                }
                draft.member.enrollment_loss_completed = false;
                self.persist_member(draft, None, events)
            } else {
                draft.loss = Some(EnrollmentLossRecord {
                    report_date,
                    loss_reason: joined,
                });
                draft.member.enrollment_loss_completed = true;
                events.push(MemberEvent::LossRecorded { member_id, reasons });
                self.refresh_eligibility(draft);
                set_status(draft, MemberStatus::NotEligible, events);
                Ok(())
            }
        })
    }

    /// Remove the checklist and its loss record
    ///
    /// The status is not re-derived; save the member afterwards.
    pub fn delete_checklist(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            void_checklist(draft, events);
            Ok(())
        })
    }

    /// Record a visit that found the member absent
    pub fn save_absence(
        &self,
        agg: &mut MemberAggregate,
        entry: VisitEntry,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            self.require_eligible_member(draft)?;
            draft.absentee.get_or_insert_with(VisitLog::default).add(entry)?;
            draft.member.absent = true;
            push_recorded(draft, SatelliteKind::Absentee, events);
            self.persist_member(draft, Some(MemberStatus::Absent), events)
        })
    }

    /// Record a visit where the member had not decided yet
    pub fn save_undecided(
        &self,
        agg: &mut MemberAggregate,
        entry: VisitEntry,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            self.require_eligible_member(draft)?;
            draft.undecided.get_or_insert_with(VisitLog::default).add(entry)?;
            draft.member.undecided = true;
            push_recorded(draft, SatelliteKind::Undecided, events);
            self.persist_member(draft, Some(MemberStatus::Undecided), events)
        })
    }

    pub fn save_refusal(
        &self,
        agg: &mut MemberAggregate,
        refusal: RefusedMember,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            self.require_eligible_member(draft)?;
            if draft.member.is_consented {
                return Err(ValidationError::AlreadyConsented.into());
            }
            draft.refusal = Some(refusal);
            draft.member.refused = true;
            push_recorded(draft, SatelliteKind::Refusal, events);
            self.persist_member(draft, Some(MemberStatus::Refused), events)
        })
    }

    /// Record a death; the member is no longer present
    pub fn save_deceased(
        &self,
        agg: &mut MemberAggregate,
        record: DeceasedMember,
    ) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            draft.deceased = Some(record);
            draft.member.survival_status = SurvivalStatus::Dead;
            draft.member.present_today = YesNo::No;
            push_recorded(draft, SatelliteKind::Deceased, events);
            self.persist_member(draft, Some(MemberStatus::Deceased), events)
        })
    }

    /// Record the outcome of an HTC offer
    pub fn save_htc(&self, agg: &mut MemberAggregate, htc: HtcMember) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            self.refresh_eligibility(draft);
            if !draft.member.eligible_htc {
                return Err(ValidationError::NotEligibleForHtc.into());
            }
            let selected = if htc.accepted {
                draft.member.htc = true;
                draft.member.refused_htc = false;
                MemberStatus::Htc
            } else {
                draft.member.htc = false;
                draft.member.refused_htc = true;
                MemberStatus::RefusedHtc
            };
            draft.htc = Some(htc);
            push_recorded(draft, SatelliteKind::Htc, events);
            self.persist_member(draft, Some(selected), events)
        })
    }

    /// Mark a member who passed the checklist as consented
    pub fn record_consent(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            if !draft.member.eligible_subject {
                return Err(ValidationError::NotEligibleForConsent.into());
            }
            if draft.member.is_consented {
                return Err(ValidationError::AlreadyConsented.into());
            }
            require_not_refused(draft)?;
            draft.member.is_consented = true;
            events.push(MemberEvent::ConsentRecorded {
                member_id: draft.id(),
            });
            self.persist_member(draft, None, events)
        })
    }

    pub fn delete_absence(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            let existed = draft.absentee.take().is_some();
            draft.member.absent = false;
            push_removed(draft, SatelliteKind::Absentee, existed, events);
            self.persist_member(draft, None, events)
        })
    }

    pub fn delete_undecided(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            let existed = draft.undecided.take().is_some();
            draft.member.undecided = false;
            push_removed(draft, SatelliteKind::Undecided, existed, events);
            self.persist_member(draft, None, events)
        })
    }

    /// Remove the refusal
    ///
    /// An HTC outcome recorded on the strength of the refusal goes with it.
    pub fn delete_refusal(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            remove_refusal(draft, events);
            self.refresh_eligibility(draft);
            if !draft.member.eligible_htc {
                remove_htc(draft, events);
            }
            self.persist_member(draft, None, events)
        })
    }

    /// Remove the death record and treat the member as alive again
    pub fn delete_deceased(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            let existed = draft.deceased.take().is_some();
            draft.member.survival_status = SurvivalStatus::Alive;
            push_removed(draft, SatelliteKind::Deceased, existed, events);
            self.persist_member(draft, None, events)
        })
    }

    pub fn delete_htc(&self, agg: &mut MemberAggregate) -> Result<Vec<MemberEvent>> {
        self.apply(agg, |draft, events| {
            remove_htc(draft, events);
            self.persist_member(draft, None, events)
        })
    }

    /// Run `op` on a draft and commit it only on success
    fn apply<F>(&self, agg: &mut MemberAggregate, op: F) -> Result<Vec<MemberEvent>>
    where
        F: FnOnce(&mut MemberAggregate, &mut Vec<MemberEvent>) -> Result<()>,
    {
        let mut draft = agg.clone();
        let mut events = Vec::new();
        op(&mut draft, &mut events)?;
        *agg = draft;
        Ok(events)
    }

    fn select_and_persist(
        &self,
        draft: &mut MemberAggregate,
        selected: Option<MemberStatus>,
        events: &mut Vec<MemberEvent>,
    ) -> Result<()> {
        if let (Some(_), Some(selected)) = (draft.member.member_status, selected) {
            let choices = member_status_choices(&draft.member)?;
            if !choices.contains(&selected) {
                return Err(ValidationError::StatusNotAllowed { selected }.into());
            }
        }
        let selected = selected.or(draft.member.member_status);
        self.persist_member(draft, selected, events)
    }

    /// Validate, apply transition side effects, refresh flags, re-derive
    fn persist_member(
        &self,
        draft: &mut MemberAggregate,
        selected: Option<MemberStatus>,
        events: &mut Vec<MemberEvent>,
    ) -> Result<()> {
        draft.member.validate()?;

        if let Some(selected) = selected {
            if draft.member.member_status != Some(selected) {
                apply_transition(draft, selected, events);
            }
        }

        self.refresh_eligibility(draft);
        let status = member_status(selected, &draft.member)?;
        set_status(draft, status, events);
        Ok(())
    }

    /// Recompute the derived eligibility flags
    ///
    /// HTC eligibility reads `eligible_member`, so it goes last.
    fn refresh_eligibility(&self, draft: &mut MemberAggregate) {
        let member = &mut draft.member;
        member.eligible_member = self.rules.is_eligible_member(
            member.survival_status,
            member.age_in_years,
            member.study_resident,
            member.inability_to_participate,
        );
        member.eligible_hoh = self.rules.is_eligible_hoh(member);
        member.eligible_htc = evaluate_htc_with_rules(&self.rules, member, draft.checklist.as_ref());
    }

    fn require_eligible_member(&self, draft: &mut MemberAggregate) -> Result<()> {
        self.refresh_eligibility(draft);
        if draft.member.eligible_member {
            Ok(())
        } else {
            Err(ValidationError::NotEligibleForScreening.into())
        }
    }
}

/// Side effects of moving into `selected`
fn apply_transition(
    draft: &mut MemberAggregate,
    selected: MemberStatus,
    events: &mut Vec<MemberEvent>,
) {
    debug!(
        member_id = %draft.id(),
        from = ?draft.member.member_status,
        to = %selected,
        "Applying status transition"
    );

    match selected {
        MemberStatus::EligibleForScreening => {
            let member = &mut draft.member;
            member.undecided = false;
            member.absent = false;
            member.htc = false;
            member.refused_htc = false;
            remove_refusal(draft, events);
            void_checklist(draft, events);
            remove_htc(draft, events);
            draft.member.eligible_htc = false;
        }
        MemberStatus::Refused => {
            void_checklist(draft, events);
            draft.member.absent = false;
            draft.member.undecided = false;
        }
        MemberStatus::Absent => {
            draft.member.undecided = false;
            remove_refusal(draft, events);
        }
        MemberStatus::Undecided => {
            draft.member.absent = false;
            remove_refusal(draft, events);
        }
        MemberStatus::Deceased => {
            draft.member.absent = false;
            draft.member.undecided = false;
        }
        _ => {}
    }
}

/// A refused member has to leave REFUSED before screening resumes
fn require_not_refused(draft: &MemberAggregate) -> Result<()> {
    if draft.member.refused || draft.member.member_status == Some(MemberStatus::Refused) {
        Err(ValidationError::Refused.into())
    } else {
        Ok(())
    }
}

fn set_status(draft: &mut MemberAggregate, status: MemberStatus, events: &mut Vec<MemberEvent>) {
    let from = draft.member.member_status;
    if from != Some(status) {
        draft.member.member_status = Some(status);
        events.push(MemberEvent::StatusChanged {
            member_id: draft.id(),
            from,
            to: status,
        });
    }
}

/// Drop the checklist and its loss record, clearing the checklist flags
fn void_checklist(draft: &mut MemberAggregate, events: &mut Vec<MemberEvent>) {
    let had_checklist = draft.checklist.take().is_some();
    let had_loss = draft.loss.take().is_some();
    draft.member.enrollment_checklist_completed = false;
    draft.member.enrollment_loss_completed = false;
    draft.member.eligible_subject = false;
    if had_checklist || had_loss {
        events.push(MemberEvent::ChecklistVoided {
            member_id: draft.id(),
        });
    }
}

fn remove_refusal(draft: &mut MemberAggregate, events: &mut Vec<MemberEvent>) {
    let existed = draft.refusal.take().is_some();
    draft.member.refused = false;
    push_removed(draft, SatelliteKind::Refusal, existed, events);
}

fn remove_htc(draft: &mut MemberAggregate, events: &mut Vec<MemberEvent>) {
    let existed = draft.htc.take().is_some();
    draft.member.htc = false;
    draft.member.refused_htc = false;
    push_removed(draft, SatelliteKind::Htc, existed, events);
}

fn push_recorded(draft: &MemberAggregate, kind: SatelliteKind, events: &mut Vec<MemberEvent>) {
    events.push(MemberEvent::SatelliteRecorded {
        member_id: draft.id(),
        kind,
    });
}

fn push_removed(
    draft: &MemberAggregate,
    kind: SatelliteKind,
    existed: bool,
    events: &mut Vec<MemberEvent>,
) {
    if existed {
        events.push(MemberEvent::SatelliteRemoved {
            member_id: draft.id(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::tests::{member, passing_answers};
    use crate::enrollment::LossReason;
    use crate::error::Error;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn saved(age: u8) -> MemberAggregate {
        let mut agg = MemberAggregate::new(member(age));
        MemberCoordinator::default().save_member(&mut agg, None).unwrap();
        agg
    }

    fn visit(d: NaiveDate) -> VisitEntry {
        VisitEntry {
            report_date: d,
            reason: "gone to cattle post".to_string(),
            next_appointment: Some(d.succ_opt().unwrap()),
        }
    }

    #[test]
    fn test_first_save_derives_status() {
        let coordinator = MemberCoordinator::default();
        let mut agg = MemberAggregate::new(member(30));
        let events = coordinator.save_member(&mut agg, None).unwrap();

        assert!(agg.member.eligible_member);
        assert!(agg.member.eligible_hoh);
        assert!(!agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
        assert_eq!(
            events,
            vec![MemberEvent::StatusChanged {
                member_id: agg.id(),
                from: None,
                to: MemberStatus::EligibleForScreening,
            }]
        );
    }

    #[test]
    fn test_dead_and_present_rejected_without_changes() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let before = agg.clone();
        agg.member.survival_status = SurvivalStatus::Dead;
        let snapshot = agg.clone();

        let err = coordinator.save_member(&mut agg, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DeceasedButPresent)
        ));
        assert_eq!(agg, snapshot);
        assert_ne!(agg, before);
    }

    #[test]
    fn test_selected_status_must_be_a_choice() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let err = coordinator
            .save_member(&mut agg, Some(MemberStatus::Bhs))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::StatusNotAllowed {
                selected: MemberStatus::Bhs
            })
        ));
    }

    #[test]
    fn test_checklist_for_minor_below_range_rejected() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(15);
        assert!(!agg.member.eligible_member);
        let err = coordinator
            .save_checklist(&mut agg, passing_answers(15))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NotEligibleForScreening)
        ));
        assert!(agg.checklist.is_none());
    }

    #[test]
    fn test_passing_checklist() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator.save_checklist(&mut agg, passing_answers(30)).unwrap();

        assert!(agg.member.enrollment_checklist_completed);
        assert!(agg.member.eligible_subject);
        assert!(agg.loss.is_none());
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForConsent));
    }

    #[test]
    fn test_failing_checklist_creates_loss() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let mut answers = passing_answers(30);
        answers.literacy = YesNo::No;
        let events = coordinator.save_checklist(&mut agg, answers).unwrap();

        assert!(!agg.member.eligible_subject);
        assert!(agg.member.enrollment_loss_completed);
        assert!(agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::NotEligible));
        assert_eq!(
            agg.loss.as_ref().unwrap().loss_reason,
            "Illiterate with no literate witness."
        );
        assert!(events.contains(&MemberEvent::LossRecorded {
            member_id: agg.id(),
            reasons: vec![LossReason::Illiterate],
        }));

        // The next plain save moves the member onto the HTC track
        coordinator.save_member(&mut agg, None).unwrap();
        assert_eq!(agg.member.member_status, Some(MemberStatus::HtcEligible));
    }

    #[test]
    fn test_passing_checklist_clears_stale_loss() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let mut answers = passing_answers(30);
        answers.has_identity = YesNo::No;
        coordinator.save_checklist(&mut agg, answers).unwrap();
        assert!(agg.loss.is_some());

        let events = coordinator.save_checklist(&mut agg, passing_answers(30)).unwrap();
        assert!(agg.loss.is_none());
        assert!(!agg.member.enrollment_loss_completed);
        assert!(events.contains(&MemberEvent::LossCleared { member_id: agg.id() }));
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForConsent));
    }

    #[test]
    fn test_delete_checklist_keeps_status() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let mut answers = passing_answers(30);
        answers.literacy = YesNo::No;
        coordinator.save_checklist(&mut agg, answers).unwrap();

        coordinator.delete_checklist(&mut agg).unwrap();
        assert!(agg.checklist.is_none());
        assert!(agg.loss.is_none());
        assert!(!agg.member.enrollment_checklist_completed);
        assert!(!agg.member.enrollment_loss_completed);
        assert_eq!(agg.member.member_status, Some(MemberStatus::NotEligible));
    }

    #[test]
    fn test_refusal_voids_checklist() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator.save_checklist(&mut agg, passing_answers(30)).unwrap();

        coordinator.save_member(&mut agg, Some(MemberStatus::Refused)).unwrap();
        assert!(agg.checklist.is_none());
        assert!(!agg.member.enrollment_checklist_completed);
        assert!(!agg.member.eligible_subject);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Refused));
    }

    #[test]
    fn test_save_refusal_sets_flag_and_htc_eligibility() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .save_refusal(
                &mut agg,
                RefusedMember {
                    refusal_date: date(2024, 6, 2),
                    reason: "not interested".to_string(),
                },
            )
            .unwrap();
        assert!(agg.member.refused);
        assert!(agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Refused));

        coordinator.delete_refusal(&mut agg).unwrap();
        assert!(agg.refusal.is_none());
        assert!(!agg.member.refused);
        assert!(!agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
    }

    #[test]
    fn test_rescreening_clears_everything() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .save_refusal(
                &mut agg,
                RefusedMember {
                    refusal_date: date(2024, 6, 2),
                    reason: "busy".to_string(),
                },
            )
            .unwrap();

        let events = coordinator
            .save_member(&mut agg, Some(MemberStatus::EligibleForScreening))
            .unwrap();
        assert!(agg.refusal.is_none());
        assert!(!agg.member.refused);
        assert!(!agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
        assert!(events.contains(&MemberEvent::SatelliteRemoved {
            member_id: agg.id(),
            kind: SatelliteKind::Refusal,
        }));
    }

    #[test]
    fn test_rescreening_from_htc_voids_checklist_and_htc() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let mut answers = passing_answers(30);
        answers.literacy = YesNo::No;
        coordinator.save_checklist(&mut agg, answers).unwrap();
        coordinator
            .save_htc(
                &mut agg,
                HtcMember {
                    report_date: date(2024, 6, 3),
                    accepted: true,
                    referred: true,
                },
            )
            .unwrap();
        assert_eq!(agg.member.member_status, Some(MemberStatus::Htc));

        let events = coordinator
            .save_member(&mut agg, Some(MemberStatus::EligibleForScreening))
            .unwrap();
        assert!(agg.checklist.is_none());
        assert!(agg.loss.is_none());
        assert!(agg.htc.is_none());
        assert!(!agg.member.enrollment_checklist_completed);
        assert!(!agg.member.enrollment_loss_completed);
        assert!(!agg.member.eligible_subject);
        assert!(!agg.member.eligible_htc);
        assert!(!agg.member.htc);
        assert!(!agg.member.refused_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
        assert!(events.contains(&MemberEvent::ChecklistVoided { member_id: agg.id() }));
        assert!(events.contains(&MemberEvent::SatelliteRemoved {
            member_id: agg.id(),
            kind: SatelliteKind::Htc,
        }));
    }

    #[test]
    fn test_checklist_rejected_while_refused() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .save_refusal(
                &mut agg,
                RefusedMember {
                    refusal_date: date(2024, 6, 2),
                    reason: "not interested".to_string(),
                },
            )
            .unwrap();
        let before = agg.clone();

        let err = coordinator
            .save_checklist(&mut agg, passing_answers(30))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Refused)));
        assert_eq!(agg, before);
        assert!(matches!(
            coordinator.record_consent(&mut agg).unwrap_err(),
            Error::Validation(_)
        ));

        // Leaving REFUSED lets screening resume
        coordinator.delete_refusal(&mut agg).unwrap();
        coordinator.save_checklist(&mut agg, passing_answers(30)).unwrap();
        coordinator.record_consent(&mut agg).unwrap();
        assert!(agg.member.is_consented);
        assert!(!agg.member.refused);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Bhs));
    }

    #[test]
    fn test_checklist_rejected_after_refused_selection() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .save_member(&mut agg, Some(MemberStatus::Refused))
            .unwrap();
        let err = coordinator
            .save_checklist(&mut agg, passing_answers(30))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Refused)));
    }

    #[test]
    fn test_deleting_refusal_drops_htc_outcome() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .save_refusal(
                &mut agg,
                RefusedMember {
                    refusal_date: date(2024, 6, 2),
                    reason: "busy".to_string(),
                },
            )
            .unwrap();
        coordinator
            .save_htc(
                &mut agg,
                HtcMember {
                    report_date: date(2024, 6, 2),
                    accepted: true,
                    referred: false,
                },
            )
            .unwrap();
        assert!(agg.member.htc);

        let events = coordinator.delete_refusal(&mut agg).unwrap();
        assert!(agg.htc.is_none());
        assert!(!agg.member.htc);
        assert!(!agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
        assert!(events.contains(&MemberEvent::SatelliteRemoved {
            member_id: agg.id(),
            kind: SatelliteKind::Htc,
        }));
    }

    #[test]
    fn test_plain_save_keeps_selected_status() {
        let coordinator = MemberCoordinator::default();
        for selected in [
            MemberStatus::Undecided,
            MemberStatus::Absent,
            MemberStatus::Refused,
        ] {
            let mut agg = saved(30);
            coordinator.save_member(&mut agg, Some(selected)).unwrap();
            assert_eq!(agg.member.member_status, Some(selected));

            let events = coordinator.save_member(&mut agg, None).unwrap();
            assert_eq!(agg.member.member_status, Some(selected));
            assert!(events.is_empty());

            coordinator
                .update_member(
                    &mut agg,
                    None,
                    MemberEdit {
                        first_name: Some("Kabelo".to_string()),
                        ..Default::default()
                    },
                )
                .unwrap();
            assert_eq!(agg.member.first_name, "Kabelo");
            assert_eq!(agg.member.member_status, Some(selected));
        }
    }

    #[test]
    fn test_update_member_refreshes_eligibility() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator
            .update_member(
                &mut agg,
                None,
                MemberEdit {
                    age_in_years: Some(70),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!agg.member.eligible_member);
        assert!(agg.member.eligible_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::HtcEligible));

        let before = agg.clone();
        let err = coordinator
            .update_member(
                &mut agg,
                None,
                MemberEdit {
                    survival_status: Some(SurvivalStatus::Dead),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DeceasedButPresent)
        ));
        assert_eq!(agg, before);
    }

    #[test]
    fn test_absent_then_undecided() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator.save_absence(&mut agg, visit(date(2024, 6, 1))).unwrap();
        coordinator.save_absence(&mut agg, visit(date(2024, 6, 3))).unwrap();
        assert_eq!(agg.absentee.as_ref().unwrap().entries.len(), 2);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Absent));

        let err = coordinator
            .save_absence(&mut agg, visit(date(2024, 6, 3)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DuplicateVisitDate(_))
        ));

        coordinator.save_undecided(&mut agg, visit(date(2024, 6, 5))).unwrap();
        assert!(!agg.member.absent);
        assert!(agg.member.undecided);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Undecided));

        coordinator.delete_undecided(&mut agg).unwrap();
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
    }

    #[test]
    fn test_absence_requires_eligible_member() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(12);
        assert!(coordinator
            .save_absence(&mut agg, visit(date(2024, 6, 1)))
            .is_err());
        assert!(agg.absentee.is_none());
    }

    #[test]
    fn test_deceased_is_absorbing_until_removed() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        coordinator.save_absence(&mut agg, visit(date(2024, 6, 1))).unwrap();
        coordinator
            .save_deceased(
                &mut agg,
                DeceasedMember {
                    death_date: date(2024, 5, 20),
                    cause: None,
                },
            )
            .unwrap();
        assert_eq!(agg.member.member_status, Some(MemberStatus::Deceased));
        assert!(!agg.member.absent);
        assert!(!agg.member.eligible_member);
        assert_eq!(agg.member.present_today, YesNo::No);

        coordinator.delete_deceased(&mut agg).unwrap();
        assert_eq!(agg.member.survival_status, SurvivalStatus::Alive);
        assert_eq!(agg.member.member_status, Some(MemberStatus::EligibleForScreening));
    }

    #[test]
    fn test_htc_for_older_member() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(70);
        assert_eq!(agg.member.member_status, Some(MemberStatus::HtcEligible));

        let offer = |accepted| HtcMember {
            report_date: date(2024, 6, 1),
            accepted,
            referred: false,
        };
        coordinator.save_htc(&mut agg, offer(false)).unwrap();
        assert!(agg.member.refused_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::RefusedHtc));

        coordinator.save_htc(&mut agg, offer(true)).unwrap();
        assert!(agg.member.htc);
        assert!(!agg.member.refused_htc);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Htc));

        coordinator.delete_htc(&mut agg).unwrap();
        assert_eq!(agg.member.member_status, Some(MemberStatus::HtcEligible));
    }

    #[test]
    fn test_htc_requires_eligibility() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        let err = coordinator
            .save_htc(
                &mut agg,
                HtcMember {
                    report_date: date(2024, 6, 1),
                    accepted: true,
                    referred: true,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NotEligibleForHtc)
        ));
    }

    #[test]
    fn test_consent() {
        let coordinator = MemberCoordinator::default();
        let mut agg = saved(30);
        assert!(coordinator.record_consent(&mut agg).is_err());

        coordinator.save_checklist(&mut agg, passing_answers(30)).unwrap();
        coordinator.record_consent(&mut agg).unwrap();
        assert!(agg.member.is_consented);
        assert_eq!(agg.member.member_status, Some(MemberStatus::Bhs));

        let err = coordinator
            .save_refusal(
                &mut agg,
                RefusedMember {
                    refusal_date: date(2024, 6, 2),
                    reason: "changed mind".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::AlreadyConsented)
        ));
    }

    #[test]
    fn test_configured_rules_apply() {
        let coordinator = MemberCoordinator::new(EligibilityRules {
            min_age: 18,
            max_age: 49,
            minor_max_age: 18,
            hoh_min_age: 18,
        });
        let mut agg = MemberAggregate::new(member(17));
        coordinator.save_member(&mut agg, None).unwrap();
        assert!(!agg.member.eligible_member);
        assert_eq!(agg.member.member_status, Some(MemberStatus::NotEligible));
    }
}
