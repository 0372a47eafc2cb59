//! Async entry point for member operations
//!
//! Each mutating call loads the member aggregate, runs the coordinator on
//! it, saves the result in one transaction and then publishes the events.
//! When the coordinator fails nothing is written and nothing is published.

use crate::coordinator::MemberCoordinator;
use crate::db;
use crate::enrollment::ChecklistAnswers;
use crate::enumeration::HouseholdRoster;
use crate::error::{Error, Result, ValidationError};
use crate::events::{EventBus, MemberEvent};
use crate::record::{
    DeceasedMember, HtcMember, MemberAggregate, MemberEdit, MemberRecord, RefusedMember, VisitEntry,
};
use crate::status::{member_status_choices, MemberStatus};
use census_common::{CensusConfig, EligibilityRules};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Member operations backed by the census database
#[derive(Clone)]
pub struct MemberService {
    db: Pool<Sqlite>,
    coordinator: MemberCoordinator,
    events: EventBus,
}

impl MemberService {
    pub fn new(db: Pool<Sqlite>, rules: EligibilityRules) -> Self {
        Self {
            db,
            coordinator: MemberCoordinator::new(rules),
            events: EventBus::default(),
        }
    }

    pub fn from_config(db: Pool<Sqlite>, config: &CensusConfig) -> Self {
        Self::new(db, config.eligibility)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }

    /// Enumerate a new member into their household
    ///
    /// The household's first member has to be an eligible head of
    /// household. The member gets its first status here.
    pub async fn enumerate(&self, member: MemberRecord) -> Result<MemberAggregate> {
        if db::is_enumerated(&self.db, member.internal_identifier, &member.survey).await? {
            return Err(ValidationError::Roster(format!(
                "member {} is already enumerated in {}",
                member.internal_identifier, member.survey
            ))
            .into());
        }

        let mut roster = HouseholdRoster::with_rules(
            member.survey.clone(),
            member.household_identifier.clone(),
            *self.coordinator.rules(),
        );
        roster.members =
            db::list_household_members(&self.db, &member.household_identifier, &member.survey)
                .await?;
        roster.add_member(member.clone())?;

        let mut agg = MemberAggregate::new(member);
        let mut events = vec![MemberEvent::MemberEnumerated {
            member_id: agg.id(),
            household_identifier: agg.member.household_identifier.clone(),
            survey: agg.member.survey.clone(),
        }];
        events.extend(self.coordinate(&mut agg, |c, agg| c.save_member(agg, None))?);

        db::save_aggregate(&self.db, &agg).await?;
        info!(
            member_id = %agg.id(),
            household = %agg.member.household_identifier,
            status = ?agg.member.member_status,
            "Enumerated household member"
        );
        self.publish(events);
        Ok(agg)
    }

    pub async fn load(&self, id: Uuid) -> Result<MemberAggregate> {
        db::load_aggregate(&self.db, id).await
    }

    /// Statuses the member may be moved to next
    pub async fn status_choices(&self, id: Uuid) -> Result<Vec<MemberStatus>> {
        let member = db::get_member(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("household member {id}")))?;
        Ok(member_status_choices(&member)?)
    }

    pub async fn save_member(
        &self,
        id: Uuid,
        selected: Option<MemberStatus>,
    ) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_member(agg, selected)).await
    }

    /// Apply edits to the reported attributes and save
    pub async fn update_member(
        &self,
        id: Uuid,
        selected: Option<MemberStatus>,
        edit: MemberEdit,
    ) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.update_member(agg, selected, edit)).await
    }

    pub async fn save_checklist(
        &self,
        id: Uuid,
        answers: ChecklistAnswers,
    ) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_checklist(agg, answers)).await
    }

    pub async fn delete_checklist(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_checklist(agg)).await
    }

    pub async fn save_absence(&self, id: Uuid, entry: VisitEntry) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_absence(agg, entry)).await
    }

    pub async fn save_undecided(&self, id: Uuid, entry: VisitEntry) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_undecided(agg, entry)).await
    }

    pub async fn save_refusal(&self, id: Uuid, refusal: RefusedMember) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_refusal(agg, refusal)).await
    }

    pub async fn save_deceased(
        &self,
        id: Uuid,
        record: DeceasedMember,
    ) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_deceased(agg, record)).await
    }

    pub async fn save_htc(&self, id: Uuid, htc: HtcMember) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.save_htc(agg, htc)).await
    }

    pub async fn record_consent(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.record_consent(agg)).await
    }

    pub async fn delete_absence(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_absence(agg)).await
    }

    pub async fn delete_undecided(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_undecided(agg)).await
    }

    pub async fn delete_refusal(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_refusal(agg)).await
    }

    pub async fn delete_deceased(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_deceased(agg)).await
    }

    pub async fn delete_htc(&self, id: Uuid) -> Result<MemberAggregate> {
        self.run(id, |c, agg| c.delete_htc(agg)).await
    }

    /// Carry a household's living members from one survey round into the next
    ///
    /// Members already enumerated in `to_survey` are left alone. Returns the
    /// newly created members.
    pub async fn clone_household(
        &self,
        household_identifier: &str,
        from_survey: &str,
        to_survey: &str,
        years_elapsed: u8,
    ) -> Result<Vec<MemberAggregate>> {
        let source =
            db::list_household_members(&self.db, household_identifier, from_survey).await?;
        if source.is_empty() {
            return Err(Error::NotFound(format!(
                "household {household_identifier} in {from_survey}"
            )));
        }
        let source_ids: HashMap<Uuid, Uuid> = source
            .iter()
            .map(|m| (m.internal_identifier, m.id))
            .collect();

        let mut roster = HouseholdRoster::with_rules(
            from_survey,
            household_identifier,
            *self.coordinator.rules(),
        );
        roster.members = source;
        let next = roster.clone_into(to_survey, years_elapsed);

        let mut created = Vec::with_capacity(next.members.len());
        for member in next.members {
            if db::is_enumerated(&self.db, member.internal_identifier, to_survey).await? {
                debug!(
                    internal_identifier = %member.internal_identifier,
                    survey = %to_survey,
                    "Member already carried forward"
                );
                continue;
            }

            let mut agg = MemberAggregate::new(member);
            let mut events = Vec::new();
            if let Some(source_id) = source_ids.get(&agg.member.internal_identifier) {
                events.push(MemberEvent::MemberCloned {
                    source_id: *source_id,
                    member_id: agg.id(),
                    survey: to_survey.to_string(),
                });
            }
            events.extend(self.coordinate(&mut agg, |c, agg| c.save_member(agg, None))?);
            db::save_aggregate(&self.db, &agg).await?;
            self.publish(events);
            created.push(agg);
        }

        info!(
            household = %household_identifier,
            from = %from_survey,
            to = %to_survey,
            cloned = created.len(),
            "Carried household into new survey round"
        );
        Ok(created)
    }

    /// Load, coordinate, save, publish
    async fn run<F>(&self, id: Uuid, op: F) -> Result<MemberAggregate>
    where
        F: FnOnce(&MemberCoordinator, &mut MemberAggregate) -> Result<Vec<MemberEvent>>,
    {
        let mut agg = db::load_aggregate(&self.db, id).await?;
        let previous = agg.member.member_status;
        let events = self.coordinate(&mut agg, op)?;

        db::save_aggregate(&self.db, &agg).await?;
        if previous != agg.member.member_status {
            info!(
                member_id = %id,
                from = ?previous,
                to = ?agg.member.member_status,
                "Member status changed"
            );
        }
        self.publish(events);
        Ok(agg)
    }

    fn coordinate<F>(&self, agg: &mut MemberAggregate, op: F) -> Result<Vec<MemberEvent>>
    where
        F: FnOnce(&MemberCoordinator, &mut MemberAggregate) -> Result<Vec<MemberEvent>>,
    {
        op(&self.coordinator, &mut *agg).map_err(|e| {
            match &e {
                Error::Invariant(violation) => {
                    error!(member_id = %agg.id(), "Save aborted: {}", violation)
                }
                other => debug!(member_id = %agg.id(), "Save rejected: {}", other),
            }
            e
        })
    }

    fn publish(&self, events: Vec<MemberEvent>) {
        for event in events {
            self.events.emit_lossy(event);
        }
    }
}
