//! household_member queries

use crate::error::{Error, Result};
use crate::record::MemberRecord;
use crate::status::MemberStatus;
use crate::types::{
    Gender, InabilityToParticipate, Relation, StudyResident, SurvivalStatus, YesNo,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, Transaction};
use uuid::Uuid;

const MEMBER_COLUMNS: &str = "id, internal_identifier, subject_identifier, survey, \
    household_identifier, first_name, initials, gender, relation, age_in_years, \
    survival_status, study_resident, inability_to_participate, present_today, \
    eligible_member, eligible_subject, eligible_htc, eligible_hoh, is_consented, \
    enrollment_checklist_completed, enrollment_loss_completed, refused, undecided, \
    absent, htc, refused_htc, member_status, cloned, consented_in_previous_round";

/// Insert the member, or update every column of an existing row
pub(crate) async fn upsert_member(
    tx: &mut Transaction<'_, Sqlite>,
    member: &MemberRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO household_member (
            id, internal_identifier, subject_identifier, survey,
            household_identifier, first_name, initials, gender, relation, age_in_years,
            survival_status, study_resident, inability_to_participate, present_today,
            eligible_member, eligible_subject, eligible_htc, eligible_hoh, is_consented,
            enrollment_checklist_completed, enrollment_loss_completed, refused, undecided,
            absent, htc, refused_htc, member_status, cloned, consented_in_previous_round
        )
        VALUES (
            ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?,
            ?, ?, ?, ?,
            ?, ?, ?, ?, ?,
            ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?
        )
        ON CONFLICT(id) DO UPDATE SET
            subject_identifier = excluded.subject_identifier,
            first_name = excluded.first_name,
            initials = excluded.initials,
            gender = excluded.gender,
            relation = excluded.relation,
            age_in_years = excluded.age_in_years,
            survival_status = excluded.survival_status,
            study_resident = excluded.study_resident,
            inability_to_participate = excluded.inability_to_participate,
            present_today = excluded.present_today,
            eligible_member = excluded.eligible_member,
            eligible_subject = excluded.eligible_subject,
            eligible_htc = excluded.eligible_htc,
            eligible_hoh = excluded.eligible_hoh,
            is_consented = excluded.is_consented,
            enrollment_checklist_completed = excluded.enrollment_checklist_completed,
            enrollment_loss_completed = excluded.enrollment_loss_completed,
            refused = excluded.refused,
            undecided = excluded.undecided,
            absent = excluded.absent,
            htc = excluded.htc,
            refused_htc = excluded.refused_htc,
            member_status = excluded.member_status,
            cloned = excluded.cloned,
            consented_in_previous_round = excluded.consented_in_previous_round,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(member.id.to_string())
    .bind(member.internal_identifier.to_string())
    .bind(&member.subject_identifier)
    .bind(&member.survey)
    .bind(&member.household_identifier)
    .bind(&member.first_name)
    .bind(&member.initials)
    .bind(member.gender.as_str())
    .bind(member.relation.as_str())
    .bind(i64::from(member.age_in_years))
    .bind(member.survival_status.as_str())
    .bind(member.study_resident.as_str())
    .bind(member.inability_to_participate.as_str())
    .bind(member.present_today.as_str())
    .bind(member.eligible_member)
    .bind(member.eligible_subject)
    .bind(member.eligible_htc)
    .bind(member.eligible_hoh)
    .bind(member.is_consented)
    .bind(member.enrollment_checklist_completed)
    .bind(member.enrollment_loss_completed)
    .bind(member.refused)
    .bind(member.undecided)
    .bind(member.absent)
    .bind(member.htc)
    .bind(member.refused_htc)
    .bind(member.member_status.map(|s| s.as_str()))
    .bind(member.cloned)
    .bind(member.consented_in_previous_round)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Get a member by row id
pub async fn get_member(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<MemberRecord>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM household_member WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    row.as_ref().map(member_from_row).transpose()
}

/// Members of one household in one survey round, in enumeration order
pub async fn list_household_members(
    db: &Pool<Sqlite>,
    household_identifier: &str,
    survey: &str,
) -> Result<Vec<MemberRecord>> {
    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM household_member \
         WHERE household_identifier = ? AND survey = ? ORDER BY rowid"
    );
    let rows = sqlx::query(&sql)
        .bind(household_identifier)
        .bind(survey)
        .fetch_all(db)
        .await?;

    rows.iter().map(member_from_row).collect()
}

/// Whether the person already has a row in `survey`
pub async fn is_enumerated(
    db: &Pool<Sqlite>,
    internal_identifier: Uuid,
    survey: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM household_member WHERE internal_identifier = ? AND survey = ?",
    )
    .bind(internal_identifier.to_string())
    .bind(survey)
    .fetch_one(db)
    .await?;

    Ok(count > 0)
}

fn member_from_row(row: &SqliteRow) -> Result<MemberRecord> {
    let age: i64 = row.get("age_in_years");
    let age_in_years = u8::try_from(age)
        .map_err(|_| Error::Decode(format!("age_in_years out of range: {age}")))?;

    let member_status = row
        .get::<Option<String>, _>("member_status")
        .map(|s| label(&s, "member_status", MemberStatus::from_str))
        .transpose()?;

    Ok(MemberRecord {
        id: uuid_column(row, "id")?,
        internal_identifier: uuid_column(row, "internal_identifier")?,
        subject_identifier: row.get("subject_identifier"),
        survey: row.get("survey"),
        household_identifier: row.get("household_identifier"),
        first_name: row.get("first_name"),
        initials: row.get("initials"),
        gender: label_column(row, "gender", Gender::from_str)?,
        relation: label_column(row, "relation", Relation::from_str)?,
        age_in_years,
        survival_status: label_column(row, "survival_status", SurvivalStatus::from_str)?,
        study_resident: label_column(row, "study_resident", StudyResident::from_str)?,
        inability_to_participate: label_column(
            row,
            "inability_to_participate",
            InabilityToParticipate::from_str,
        )?,
        present_today: label_column(row, "present_today", YesNo::from_str)?,
        eligible_member: row.get("eligible_member"),
        eligible_subject: row.get("eligible_subject"),
        eligible_htc: row.get("eligible_htc"),
        eligible_hoh: row.get("eligible_hoh"),
        is_consented: row.get("is_consented"),
        enrollment_checklist_completed: row.get("enrollment_checklist_completed"),
        enrollment_loss_completed: row.get("enrollment_loss_completed"),
        refused: row.get("refused"),
        undecided: row.get("undecided"),
        absent: row.get("absent"),
        htc: row.get("htc"),
        refused_htc: row.get("refused_htc"),
        member_status,
        cloned: row.get("cloned"),
        consented_in_previous_round: row.get("consented_in_previous_round"),
    })
}

pub(crate) fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    Uuid::parse_str(&value).map_err(|e| Error::Decode(format!("{column} '{value}': {e}")))
}

/// Read a stored enum label
pub(crate) fn label_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    let value: String = row.get(column);
    label(&value, column, parse)
}

fn label<T>(value: &str, column: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| Error::Decode(format!("unknown {column} '{value}'")))
}
