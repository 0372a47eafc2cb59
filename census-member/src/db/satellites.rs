//! Checklist, loss and satellite record queries
//!
//! Each record is one row keyed by `household_member_id`. Saving writes the
//! records present on the aggregate and deletes the ones that are absent.

use super::members::label_column;
use crate::enrollment::{join_loss_reasons, split_loss_reasons, ChecklistAnswers};
use crate::error::{Error, Result};
use crate::record::{
    DeceasedMember, EnrollmentChecklistRecord, EnrollmentLossRecord, HtcMember, MemberAggregate,
    RefusedMember, VisitEntry, VisitLog,
};
use crate::types::{ConfirmParticipation, Gender, YesNo, YesNoNa};
use sqlx::{Pool, Row, Sqlite, Transaction};
use uuid::Uuid;

/// Tables holding per-visit logs
#[derive(Debug, Clone, Copy)]
enum VisitTable {
    Absentee,
    Undecided,
}

impl VisitTable {
    fn parent(&self) -> &'static str {
        match self {
            VisitTable::Absentee => "subject_absentee",
            VisitTable::Undecided => "subject_undecided",
        }
    }

    fn entries(&self) -> &'static str {
        match self {
            VisitTable::Absentee => "subject_absentee_entry",
            VisitTable::Undecided => "subject_undecided_entry",
        }
    }
}

/// Write every record hanging off the member
pub(crate) async fn save_satellites(
    tx: &mut Transaction<'_, Sqlite>,
    agg: &MemberAggregate,
) -> Result<()> {
    let id = agg.id().to_string();

    match &agg.checklist {
        Some(checklist) => upsert_checklist(tx, &id, checklist).await?,
        None => delete_row(tx, "enrollment_checklist", &id).await?,
    }

    match &agg.loss {
        Some(loss) => {
            sqlx::query(
                r#"
                INSERT INTO enrollment_loss (household_member_id, report_date, loss_reason)
                VALUES (?, ?, ?)
                ON CONFLICT(household_member_id) DO UPDATE SET
                    report_date = excluded.report_date,
                    loss_reason = excluded.loss_reason
                "#,
            )
            .bind(&id)
            .bind(loss.report_date)
            .bind(&loss.loss_reason)
            .execute(&mut **tx)
            .await?;
        }
        None => delete_row(tx, "enrollment_loss", &id).await?,
    }

    save_visit_log(tx, VisitTable::Absentee, &id, agg.absentee.as_ref()).await?;
    save_visit_log(tx, VisitTable::Undecided, &id, agg.undecided.as_ref()).await?;

    match &agg.refusal {
        Some(refusal) => {
            sqlx::query(
                r#"
                INSERT INTO subject_refusal (household_member_id, refusal_date, reason)
                VALUES (?, ?, ?)
                ON CONFLICT(household_member_id) DO UPDATE SET
                    refusal_date = excluded.refusal_date,
                    reason = excluded.reason
                "#,
            )
            .bind(&id)
            .bind(refusal.refusal_date)
            .bind(&refusal.reason)
            .execute(&mut **tx)
            .await?;
        }
        None => delete_row(tx, "subject_refusal", &id).await?,
    }

    match &agg.deceased {
        Some(deceased) => {
            sqlx::query(
                r#"
                INSERT INTO deceased_member (household_member_id, death_date, cause)
                VALUES (?, ?, ?)
                ON CONFLICT(household_member_id) DO UPDATE SET
                    death_date = excluded.death_date,
                    cause = excluded.cause
                "#,
            )
            .bind(&id)
            .bind(deceased.death_date)
            .bind(&deceased.cause)
            .execute(&mut **tx)
            .await?;
        }
        None => delete_row(tx, "deceased_member", &id).await?,
    }

    match &agg.htc {
        Some(htc) => {
            sqlx::query(
                r#"
                INSERT INTO htc_member (household_member_id, report_date, accepted, referred)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(household_member_id) DO UPDATE SET
                    report_date = excluded.report_date,
                    accepted = excluded.accepted,
                    referred = excluded.referred
                "#,
            )
            .bind(&id)
            .bind(htc.report_date)
            .bind(htc.accepted)
            .bind(htc.referred)
            .execute(&mut **tx)
            .await?;
        }
        None => delete_row(tx, "htc_member", &id).await?,
    }

    Ok(())
}

/// Load every record hanging off the member into `agg`
pub(crate) async fn load_satellites(db: &Pool<Sqlite>, agg: &mut MemberAggregate) -> Result<()> {
    let id = agg.id();
    agg.checklist = load_checklist(db, id).await?;

    agg.loss = sqlx::query(
        "SELECT report_date, loss_reason FROM enrollment_loss WHERE household_member_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?
    .map(|row| EnrollmentLossRecord {
        report_date: row.get("report_date"),
        loss_reason: row.get("loss_reason"),
    });

    agg.absentee = load_visit_log(db, VisitTable::Absentee, id).await?;
    agg.undecided = load_visit_log(db, VisitTable::Undecided, id).await?;

    agg.refusal = sqlx::query(
        "SELECT refusal_date, reason FROM subject_refusal WHERE household_member_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?
    .map(|row| RefusedMember {
        refusal_date: row.get("refusal_date"),
        reason: row.get("reason"),
    });

    agg.deceased = sqlx::query(
        "SELECT death_date, cause FROM deceased_member WHERE household_member_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?
    .map(|row| DeceasedMember {
        death_date: row.get("death_date"),
        cause: row.get("cause"),
    });

    agg.htc = sqlx::query(
        "SELECT report_date, accepted, referred FROM htc_member WHERE household_member_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?
    .map(|row| HtcMember {
        report_date: row.get("report_date"),
        accepted: row.get("accepted"),
        referred: row.get("referred"),
    });

    Ok(())
}

async fn upsert_checklist(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    checklist: &EnrollmentChecklistRecord,
) -> Result<()> {
    let answers = &checklist.answers;
    sqlx::query(
        r#"
        INSERT INTO enrollment_checklist (
            household_member_id, report_date, dob, initials, gender,
            has_identity, citizen, legal_marriage, marriage_certificate,
            part_time_resident, household_residency, literacy, guardian,
            confirm_participation, is_eligible, loss_reason, non_citizen
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(household_member_id) DO UPDATE SET
            report_date = excluded.report_date,
            dob = excluded.dob,
            initials = excluded.initials,
            gender = excluded.gender,
            has_identity = excluded.has_identity,
            citizen = excluded.citizen,
            legal_marriage = excluded.legal_marriage,
            marriage_certificate = excluded.marriage_certificate,
            part_time_resident = excluded.part_time_resident,
            household_residency = excluded.household_residency,
            literacy = excluded.literacy,
            guardian = excluded.guardian,
            confirm_participation = excluded.confirm_participation,
            is_eligible = excluded.is_eligible,
            loss_reason = excluded.loss_reason,
            non_citizen = excluded.non_citizen
        "#,
    )
    .bind(id)
    .bind(answers.report_date)
    .bind(answers.dob)
    .bind(&answers.initials)
    .bind(answers.gender.as_str())
    .bind(answers.has_identity.as_str())
    .bind(answers.citizen.as_str())
    .bind(answers.legal_marriage.as_str())
    .bind(answers.marriage_certificate.as_str())
    .bind(answers.part_time_resident.as_str())
    .bind(answers.household_residency.as_str())
    .bind(answers.literacy.as_str())
    .bind(answers.guardian.as_str())
    .bind(answers.confirm_participation.as_str())
    .bind(checklist.is_eligible)
    .bind(join_loss_reasons(&checklist.loss_reasons))
    .bind(checklist.non_citizen)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn load_checklist(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<EnrollmentChecklistRecord>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT report_date, dob, initials, gender,
               has_identity, citizen, legal_marriage, marriage_certificate,
               part_time_resident, household_residency, literacy, guardian,
               confirm_participation, is_eligible, loss_reason, non_citizen
        FROM enrollment_checklist
        WHERE household_member_id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?
    else {
        return Ok(None);
    };

    let answers = ChecklistAnswers {
        report_date: row.get("report_date"),
        dob: row.get("dob"),
        initials: row.get("initials"),
        gender: label_column(&row, "gender", Gender::from_str)?,
        has_identity: label_column(&row, "has_identity", YesNo::from_str)?,
        citizen: label_column(&row, "citizen", YesNo::from_str)?,
        legal_marriage: label_column(&row, "legal_marriage", YesNoNa::from_str)?,
        marriage_certificate: label_column(&row, "marriage_certificate", YesNoNa::from_str)?,
        part_time_resident: label_column(&row, "part_time_resident", YesNo::from_str)?,
        household_residency: label_column(&row, "household_residency", YesNo::from_str)?,
        literacy: label_column(&row, "literacy", YesNo::from_str)?,
        guardian: label_column(&row, "guardian", YesNoNa::from_str)?,
        confirm_participation: label_column(
            &row,
            "confirm_participation",
            ConfirmParticipation::from_str,
        )?,
    };

    let stored: String = row.get("loss_reason");
    let loss_reasons = split_loss_reasons(&stored)
        .ok_or_else(|| Error::Decode(format!("unknown loss reason in '{stored}'")))?;

    Ok(Some(EnrollmentChecklistRecord {
        answers,
        is_eligible: row.get("is_eligible"),
        loss_reasons,
        non_citizen: row.get("non_citizen"),
    }))
}

async fn save_visit_log(
    tx: &mut Transaction<'_, Sqlite>,
    table: VisitTable,
    id: &str,
    log: Option<&VisitLog>,
) -> Result<()> {
    let clear_entries = format!("DELETE FROM {} WHERE household_member_id = ?", table.entries());
    sqlx::query(&clear_entries)
        .bind(id)
        .execute(&mut **tx)
        .await?;

    let Some(log) = log else {
        return delete_row(tx, table.parent(), id).await;
    };

    let insert_parent = format!(
        "INSERT OR IGNORE INTO {} (household_member_id) VALUES (?)",
        table.parent()
    );
    sqlx::query(&insert_parent).bind(id).execute(&mut **tx).await?;

    let insert_entry = format!(
        "INSERT INTO {} (household_member_id, report_date, reason, next_appointment) \
         VALUES (?, ?, ?, ?)",
        table.entries()
    );
    for entry in &log.entries {
        sqlx::query(&insert_entry)
            .bind(id)
            .bind(entry.report_date)
            .bind(&entry.reason)
            .bind(entry.next_appointment)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn load_visit_log(db: &Pool<Sqlite>, table: VisitTable, id: Uuid) -> Result<Option<VisitLog>> {
    let exists_sql = format!(
        "SELECT COUNT(*) FROM {} WHERE household_member_id = ?",
        table.parent()
    );
    let count: i64 = sqlx::query_scalar(&exists_sql)
        .bind(id.to_string())
        .fetch_one(db)
        .await?;
    if count == 0 {
        return Ok(None);
    }

    let entries_sql = format!(
        "SELECT report_date, reason, next_appointment FROM {} \
         WHERE household_member_id = ? ORDER BY report_date",
        table.entries()
    );
    let entries = sqlx::query(&entries_sql)
        .bind(id.to_string())
        .fetch_all(db)
        .await?
        .iter()
        .map(|row| VisitEntry {
            report_date: row.get("report_date"),
            reason: row.get("reason"),
            next_appointment: row.get("next_appointment"),
        })
        .collect();

    Ok(Some(VisitLog { entries }))
}

async fn delete_row(tx: &mut Transaction<'_, Sqlite>, table: &str, id: &str) -> Result<()> {
    let sql = format!("DELETE FROM {table} WHERE household_member_id = ?");
    sqlx::query(&sql).bind(id).execute(&mut **tx).await?;
    Ok(())
}
