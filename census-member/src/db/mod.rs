//! Persistence of the member aggregate
//!
//! A member and its satellite records are always saved together in one
//! transaction, so the stored flags never disagree with the stored records.

pub mod members;
mod satellites;

pub use members::{get_member, is_enumerated, list_household_members};

use crate::error::{Error, Result};
use crate::record::MemberAggregate;
use sqlx::{Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

/// Save the member and every satellite record in one transaction
pub async fn save_aggregate(db: &Pool<Sqlite>, agg: &MemberAggregate) -> Result<()> {
    let mut tx = db.begin().await?;
    members::upsert_member(&mut tx, &agg.member).await?;
    satellites::save_satellites(&mut tx, agg).await?;
    tx.commit().await?;

    debug!(
        member_id = %agg.id(),
        status = ?agg.member.member_status,
        "Saved member aggregate"
    );
    Ok(())
}

/// Load a member with every satellite record
pub async fn load_aggregate(db: &Pool<Sqlite>, id: Uuid) -> Result<MemberAggregate> {
    let member = get_member(db, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("household member {id}")))?;

    let mut agg = MemberAggregate::new(member);
    satellites::load_satellites(db, &mut agg).await?;
    Ok(agg)
}
