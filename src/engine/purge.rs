use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::meeting::MeetingKey;
use crate::models::unit::Unit;
use crate::models::{LocalityId, MeetingId, MemberId, RecordId, UnitId};
use crate::store::AttendanceStore;
use super::enrollment::EnrollmentFilter;
use super::reconcile::RosterScope;

#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub meetings: Vec<MeetingId>,
    pub deleted: u64,
}

/// Text the operator must type before records for `scope` on `date` are wiped.
pub fn confirmation_phrase(scope: RosterScope, date: NaiveDate) -> String {
    match scope {
        RosterScope::Unit(id) => format!("delete {} unit {}", date, id),
        RosterScope::All => format!("delete {} all units", date),
    }
}

/// Delete every attendance record a roster load for `scope` on `date` could
/// show. That covers all rows of every meeting registered under a unit's key,
/// duplicates included, plus the rows of the unit's enrolled members held by
/// the locality's combined meeting. Meeting rows stay and nothing is created.
pub async fn delete_all_records_for_resolved_meetings<S: AttendanceStore, F: EnrollmentFilter>(
    store: &S,
    filter: &F,
    date: NaiveDate,
    scope: RosterScope,
    confirmation: &str,
) -> Result<PurgeReport, AppError> {
    if confirmation.trim() != confirmation_phrase(scope, date) {
        return Err(AppError::ConfirmationMismatch);
    }

    let units: Vec<Unit> = match scope {
        RosterScope::Unit(id) => vec![store.find_unit(id).await?.ok_or(AppError::NotFound)?],
        RosterScope::All => store.find_units().await?,
    };
    let unit_ids: Vec<UnitId> = units.iter().map(|u| u.id).collect();

    let keys: Vec<MeetingKey> = unit_ids.iter().map(|id| MeetingKey::unit(date, *id)).collect();
    let candidates = try_join_all(keys.iter().map(|key| store.find_meetings(key))).await?;
    let mut meetings: Vec<MeetingId> = candidates.into_iter().flatten().map(|m| m.id).collect();
    let mut deleted = if meetings.is_empty() {
        0
    } else {
        store.delete_attendance_for_meetings(&meetings).await?
    };

    let localities: BTreeSet<LocalityId> = units.iter().map(|u| u.locality_id).collect();
    let mut combined: Vec<MeetingId> = Vec::new();
    for locality_id in localities {
        let key = MeetingKey::locality(date, locality_id);
        combined.extend(store.find_meetings(&key).await?.into_iter().map(|m| m.id));
    }
    if !combined.is_empty() {
        let roster: HashSet<MemberId> = store
            .find_members_by_units(&unit_ids)
            .await?
            .into_iter()
            .filter(|m| filter.is_enrolled(m, date))
            .map(|m| m.id)
            .collect();
        let rows: Vec<(RecordId, MeetingId)> = store
            .find_attendance(&combined)
            .await?
            .into_iter()
            .filter(|r| roster.contains(&r.member_id))
            .map(|r| (r.id, r.meeting_id))
            .collect();
        if !rows.is_empty() {
            let ids: Vec<RecordId> = rows.iter().map(|(id, _)| *id).collect();
            deleted += store.delete_attendance_records(&ids).await?;
            for (_, meeting_id) in rows {
                if !meetings.contains(&meeting_id) {
                    meetings.push(meeting_id);
                }
            }
        }
    }

    log::warn!(
        "Deleted {} attendance records of {} meetings ({} on {})",
        deleted,
        meetings.len(),
        scope,
        date
    );
    Ok(PurgeReport { meetings, deleted })
}
