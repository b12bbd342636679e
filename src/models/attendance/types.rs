use serde::Serialize;

use crate::errors::AppError;
use crate::models::member::Member;
use crate::models::{LocalityId, MeetingId, MemberId, RecordId, UnitId};

/// Reporting fields copied from the member when the row is first inserted.
/// Never rewritten afterwards, so historical reports stay accurate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSnapshot {
    pub age_category: String,
    pub baptized: bool,
    pub unit_id: Option<UnitId>,
    /// Whether the member's home locality is the meeting's locality.
    pub is_local: bool,
}

impl MemberSnapshot {
    pub fn capture(member: &Member, meeting_locality: LocalityId) -> Self {
        Self {
            age_category: member.age_category.clone(),
            baptized: member.baptized,
            unit_id: member.unit_id,
            is_local: member.locality_id == Some(meeting_locality),
        }
    }
}

/// One member's persisted outcome for one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub member_id: MemberId,
    pub meeting_id: MeetingId,
    pub attended: bool,
    pub online: bool,
    pub away: bool,
    pub memo: String,
    pub snapshot: MemberSnapshot,
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub member_id: MemberId,
    pub meeting_id: MeetingId,
    pub attended: bool,
    pub online: bool,
    pub away: bool,
    pub memo: String,
    pub snapshot: MemberSnapshot,
}

/// Mutable columns of an existing record. The snapshot is not among them.
#[derive(Debug, Clone)]
pub struct AttendanceUpdate {
    pub meeting_id: MeetingId,
    pub attended: bool,
    pub online: bool,
    pub away: bool,
    pub memo: String,
}

impl AttendanceUpdate {
    /// Moving record `id` here would give its member a second record in the meeting.
    pub fn collision(&self, id: RecordId) -> AppError {
        AppError::InvalidState(format!(
            "record {} cannot move to meeting {}: member already has a record there",
            id, self.meeting_id
        ))
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: i64,
    pub member_id: i64,
    pub meeting_id: i64,
    pub attended: bool,
    pub online: bool,
    pub away: bool,
    pub memo: Option<String>,
    pub snap_age_category: String,
    pub snap_baptized: bool,
    pub snap_unit_id: Option<i64>,
    pub snap_is_local: bool,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        // online/away only mean something for attendees
        let (online, away) = if row.attended { (row.online, row.away) } else { (false, false) };
        AttendanceRecord {
            id: row.id,
            member_id: row.member_id,
            meeting_id: row.meeting_id,
            attended: row.attended,
            online,
            away,
            memo: row.memo.unwrap_or_default(),
            snapshot: MemberSnapshot {
                age_category: row.snap_age_category,
                baptized: row.snap_baptized,
                unit_id: row.snap_unit_id,
                is_local: row.snap_is_local,
            },
        }
    }
}
