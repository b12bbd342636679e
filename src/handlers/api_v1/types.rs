use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::{AttendanceChoice, CommitReport, EditSession, SessionState};
use crate::models::tier::Tier;
use crate::models::{MeetingId, MemberId, UnitId};

/// Query for `GET /meetings/resolve`.
#[derive(Deserialize, Debug)]
pub struct ResolveQuery {
    pub date: NaiveDate,
    pub unit: UnitId,
    #[serde(default)]
    pub combined: bool,
}

#[derive(Serialize, Debug)]
pub struct ResolveResponse {
    pub unit_id: UnitId,
    pub meeting_id: MeetingId,
}

/// Query for `GET /roster`. `scope` is a unit id or `__all__`;
/// `combined` lists localities running a combined meeting (`"1,4"`).
#[derive(Deserialize, Debug)]
pub struct RosterQuery {
    pub scope: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub combined: String,
}

#[derive(Deserialize, Debug)]
pub struct MemberRequest {
    pub member_id: MemberId,
}

#[derive(Deserialize, Debug)]
pub struct AttendanceRequest {
    pub member_id: MemberId,
    pub choice: AttendanceChoice,
}

#[derive(Deserialize, Debug)]
pub struct MemoRequest {
    pub member_id: MemberId,
    #[serde(default)]
    pub memo: String,
}

#[derive(Deserialize, Debug)]
pub struct GuestRequest {
    pub member_id: MemberId,
    /// Unit whose meeting the guest attends; defaults to the viewed unit.
    pub unit_id: Option<UnitId>,
}

#[derive(Deserialize, Debug)]
pub struct DiscardRequest {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Deserialize, Debug)]
pub struct DeleteRecordsRequest {
    pub date: NaiveDate,
    pub scope: String,
    pub confirmation: String,
}

/// One roster row as the presentation layer sees it.
#[derive(Serialize, Debug)]
pub struct RosterEntry {
    pub member_id: MemberId,
    pub name: String,
    pub sort_key: String,
    pub unit_id: Option<UnitId>,
    pub tier: Option<Tier>,
    pub guest: bool,
    pub choice: AttendanceChoice,
    pub online: bool,
    pub away: bool,
    pub memo: Option<String>,
    pub dirty: bool,
}

#[derive(Serialize, Debug)]
pub struct RosterResponse {
    pub date: NaiveDate,
    pub scope: String,
    pub state: SessionState,
    pub meetings: HashMap<UnitId, MeetingId>,
    pub members: Vec<RosterEntry>,
    pub dirty: Vec<MemberId>,
    pub unsaved_changes: bool,
}

impl RosterResponse {
    pub fn from_session(session: &EditSession) -> Self {
        let members = session
            .roster()
            .iter()
            .map(|m| {
                let mark = session.attendance().get(&m.id);
                RosterEntry {
                    member_id: m.id,
                    name: m.name.clone(),
                    sort_key: m.sort_key.clone(),
                    unit_id: session.unit_of(m.id),
                    tier: session.tier_of(m.id),
                    guest: session.is_guest(m.id),
                    choice: session.choice_of(m.id),
                    online: mark.is_some_and(|mk| mk.online),
                    away: mark.is_some_and(|mk| mk.away),
                    memo: session.memos().get(&m.id).cloned(),
                    dirty: session.is_dirty(m.id),
                }
            })
            .collect();

        RosterResponse {
            date: session.date(),
            scope: session.scope().to_string(),
            state: session.state(),
            meetings: session.meetings().clone(),
            members,
            dirty: session.dirty_members(),
            unsaved_changes: session.has_unsaved_changes(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CommitResponse {
    pub report: CommitReport,
    pub roster: RosterResponse,
}

#[derive(Serialize, Debug)]
pub struct EditStatusResponse {
    pub state: SessionState,
    pub dirty: Vec<MemberId>,
    pub unsaved_changes: bool,
}
