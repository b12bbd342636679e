//! Roster loading: resolved meetings + enrollment-filtered members + attendance rows.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::attendance::AttendanceRecord;
use crate::models::member::Member;
use crate::models::tier::Tier;
use crate::models::unit::Unit;
use crate::models::{MeetingId, MemberId, UnitId};
use crate::store::AttendanceStore;
use super::cancel::LoadTicket;
use super::enrollment::EnrollmentFilter;
use super::resolver::{CombinedModes, MeetingResolver};
use super::tier::TierIndex;

/// Scope token for the aggregate view over every unit.
pub const ALL_UNITS: &str = "__all__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RosterScope {
    Unit(UnitId),
    All,
}

impl FromStr for RosterScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL_UNITS {
            return Ok(RosterScope::All);
        }
        s.parse::<UnitId>()
            .map(RosterScope::Unit)
            .map_err(|_| AppError::InvalidInput(format!("unknown roster scope '{}'", s)))
    }
}

impl fmt::Display for RosterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterScope::Unit(id) => write!(f, "{id}"),
            RosterScope::All => f.write_str(ALL_UNITS),
        }
    }
}

/// Everything a view needs for one (scope, date).
#[derive(Debug, Clone)]
pub struct RosterLoad {
    pub date: NaiveDate,
    pub scope: RosterScope,
    pub combined: CombinedModes,
    pub units: Vec<Unit>,
    /// Authoritative meeting per unit.
    pub meetings: HashMap<UnitId, MeetingId>,
    /// Enrollment-filtered members followed by guests.
    pub roster: Vec<Member>,
    pub attendance: HashMap<MemberId, AttendanceRecord>,
    pub memos: HashMap<MemberId, String>,
    pub guest_ids: HashSet<MemberId>,
    pub tiers: HashMap<MemberId, Tier>,
    /// Unit whose meeting a member's writes belong to.
    pub unit_of: HashMap<MemberId, UnitId>,
}

pub struct Reconciler<'a, S, F> {
    store: &'a S,
    filter: &'a F,
}

impl<'a, S: AttendanceStore, F: EnrollmentFilter> Reconciler<'a, S, F> {
    pub fn new(store: &'a S, filter: &'a F) -> Self {
        Self { store, filter }
    }

    /// Load the roster of one unit, or of every unit for `RosterScope::All`.
    ///
    /// Store calls are per unit, never per member. `ticket` is checked after
    /// every round trip; a superseded load returns `AppError::StaleLoad`.
    pub async fn load_roster(
        &self,
        scope: RosterScope,
        date: NaiveDate,
        combined: &CombinedModes,
        ticket: &LoadTicket,
    ) -> Result<RosterLoad, AppError> {
        let units = match scope {
            RosterScope::Unit(id) => vec![self.store.find_unit(id).await?.ok_or(AppError::NotFound)?],
            RosterScope::All => self.store.find_units().await?,
        };
        ticket.ensure_current()?;

        let resolver = MeetingResolver::new(self.store);
        let meetings = resolver.resolve_all(date, &units, combined).await.into_result()?;
        ticket.ensure_current()?;

        let unit_ids: Vec<UnitId> = units.iter().map(|u| u.id).collect();
        let meeting_ids: Vec<MeetingId> = unit_ids.iter().filter_map(|id| meetings.get(id).copied()).collect();
        let (members, records, memberships) = futures::try_join!(
            self.store.find_members_by_units(&unit_ids),
            self.store.find_attendance(&meeting_ids),
            self.store.find_tier_memberships(&unit_ids),
        )?;
        ticket.ensure_current()?;

        let mut roster: Vec<Member> = Vec::with_capacity(members.len());
        let mut unit_of: HashMap<MemberId, UnitId> = HashMap::new();
        let mut roster_by_unit: HashMap<UnitId, HashSet<MemberId>> = HashMap::new();
        for member in members {
            if !self.filter.is_enrolled(&member, date) {
                continue;
            }
            if let Some(unit_id) = member.unit_id {
                unit_of.insert(member.id, unit_id);
                roster_by_unit.entry(unit_id).or_default().insert(member.id);
            }
            roster.push(member);
        }

        let unit_by_meeting: HashMap<MeetingId, UnitId> = meetings.iter().map(|(u, m)| (*m, *u)).collect();
        let mut attributed: Vec<(UnitId, AttendanceRecord)> = records
            .into_iter()
            .filter_map(|r| unit_by_meeting.get(&r.meeting_id).map(|u| (*u, r)))
            .collect();

        let with_rows: HashSet<UnitId> = attributed.iter().map(|(u, _)| *u).collect();
        let empty: Vec<(&Unit, MeetingId)> = units
            .iter()
            .filter(|u| !with_rows.contains(&u.id))
            .filter_map(|u| meetings.get(&u.id).map(|m| (u, *m)))
            .collect();
        if !empty.is_empty() {
            let no_roster = HashSet::new();
            let probes = join_all(empty.iter().map(|(unit, meeting_id)| {
                let on_roster = roster_by_unit.get(&unit.id).unwrap_or(&no_roster);
                resolver.probe_fallback(date, unit, *meeting_id, on_roster)
            }))
            .await;
            ticket.ensure_current()?;
            for ((unit, _), probe) in empty.iter().zip(probes) {
                attributed.extend(probe?.into_iter().map(|r| (unit.id, r)));
            }
        }

        let roster_ids: HashSet<MemberId> = roster.iter().map(|m| m.id).collect();
        let mut attendance: HashMap<MemberId, AttendanceRecord> = HashMap::new();
        let mut memos: HashMap<MemberId, String> = HashMap::new();
        let mut guest_list: Vec<MemberId> = Vec::new();
        for (unit_id, record) in attributed {
            if attendance.contains_key(&record.member_id) {
                log::warn!(
                    "Member {} has attendance in more than one meeting on {}; keeping the first",
                    record.member_id,
                    date
                );
                continue;
            }
            // writes go back to the meeting the record came from
            unit_of.insert(record.member_id, unit_id);
            if !roster_ids.contains(&record.member_id) {
                guest_list.push(record.member_id);
            }
            if !record.memo.is_empty() {
                memos.insert(record.member_id, record.memo.clone());
            }
            attendance.insert(record.member_id, record);
        }

        let guest_ids: HashSet<MemberId> = guest_list.iter().copied().collect();
        if !guest_list.is_empty() {
            let guests = self.store.find_members_by_ids(&guest_list).await?;
            ticket.ensure_current()?;
            let found: HashSet<MemberId> = guests.iter().map(|g| g.id).collect();
            for missing in guest_list.iter().filter(|id| !found.contains(id)) {
                log::warn!("Attendance for member {} on {} has no member row", missing, date);
            }
            roster.extend(guests);
        }

        let index = TierIndex::from_memberships(memberships);
        let tiers = roster
            .iter()
            .filter_map(|m| unit_of.get(&m.id).map(|u| (m.id, index.classify(*u, m.id))))
            .collect();

        log::debug!(
            "Loaded roster {} for {}: {} members, {} records, {} guests",
            scope,
            date,
            roster.len(),
            attendance.len(),
            guest_ids.len()
        );

        Ok(RosterLoad {
            date,
            scope,
            combined: combined.clone(),
            units,
            meetings,
            roster,
            attendance,
            memos,
            guest_ids,
            tiers,
            unit_of,
        })
    }
}
