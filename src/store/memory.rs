use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::errors::AppError;
use crate::models::attendance::{AttendanceRecord, AttendanceUpdate, MemberSnapshot, NewAttendance};
use crate::models::meeting::{InsertOutcome, Meeting, MeetingKey, NewMeeting};
use crate::models::member::{EnrollmentPeriod, Member};
use crate::models::tier::{Tier, TierMembership};
use crate::models::unit::Unit;
use crate::models::{LocalityId, MeetingId, MemberId, RecordId, UnitId};
use super::AttendanceStore;

/// Which attendance write reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteLogEntry {
    pub kind: WriteKind,
    pub member_id: MemberId,
    pub meeting_id: MeetingId,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    localities: BTreeMap<LocalityId, String>,
    units: BTreeMap<UnitId, Unit>,
    members: BTreeMap<MemberId, Member>,
    tiers: Vec<TierMembership>,
    meetings: BTreeMap<MeetingId, Meeting>,
    attendance: BTreeMap<RecordId, AttendanceRecord>,
    writes: Vec<WriteLogEntry>,
    unavailable: bool,
    fail_meeting_inserts: bool,
    fail_writes_for: Vec<MemberId>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable {
            return Err(AppError::StoreUnavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, member_id: MemberId) -> Result<(), AppError> {
        self.check_available()?;
        if self.fail_writes_for.contains(&member_id) {
            return Err(AppError::StoreUnavailable(format!("write for member {} rejected", member_id)));
        }
        Ok(())
    }
}

/// In-process store with the same unique constraints as the Postgres schema.
///
/// Every operation yields to the executor once before touching state, so
/// concurrent callers interleave between round trips the way they would
/// against a real database.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // a panicking test thread must not poison every later assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn round_trip(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        tokio::task::yield_now().await;
        let state = self.state();
        state.check_available()?;
        Ok(state)
    }

    // -- seeding ---------------------------------------------------------

    pub fn add_locality(&self, name: &str) -> LocalityId {
        let mut s = self.state();
        let id = s.next_id();
        s.localities.insert(id, name.to_string());
        id
    }

    pub fn add_unit(&self, name: &str, locality_id: LocalityId) -> UnitId {
        let mut s = self.state();
        let id = s.next_id();
        let locality_name = s.localities.get(&locality_id).cloned().unwrap_or_default();
        s.units.insert(id, Unit { id, name: name.to_string(), locality_id, locality_name });
        id
    }

    /// Add a member assigned to `unit_id`, enrolled since `enrolled_since` (open-ended).
    pub fn add_member(&self, name: &str, unit_id: UnitId, enrolled_since: NaiveDate) -> MemberId {
        let mut s = self.state();
        let id = s.next_id();
        let locality_id = s.units.get(&unit_id).map(|u| u.locality_id);
        s.members.insert(
            id,
            Member {
                id,
                name: name.to_string(),
                sort_key: name.to_lowercase(),
                baptized: false,
                age_category: "adult".to_string(),
                unit_id: Some(unit_id),
                locality_id,
                enrollment: vec![EnrollmentPeriod { starts_on: enrolled_since, ends_on: None }],
            },
        );
        id
    }

    /// Insert or replace a fully specified member. An id of 0 allocates a new one.
    pub fn put_member(&self, mut member: Member) -> MemberId {
        let mut s = self.state();
        if member.id == 0 {
            member.id = s.next_id();
        }
        let id = member.id;
        s.members.insert(id, member);
        id
    }

    pub fn add_tier(&self, unit_id: UnitId, member_id: MemberId, tier: Tier) {
        self.state().tiers.push(TierMembership { unit_id, member_id, tier });
    }

    /// Insert a meeting bypassing the unique constraint, to reproduce legacy duplicates.
    pub fn seed_meeting(&self, key: MeetingKey, name: &str) -> MeetingId {
        let mut s = self.state();
        let id = s.next_id();
        s.meetings.insert(
            id,
            Meeting { id, event_date: key.event_date, kind: key.kind, scope: key.scope, name: name.to_string() },
        );
        id
    }

    pub fn seed_attendance(&self, meeting_id: MeetingId, member_id: MemberId, attended: bool) -> RecordId {
        let mut s = self.state();
        let id = s.next_id();
        let snapshot = match s.members.get(&member_id) {
            Some(m) => MemberSnapshot {
                age_category: m.age_category.clone(),
                baptized: m.baptized,
                unit_id: m.unit_id,
                is_local: true,
            },
            None => MemberSnapshot { age_category: String::new(), baptized: false, unit_id: None, is_local: true },
        };
        s.attendance.insert(
            id,
            AttendanceRecord {
                id,
                member_id,
                meeting_id,
                attended,
                online: false,
                away: false,
                memo: String::new(),
                snapshot,
            },
        );
        id
    }

    // -- fault injection -------------------------------------------------

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Make meeting inserts fail with a non-uniqueness error.
    pub fn fail_meeting_inserts(&self, fail: bool) {
        self.state().fail_meeting_inserts = fail;
    }

    /// Reject attendance writes for one member.
    pub fn fail_writes_for(&self, member_id: MemberId) {
        self.state().fail_writes_for.push(member_id);
    }

    pub fn clear_write_failures(&self) {
        self.state().fail_writes_for.clear();
    }

    // -- inspection ------------------------------------------------------

    pub fn meetings_for(&self, key: &MeetingKey) -> Vec<Meeting> {
        self.state().meetings.values().filter(|m| m.key() == *key).cloned().collect()
    }

    pub fn records_for(&self, meeting_id: MeetingId) -> Vec<AttendanceRecord> {
        self.state()
            .attendance
            .values()
            .filter(|r| r.meeting_id == meeting_id)
            .cloned()
            .collect()
    }

    pub fn writes(&self) -> Vec<WriteLogEntry> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }
}

impl AttendanceStore for MemoryStore {
    async fn find_unit(&self, id: UnitId) -> Result<Option<Unit>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.units.get(&id).cloned())
    }

    async fn find_units(&self) -> Result<Vec<Unit>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.units.values().cloned().collect())
    }

    async fn find_meetings(&self, key: &MeetingKey) -> Result<Vec<Meeting>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.meetings.values().filter(|m| m.key() == *key).cloned().collect())
    }

    async fn find_meeting(&self, key: &MeetingKey) -> Result<Option<Meeting>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.meetings.values().find(|m| m.key() == *key).cloned())
    }

    async fn insert_meeting(&self, new: &NewMeeting) -> Result<InsertOutcome, AppError> {
        let mut s = self.round_trip().await?;
        if s.fail_meeting_inserts {
            return Err(AppError::StoreUnavailable("meeting insert rejected".to_string()));
        }
        if s.meetings.values().any(|m| m.key() == new.key) {
            return Ok(InsertOutcome::UniqueViolation);
        }
        let id = s.next_id();
        let meeting = Meeting {
            id,
            event_date: new.key.event_date,
            kind: new.key.kind,
            scope: new.key.scope,
            name: new.name.clone(),
        };
        s.meetings.insert(id, meeting.clone());
        Ok(InsertOutcome::Inserted(meeting))
    }

    async fn count_attendance(&self, meeting_ids: &[MeetingId]) -> Result<HashMap<MeetingId, i64>, AppError> {
        let s = self.round_trip().await?;
        let mut counts = HashMap::new();
        for r in s.attendance.values().filter(|r| meeting_ids.contains(&r.meeting_id)) {
            *counts.entry(r.meeting_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_attendance(&self, meeting_ids: &[MeetingId]) -> Result<Vec<AttendanceRecord>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.attendance
            .values()
            .filter(|r| meeting_ids.contains(&r.meeting_id))
            .cloned()
            .collect())
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, AppError> {
        let mut s = self.round_trip().await?;
        s.check_writable(new.member_id)?;
        s.writes.push(WriteLogEntry {
            kind: WriteKind::Insert,
            member_id: new.member_id,
            meeting_id: new.meeting_id,
        });

        let (online, away) = (new.online && new.attended, new.away && new.attended);
        let existing = s
            .attendance
            .values_mut()
            .find(|r| r.meeting_id == new.meeting_id && r.member_id == new.member_id);
        if let Some(record) = existing {
            record.attended = new.attended;
            record.online = online;
            record.away = away;
            record.memo = new.memo.clone();
            return Ok(record.clone());
        }

        let id = s.next_id();
        let record = AttendanceRecord {
            id,
            member_id: new.member_id,
            meeting_id: new.meeting_id,
            attended: new.attended,
            online,
            away,
            memo: new.memo.clone(),
            snapshot: new.snapshot.clone(),
        };
        s.attendance.insert(id, record.clone());
        Ok(record)
    }

    async fn update_attendance(&self, id: RecordId, update: &AttendanceUpdate) -> Result<(), AppError> {
        let mut s = self.round_trip().await?;
        let member_id = s.attendance.get(&id).map(|r| r.member_id).ok_or(AppError::NotFound)?;
        s.check_writable(member_id)?;
        let taken = s
            .attendance
            .values()
            .any(|r| r.id != id && r.meeting_id == update.meeting_id && r.member_id == member_id);
        if taken {
            return Err(update.collision(id));
        }
        s.writes.push(WriteLogEntry { kind: WriteKind::Update, member_id, meeting_id: update.meeting_id });

        if let Some(record) = s.attendance.get_mut(&id) {
            record.meeting_id = update.meeting_id;
            record.attended = update.attended;
            record.online = update.online && update.attended;
            record.away = update.away && update.attended;
            record.memo = update.memo.clone();
        }
        Ok(())
    }

    async fn delete_attendance(&self, id: RecordId) -> Result<(), AppError> {
        let mut s = self.round_trip().await?;
        let Some(record) = s.attendance.get(&id).cloned() else {
            return Ok(());
        };
        s.check_writable(record.member_id)?;
        s.writes.push(WriteLogEntry {
            kind: WriteKind::Delete,
            member_id: record.member_id,
            meeting_id: record.meeting_id,
        });
        s.attendance.remove(&id);
        Ok(())
    }

    async fn delete_attendance_for_meetings(&self, meeting_ids: &[MeetingId]) -> Result<u64, AppError> {
        let mut s = self.round_trip().await?;
        let before = s.attendance.len();
        s.attendance.retain(|_, r| !meeting_ids.contains(&r.meeting_id));
        Ok((before - s.attendance.len()) as u64)
    }

    async fn delete_attendance_records(&self, ids: &[RecordId]) -> Result<u64, AppError> {
        let mut s = self.round_trip().await?;
        let before = s.attendance.len();
        s.attendance.retain(|id, _| !ids.contains(id));
        Ok((before - s.attendance.len()) as u64)
    }

    async fn find_members_by_units(&self, unit_ids: &[UnitId]) -> Result<Vec<Member>, AppError> {
        let s = self.round_trip().await?;
        let mut members: Vec<Member> = s
            .members
            .values()
            .filter(|m| m.unit_id.is_some_and(|u| unit_ids.contains(&u)))
            .cloned()
            .collect();
        members.sort_by(|a, b| (a.unit_id, &a.sort_key, a.id).cmp(&(b.unit_id, &b.sort_key, b.id)));
        Ok(members)
    }

    async fn find_members_by_ids(&self, ids: &[MemberId]) -> Result<Vec<Member>, AppError> {
        let s = self.round_trip().await?;
        Ok(ids.iter().filter_map(|id| s.members.get(id).cloned()).collect())
    }

    async fn find_tier_memberships(&self, unit_ids: &[UnitId]) -> Result<Vec<TierMembership>, AppError> {
        let s = self.round_trip().await?;
        Ok(s.tiers.iter().filter(|t| unit_ids.contains(&t.unit_id)).copied().collect())
    }
}
