//! Attendance edit session.
//!
//! A view owns two keyed maps (attendance marks and memos). Entering edit
//! mode snapshots both; every mutation is local until `commit`, which
//! writes only members whose state differs from the snapshot. `discard`
//! restores the snapshot without touching the store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::attendance::{AttendanceRecord, AttendanceUpdate, MemberSnapshot, NewAttendance};
use crate::models::member::Member;
use crate::models::tier::Tier;
use crate::models::unit::Unit;
use crate::models::{MeetingId, MemberId, RecordId, UnitId};
use crate::store::AttendanceStore;
use super::reconcile::{RosterLoad, RosterScope};
use super::resolver::{CombinedModes, MeetingResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceChoice {
    /// No record at all. Distinct from a recorded absence.
    Unrecorded,
    Present,
    Absent,
}

/// In-session attendance of one member. `record_id = None` means not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceMark {
    pub record_id: Option<RecordId>,
    pub attended: bool,
    pub online: bool,
    pub away: bool,
}

impl AttendanceMark {
    fn choice(&self) -> AttendanceChoice {
        if self.attended { AttendanceChoice::Present } else { AttendanceChoice::Absent }
    }
}

impl From<&AttendanceRecord> for AttendanceMark {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            record_id: Some(record.id),
            attended: record.attended,
            online: record.online && record.attended,
            away: record.away && record.attended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Viewing,
    Editing,
    Committing,
    Discarding,
}

/// Copy of both maps taken on entering edit mode. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSnapshot {
    pub attendance: HashMap<MemberId, AttendanceMark>,
    pub memos: HashMap<MemberId, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiscardOutcome {
    /// Unsaved changes exist; call again with confirmation.
    NeedsConfirmation { dirty: usize },
    Discarded,
}

#[derive(Debug, Serialize)]
pub struct CommitFailure {
    pub member_id: MemberId,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CommitReport {
    /// Members whose write reached the store.
    pub written: Vec<MemberId>,
    /// Members skipped or rejected; they stay dirty.
    pub failures: Vec<CommitFailure>,
    pub meetings: HashMap<UnitId, MeetingId>,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The comparable part of a member's state: (choice, online, away, memo).
type MemberState<'a> = (Option<(bool, bool, bool)>, Option<&'a str>);

fn state_of<'a>(
    attendance: &'a HashMap<MemberId, AttendanceMark>,
    memos: &'a HashMap<MemberId, String>,
    member_id: MemberId,
) -> MemberState<'a> {
    (
        attendance.get(&member_id).map(|m| (m.attended, m.online, m.away)),
        memos.get(&member_id).map(String::as_str),
    )
}

/// A roster view and its edit session.
#[derive(Debug)]
pub struct EditSession {
    date: NaiveDate,
    scope: RosterScope,
    combined: CombinedModes,
    units: HashMap<UnitId, Unit>,
    meetings: HashMap<UnitId, MeetingId>,
    roster: Vec<Member>,
    guest_ids: HashSet<MemberId>,
    tiers: HashMap<MemberId, Tier>,
    unit_of: HashMap<MemberId, UnitId>,

    state: SessionState,
    attendance: HashMap<MemberId, AttendanceMark>,
    memos: HashMap<MemberId, String>,
    snapshot: Option<EditSnapshot>,
    dirty: BTreeSet<MemberId>,
}

impl EditSession {
    pub fn from_load(load: RosterLoad) -> Self {
        let attendance = load.attendance.iter().map(|(id, r)| (*id, AttendanceMark::from(r))).collect();
        Self {
            date: load.date,
            scope: load.scope,
            combined: load.combined,
            units: load.units.into_iter().map(|u| (u.id, u)).collect(),
            meetings: load.meetings,
            roster: load.roster,
            guest_ids: load.guest_ids,
            tiers: load.tiers,
            unit_of: load.unit_of,
            state: SessionState::Viewing,
            attendance,
            memos: load.memos,
            snapshot: None,
            dirty: BTreeSet::new(),
        }
    }

    // -- read side -------------------------------------------------------

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn scope(&self) -> RosterScope {
        self.scope
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn roster(&self) -> &[Member] {
        &self.roster
    }

    pub fn attendance(&self) -> &HashMap<MemberId, AttendanceMark> {
        &self.attendance
    }

    pub fn memos(&self) -> &HashMap<MemberId, String> {
        &self.memos
    }

    pub fn snapshot(&self) -> Option<&EditSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn meetings(&self) -> &HashMap<UnitId, MeetingId> {
        &self.meetings
    }

    pub fn is_guest(&self, member_id: MemberId) -> bool {
        self.guest_ids.contains(&member_id)
    }

    pub fn tier_of(&self, member_id: MemberId) -> Option<Tier> {
        self.tiers.get(&member_id).copied()
    }

    pub fn unit_of(&self, member_id: MemberId) -> Option<UnitId> {
        self.unit_of.get(&member_id).copied()
    }

    pub fn choice_of(&self, member_id: MemberId) -> AttendanceChoice {
        self.attendance
            .get(&member_id)
            .map(AttendanceMark::choice)
            .unwrap_or(AttendanceChoice::Unrecorded)
    }

    pub fn is_dirty(&self, member_id: MemberId) -> bool {
        self.dirty.contains(&member_id)
    }

    pub fn dirty_members(&self) -> Vec<MemberId> {
        self.dirty.iter().copied().collect()
    }

    /// Drives the leave-page warning. Browsers may still close without asking.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    // -- transitions -----------------------------------------------------

    pub fn enter_edit(&mut self) -> Result<(), AppError> {
        if self.state != SessionState::Viewing {
            return Err(AppError::InvalidState(format!("cannot enter edit mode while {:?}", self.state)));
        }
        self.snapshot = Some(EditSnapshot { attendance: self.attendance.clone(), memos: self.memos.clone() });
        self.dirty.clear();
        self.state = SessionState::Editing;
        Ok(())
    }

    /// Restore the snapshot. With unsaved changes this first asks for confirmation.
    pub fn discard(&mut self, confirmed: bool) -> Result<DiscardOutcome, AppError> {
        self.require_editing()?;
        if !self.dirty.is_empty() && !confirmed {
            return Ok(DiscardOutcome::NeedsConfirmation { dirty: self.dirty.len() });
        }

        self.state = SessionState::Discarding;
        let snapshot = self.snapshot.take().unwrap_or_default();
        // guests picked from search during this session disappear with it
        let added: Vec<MemberId> = self
            .guest_ids
            .iter()
            .filter(|id| !snapshot.attendance.contains_key(id))
            .copied()
            .collect();
        for id in added {
            self.forget_guest(id);
        }
        self.attendance = snapshot.attendance;
        self.memos = snapshot.memos;
        self.dirty.clear();
        self.state = SessionState::Viewing;
        Ok(DiscardOutcome::Discarded)
    }

    /// Write every dirty member to its own unit's meeting.
    ///
    /// Members whose meeting cannot be resolved or whose write fails are
    /// reported and stay dirty; the rest are committed. Only a fully
    /// successful commit returns the session to viewing.
    pub async fn commit<S: AttendanceStore>(&mut self, store: &S) -> Result<CommitReport, AppError> {
        self.require_editing()?;
        let baseline = self.snapshot.clone().unwrap_or_default();
        let dirty: Vec<MemberId> = self.dirty.iter().copied().collect();
        let mut report = CommitReport::default();

        if dirty.is_empty() {
            self.finish_commit(baseline, &report);
            return Ok(report);
        }
        let mut run = CommitInFlight::begin(self);

        let mut touched: Vec<Unit> = Vec::new();
        for unit_id in dirty.iter().filter_map(|id| run.unit_of.get(id)) {
            if !touched.iter().any(|u| u.id == *unit_id) {
                if let Some(unit) = run.units.get(unit_id) {
                    touched.push(unit.clone());
                }
            }
        }
        let resolution = MeetingResolver::new(store).resolve_all(run.date, &touched, &run.combined).await;
        for (unit_id, meeting_id) in &resolution.meetings {
            run.meetings.insert(*unit_id, *meeting_id);
        }
        report.meetings = resolution.meetings.clone();

        for member_id in dirty {
            let target = run
                .unit_of
                .get(&member_id)
                .copied()
                .ok_or_else(|| AppError::RegistrationFailed(format!("member {} has no unit", member_id)))
                .and_then(|unit_id| match resolution.meetings.get(&unit_id) {
                    Some(meeting_id) => Ok((unit_id, *meeting_id)),
                    None => Err(match resolution.failures.get(&unit_id) {
                        Some(e) => AppError::RegistrationFailed(e.to_string()),
                        None => AppError::RegistrationFailed(format!("no meeting for unit {}", unit_id)),
                    }),
                });

            let result = match target {
                Ok((unit_id, meeting_id)) => run.write_member(store, &baseline, member_id, unit_id, meeting_id).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.written.push(member_id),
                Err(e) => {
                    log::warn!("Commit for member {} on {} failed: {}", member_id, run.date, e);
                    report.failures.push(CommitFailure {
                        member_id,
                        retryable: e.is_retryable(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Committed attendance for {} on {}: {} written, {} failed",
            run.scope,
            run.date,
            report.written.len(),
            report.failures.len()
        );
        run.finish_commit(baseline, &report);
        Ok(report)
    }

    async fn write_member<S: AttendanceStore>(
        &mut self,
        store: &S,
        baseline: &EditSnapshot,
        member_id: MemberId,
        unit_id: UnitId,
        meeting_id: MeetingId,
    ) -> Result<(), AppError> {
        let memo = self.memos.get(&member_id).cloned().unwrap_or_default();
        let Some(mark) = self.attendance.get(&member_id).cloned() else {
            // reverted to unrecorded: drop the persisted row if there was one
            if let Some(record_id) = baseline.attendance.get(&member_id).and_then(|m| m.record_id) {
                store.delete_attendance(record_id).await?;
            }
            return Ok(());
        };

        match mark.record_id {
            Some(record_id) => {
                let update = AttendanceUpdate {
                    meeting_id,
                    attended: mark.attended,
                    online: mark.online,
                    away: mark.away,
                    memo,
                };
                store.update_attendance(record_id, &update).await
            }
            None => {
                let member = self
                    .roster
                    .iter()
                    .find(|m| m.id == member_id)
                    .ok_or_else(|| AppError::InvalidState(format!("member {} is not on the roster", member_id)))?;
                let locality_id = self.units.get(&unit_id).map(|u| u.locality_id).unwrap_or_default();
                let new = NewAttendance {
                    member_id,
                    meeting_id,
                    attended: mark.attended,
                    online: mark.online,
                    away: mark.away,
                    memo,
                    snapshot: MemberSnapshot::capture(member, locality_id),
                };
                let record = store.insert_attendance(&new).await?;
                if let Some(current) = self.attendance.get_mut(&member_id) {
                    current.record_id = Some(record.id);
                }
                Ok(())
            }
        }
    }

    /// Advance the snapshot to the post-commit maps, except for failed
    /// members, which keep their old baseline and therefore stay dirty.
    fn finish_commit(&mut self, baseline: EditSnapshot, report: &CommitReport) {
        let mut next = EditSnapshot { attendance: self.attendance.clone(), memos: self.memos.clone() };
        for failure in &report.failures {
            let id = failure.member_id;
            match baseline.attendance.get(&id) {
                Some(mark) => next.attendance.insert(id, mark.clone()),
                None => next.attendance.remove(&id),
            };
            match baseline.memos.get(&id) {
                Some(memo) => next.memos.insert(id, memo.clone()),
                None => next.memos.remove(&id),
            };
        }
        self.snapshot = Some(next);
        self.recompute_dirty();
        self.state = if report.is_complete() { SessionState::Viewing } else { SessionState::Editing };
    }

    // -- mutations (edit mode only) --------------------------------------

    pub fn set_attendance(&mut self, member_id: MemberId, choice: AttendanceChoice) -> Result<(), AppError> {
        self.require_editing()?;
        self.require_known(member_id)?;
        // re-recording after an unrecord in the same session reuses the persisted row
        let persisted = self
            .snapshot
            .as_ref()
            .and_then(|s| s.attendance.get(&member_id))
            .and_then(|m| m.record_id);
        match choice {
            AttendanceChoice::Unrecorded => {
                self.attendance.remove(&member_id);
                self.memos.remove(&member_id);
            }
            AttendanceChoice::Present => {
                let mark = self.attendance.entry(member_id).or_insert_with(|| AttendanceMark {
                    record_id: persisted,
                    attended: true,
                    online: false,
                    away: false,
                });
                mark.attended = true;
            }
            AttendanceChoice::Absent => {
                let mark = self.attendance.entry(member_id).or_insert_with(|| AttendanceMark {
                    record_id: persisted,
                    attended: false,
                    online: false,
                    away: false,
                });
                mark.attended = false;
                mark.online = false;
                mark.away = false;
            }
        }
        self.recompute_dirty();
        Ok(())
    }

    pub fn toggle_online(&mut self, member_id: MemberId) -> Result<bool, AppError> {
        let mark = self.attended_mark(member_id)?;
        mark.online = !mark.online;
        let now = mark.online;
        self.recompute_dirty();
        Ok(now)
    }

    pub fn toggle_away(&mut self, member_id: MemberId) -> Result<bool, AppError> {
        let mark = self.attended_mark(member_id)?;
        mark.away = !mark.away;
        let now = mark.away;
        self.recompute_dirty();
        Ok(now)
    }

    /// Memos live on the attendance record, so the member must be recorded.
    /// An empty memo clears it.
    pub fn set_memo(&mut self, member_id: MemberId, memo: &str) -> Result<(), AppError> {
        self.require_editing()?;
        self.require_known(member_id)?;
        if !self.attendance.contains_key(&member_id) {
            return Err(AppError::InvalidState(format!(
                "member {} has no attendance recorded; record attendance before adding a memo",
                member_id
            )));
        }
        if memo.is_empty() {
            self.memos.remove(&member_id);
        } else {
            self.memos.insert(member_id, memo.to_string());
        }
        self.recompute_dirty();
        Ok(())
    }

    /// Add a member picked from search as a present guest of `unit_id`.
    /// A member already on the roster is just marked present.
    pub fn add_guest(&mut self, member: Member, unit_id: UnitId) -> Result<(), AppError> {
        self.require_editing()?;
        if !self.units.contains_key(&unit_id) {
            return Err(AppError::InvalidInput(format!("unit {} is not part of this view", unit_id)));
        }
        let member_id = member.id;
        if !self.roster.iter().any(|m| m.id == member_id) {
            self.guest_ids.insert(member_id);
            self.unit_of.insert(member_id, unit_id);
            self.tiers.insert(member_id, Tier::Semi);
            self.roster.push(member);
        }
        self.set_attendance(member_id, AttendanceChoice::Present)
    }

    /// Remove a member's record from the session. A guest added during this
    /// session leaves the roster as well.
    pub fn remove(&mut self, member_id: MemberId) -> Result<(), AppError> {
        self.require_editing()?;
        self.require_known(member_id)?;
        self.attendance.remove(&member_id);
        self.memos.remove(&member_id);
        let in_snapshot = self
            .snapshot
            .as_ref()
            .is_some_and(|s| s.attendance.contains_key(&member_id));
        if self.guest_ids.contains(&member_id) && !in_snapshot {
            self.forget_guest(member_id);
        }
        self.recompute_dirty();
        Ok(())
    }

    // -- helpers ---------------------------------------------------------

    fn require_editing(&self) -> Result<(), AppError> {
        if self.state == SessionState::Editing {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!("not in edit mode ({:?})", self.state)))
        }
    }

    fn require_known(&self, member_id: MemberId) -> Result<(), AppError> {
        if self.roster.iter().any(|m| m.id == member_id) || self.attendance.contains_key(&member_id) {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!("member {} is not on this roster", member_id)))
        }
    }

    fn attended_mark(&mut self, member_id: MemberId) -> Result<&mut AttendanceMark, AppError> {
        self.require_editing()?;
        match self.attendance.get_mut(&member_id) {
            Some(mark) if mark.attended => Ok(mark),
            _ => Err(AppError::InvalidState(format!(
                "online/away only apply to members marked present (member {})",
                member_id
            ))),
        }
    }

    fn forget_guest(&mut self, member_id: MemberId) {
        self.guest_ids.remove(&member_id);
        self.unit_of.remove(&member_id);
        self.tiers.remove(&member_id);
        self.roster.retain(|m| m.id != member_id);
    }

    fn recompute_dirty(&mut self) {
        let Some(snapshot) = &self.snapshot else {
            self.dirty.clear();
            return;
        };
        let candidates: BTreeSet<MemberId> = self
            .roster
            .iter()
            .map(|m| m.id)
            .chain(self.attendance.keys().copied())
            .chain(self.memos.keys().copied())
            .chain(snapshot.attendance.keys().copied())
            .chain(snapshot.memos.keys().copied())
            .collect();
        self.dirty = candidates
            .into_iter()
            .filter(|id| {
                state_of(&self.attendance, &self.memos, *id) != state_of(&snapshot.attendance, &snapshot.memos, *id)
            })
            .collect();
    }
}

/// Keeps a session in `Committing` while its writes are in flight. Dropping
/// the commit future at an await point puts the session back in `Editing`
/// with its edits and snapshot kept, so the same edits can be committed
/// again or discarded.
struct CommitInFlight<'a> {
    session: &'a mut EditSession,
}

impl<'a> CommitInFlight<'a> {
    fn begin(session: &'a mut EditSession) -> Self {
        session.state = SessionState::Committing;
        Self { session }
    }
}

impl Deref for CommitInFlight<'_> {
    type Target = EditSession;

    fn deref(&self) -> &EditSession {
        &*self.session
    }
}

impl DerefMut for CommitInFlight<'_> {
    fn deref_mut(&mut self) -> &mut EditSession {
        &mut *self.session
    }
}

impl Drop for CommitInFlight<'_> {
    fn drop(&mut self) {
        if self.session.state == SessionState::Committing {
            log::warn!(
                "Commit for {} on {} was interrupted; {} unsaved changes kept",
                self.session.scope,
                self.session.date,
                self.session.dirty.len()
            );
            self.session.state = SessionState::Editing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RosterView;

    fn member(id: MemberId) -> Member {
        Member {
            id,
            name: format!("M{id}"),
            sort_key: format!("m{id}"),
            baptized: false,
            age_category: "adult".to_string(),
            unit_id: Some(1),
            locality_id: Some(1),
            enrollment: Vec::new(),
        }
    }

    fn record(id: RecordId, member_id: MemberId, attended: bool) -> AttendanceRecord {
        AttendanceRecord {
            id,
            member_id,
            meeting_id: 10,
            attended,
            online: false,
            away: false,
            memo: String::new(),
            snapshot: MemberSnapshot { age_category: "adult".to_string(), baptized: false, unit_id: Some(1), is_local: true },
        }
    }

    /// Unit 1 with members 1..=3; member 1 recorded absent with a memo.
    fn load() -> RosterLoad {
        RosterLoad {
            date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            scope: RosterScope::Unit(1),
            combined: CombinedModes::none(),
            units: vec![Unit { id: 1, name: "A".to_string(), locality_id: 1, locality_name: "L".to_string() }],
            meetings: HashMap::from([(1, 10)]),
            roster: (1..=3).map(member).collect(),
            attendance: HashMap::from([(1, record(100, 1, false))]),
            memos: HashMap::from([(1, "called in".to_string())]),
            guest_ids: HashSet::new(),
            tiers: HashMap::new(),
            unit_of: (1..=3).map(|id| (id, 1)).collect(),
        }
    }

    fn session() -> EditSession {
        let mut s = EditSession::from_load(load());
        s.enter_edit().unwrap();
        s
    }

    #[test]
    fn test_removed_and_added_records_are_dirty() {
        let mut s = session();
        s.set_attendance(1, AttendanceChoice::Unrecorded).unwrap();
        s.set_attendance(2, AttendanceChoice::Present).unwrap();
        assert_eq!(s.dirty_members(), vec![1, 2]);
    }

    #[test]
    fn test_restoring_same_values_is_clean() {
        let mut s = session();
        s.set_attendance(1, AttendanceChoice::Present).unwrap();
        s.set_memo(1, "").unwrap();
        assert!(s.is_dirty(1));
        s.set_attendance(1, AttendanceChoice::Absent).unwrap();
        s.set_memo(1, "called in").unwrap();
        assert!(!s.has_unsaved_changes());
    }

    #[test]
    fn test_recreated_mark_keeps_persisted_id() {
        let mut s = session();
        s.set_attendance(1, AttendanceChoice::Unrecorded).unwrap();
        s.set_attendance(1, AttendanceChoice::Present).unwrap();
        assert_eq!(s.attendance()[&1].record_id, Some(100));
    }

    #[test]
    fn test_discard_restores_maps_and_clears_snapshot() {
        let mut s = session();
        let before = s.snapshot().cloned().unwrap();
        s.set_attendance(1, AttendanceChoice::Present).unwrap();
        s.set_attendance(3, AttendanceChoice::Absent).unwrap();
        assert_eq!(s.discard(false).unwrap(), DiscardOutcome::NeedsConfirmation { dirty: 2 });
        assert_eq!(s.discard(true).unwrap(), DiscardOutcome::Discarded);
        assert_eq!(s.attendance(), &before.attendance);
        assert_eq!(s.memos(), &before.memos);
        assert!(s.snapshot().is_none());
    }

    #[test]
    fn test_view_replaces_session_left_committing() {
        let mut view = RosterView::new();
        let ticket = view.begin_load();
        let s = view.apply(&ticket, load()).unwrap();
        s.enter_edit().unwrap();
        s.set_attendance(2, AttendanceChoice::Present).unwrap();
        s.state = SessionState::Committing;

        let ticket = view.begin_load();
        let reloaded = view.apply(&ticket, load()).unwrap();
        assert_eq!(reloaded.state(), SessionState::Viewing);
        assert!(!reloaded.has_unsaved_changes());
    }

    #[test]
    fn test_view_keeps_session_with_unsaved_edits() {
        let mut view = RosterView::new();
        let ticket = view.begin_load();
        view.apply(&ticket, load()).unwrap().enter_edit().unwrap();
        view.session_mut().unwrap().set_attendance(2, AttendanceChoice::Present).unwrap();

        let ticket = view.begin_load();
        assert!(matches!(view.apply(&ticket, load()), Err(AppError::InvalidState(_))));
        assert!(view.session().unwrap().is_dirty(2));
    }
}
