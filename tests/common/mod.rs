//! Shared fixtures for engine and API tests.
//!
//! Every test builds its own `MemoryStore`, so tests never share state.
//!
//! # Fixtures
//! - `world()` - one locality with units A and B, two members each
//! - `load()` / `editing()` - roster load and an edit session already in edit mode

#![allow(dead_code)]

use chrono::NaiveDate;

use rollcall::engine::{
    CombinedModes, EditSession, EnrollmentHistory, LoadTicket, MeetingResolver, Reconciler, RosterLoad,
    RosterScope,
};
use rollcall::models::unit::Unit;
use rollcall::models::{LocalityId, MeetingId, MemberId, UnitId};
use rollcall::store::{AttendanceStore, MemoryStore};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const MEETING_DAY: &str = "2026-10-18";
pub const ENROLLED_SINCE: &str = "2025-01-01";

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("bad test date")
}

pub fn meeting_day() -> NaiveDate {
    date(MEETING_DAY)
}

// ============================================================================
// WORLD SETUP
// ============================================================================

pub struct World {
    pub store: MemoryStore,
    pub locality: LocalityId,
    pub unit_a: UnitId,
    pub unit_b: UnitId,
    /// Members of unit A.
    pub alice: MemberId,
    pub aaron: MemberId,
    /// Members of unit B.
    pub bella: MemberId,
    pub boris: MemberId,
}

/// One locality ("North") with units A and B and two enrolled members each.
pub fn world() -> World {
    let store = MemoryStore::new();
    let locality = store.add_locality("North");
    let unit_a = store.add_unit("District A", locality);
    let unit_b = store.add_unit("District B", locality);
    let since = date(ENROLLED_SINCE);
    let alice = store.add_member("Alice", unit_a, since);
    let aaron = store.add_member("Aaron", unit_a, since);
    let bella = store.add_member("Bella", unit_b, since);
    let boris = store.add_member("Boris", unit_b, since);
    World { store, locality, unit_a, unit_b, alice, aaron, bella, boris }
}

pub async fn unit(store: &MemoryStore, id: UnitId) -> Unit {
    store.find_unit(id).await.expect("store").expect("unit exists")
}

/// Resolve (creating if needed) the unit's own meeting on the meeting day.
pub async fn unit_meeting(store: &MemoryStore, unit_id: UnitId) -> MeetingId {
    let unit = unit(store, unit_id).await;
    MeetingResolver::new(store)
        .resolve(meeting_day(), &unit, false)
        .await
        .expect("resolve unit meeting")
}

pub fn combined(locality: LocalityId) -> CombinedModes {
    [locality].into_iter().collect()
}

// ============================================================================
// ROSTER / SESSION
// ============================================================================

pub async fn load(store: &MemoryStore, scope: RosterScope, combined: &CombinedModes) -> RosterLoad {
    Reconciler::new(store, &EnrollmentHistory)
        .load_roster(scope, meeting_day(), combined, &LoadTicket::detached())
        .await
        .expect("roster load")
}

/// A session for `scope` on the meeting day, already in edit mode.
pub async fn editing(store: &MemoryStore, scope: RosterScope, combined: &CombinedModes) -> EditSession {
    let mut session = EditSession::from_load(load(store, scope, combined).await);
    session.enter_edit().expect("enter edit");
    session
}
