//! Backing-store seam.
//!
//! The engine only needs row-level operations with unique-constraint
//! enforcement; it never assumes multi-statement transactions. `PgStore`
//! is the production implementation, `MemoryStore` an in-process one with
//! the same constraint semantics plus outage injection for tests.

#![allow(async_fn_in_trait)]

pub mod memory;
pub mod pg;

use std::collections::HashMap;

pub use memory::MemoryStore;
pub use pg::PgStore;

use crate::errors::AppError;
use crate::models::attendance::{AttendanceRecord, AttendanceUpdate, NewAttendance};
use crate::models::meeting::{InsertOutcome, Meeting, MeetingKey, NewMeeting};
use crate::models::member::Member;
use crate::models::tier::TierMembership;
use crate::models::unit::Unit;
use crate::models::{MeetingId, MemberId, RecordId, UnitId};

pub trait AttendanceStore {
    async fn find_unit(&self, id: UnitId) -> Result<Option<Unit>, AppError>;
    async fn find_units(&self) -> Result<Vec<Unit>, AppError>;

    /// Range query: every meeting matching the key (may be more than one).
    async fn find_meetings(&self, key: &MeetingKey) -> Result<Vec<Meeting>, AppError>;
    /// Point query: the first meeting matching the key.
    async fn find_meeting(&self, key: &MeetingKey) -> Result<Option<Meeting>, AppError>;
    async fn insert_meeting(&self, new: &NewMeeting) -> Result<InsertOutcome, AppError>;
    async fn count_attendance(&self, meeting_ids: &[MeetingId]) -> Result<HashMap<MeetingId, i64>, AppError>;

    async fn find_attendance(&self, meeting_ids: &[MeetingId]) -> Result<Vec<AttendanceRecord>, AppError>;
    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, AppError>;
    async fn update_attendance(&self, id: RecordId, update: &AttendanceUpdate) -> Result<(), AppError>;
    async fn delete_attendance(&self, id: RecordId) -> Result<(), AppError>;
    async fn delete_attendance_for_meetings(&self, meeting_ids: &[MeetingId]) -> Result<u64, AppError>;
    async fn delete_attendance_records(&self, ids: &[RecordId]) -> Result<u64, AppError>;

    async fn find_members_by_units(&self, unit_ids: &[UnitId]) -> Result<Vec<Member>, AppError>;
    async fn find_members_by_ids(&self, ids: &[MemberId]) -> Result<Vec<Member>, AppError>;
    async fn find_tier_memberships(&self, unit_ids: &[UnitId]) -> Result<Vec<TierMembership>, AppError>;
}
