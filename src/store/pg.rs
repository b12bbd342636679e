use std::collections::HashMap;

use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::attendance::{self, AttendanceRecord, AttendanceUpdate, NewAttendance};
use crate::models::meeting::{self, InsertOutcome, Meeting, MeetingKey, NewMeeting};
use crate::models::member::{self, Member};
use crate::models::tier::{self, TierMembership};
use crate::models::unit::{self, Unit};
use crate::models::{MeetingId, MemberId, RecordId, UnitId};
use super::AttendanceStore;

/// Postgres-backed store. Cheap to clone (the pool is reference counted).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AttendanceStore for PgStore {
    async fn find_unit(&self, id: UnitId) -> Result<Option<Unit>, AppError> {
        unit::find_by_id(&self.pool, id).await
    }

    async fn find_units(&self) -> Result<Vec<Unit>, AppError> {
        unit::find_all(&self.pool).await
    }

    async fn find_meetings(&self, key: &MeetingKey) -> Result<Vec<Meeting>, AppError> {
        meeting::find_by_key(&self.pool, key).await
    }

    async fn find_meeting(&self, key: &MeetingKey) -> Result<Option<Meeting>, AppError> {
        meeting::find_one_by_key(&self.pool, key).await
    }

    async fn insert_meeting(&self, new: &NewMeeting) -> Result<InsertOutcome, AppError> {
        meeting::insert(&self.pool, new).await
    }

    async fn count_attendance(&self, meeting_ids: &[MeetingId]) -> Result<HashMap<MeetingId, i64>, AppError> {
        meeting::count_attendance(&self.pool, meeting_ids).await
    }

    async fn find_attendance(&self, meeting_ids: &[MeetingId]) -> Result<Vec<AttendanceRecord>, AppError> {
        attendance::find_by_meetings(&self.pool, meeting_ids).await
    }

    async fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord, AppError> {
        attendance::insert(&self.pool, new).await
    }

    async fn update_attendance(&self, id: RecordId, update: &AttendanceUpdate) -> Result<(), AppError> {
        attendance::update(&self.pool, id, update).await
    }

    async fn delete_attendance(&self, id: RecordId) -> Result<(), AppError> {
        attendance::delete(&self.pool, id).await
    }

    async fn delete_attendance_for_meetings(&self, meeting_ids: &[MeetingId]) -> Result<u64, AppError> {
        attendance::delete_by_meetings(&self.pool, meeting_ids).await
    }

    async fn delete_attendance_records(&self, ids: &[RecordId]) -> Result<u64, AppError> {
        attendance::delete_by_ids(&self.pool, ids).await
    }

    async fn find_members_by_units(&self, unit_ids: &[UnitId]) -> Result<Vec<Member>, AppError> {
        member::find_by_units(&self.pool, unit_ids).await
    }

    async fn find_members_by_ids(&self, ids: &[MemberId]) -> Result<Vec<Member>, AppError> {
        member::find_by_ids(&self.pool, ids).await
    }

    async fn find_tier_memberships(&self, unit_ids: &[UnitId]) -> Result<Vec<TierMembership>, AppError> {
        tier::find_by_units(&self.pool, unit_ids).await
    }
}
