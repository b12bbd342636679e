use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{LocalityId, MeetingId, UnitId};

/// Meeting kind. Only the weekly main meeting is handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingKind {
    Main,
}

impl MeetingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingKind::Main => "main",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(MeetingKind::Main),
            _ => None,
        }
    }
}

/// What a meeting belongs to: exactly one unit, or a whole locality (combined meeting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MeetingScope {
    Unit(UnitId),
    Locality(LocalityId),
}

impl MeetingScope {
    /// `(unit_id, locality_id)` column values; exactly one is set.
    pub fn columns(&self) -> (Option<UnitId>, Option<LocalityId>) {
        match *self {
            MeetingScope::Unit(id) => (Some(id), None),
            MeetingScope::Locality(id) => (None, Some(id)),
        }
    }
}

/// Identity tuple of a meeting. At most one row should exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeetingKey {
    pub event_date: NaiveDate,
    pub kind: MeetingKind,
    pub scope: MeetingScope,
}

impl MeetingKey {
    pub fn unit(event_date: NaiveDate, unit_id: UnitId) -> Self {
        Self { event_date, kind: MeetingKind::Main, scope: MeetingScope::Unit(unit_id) }
    }

    pub fn locality(event_date: NaiveDate, locality_id: LocalityId) -> Self {
        Self { event_date, kind: MeetingKind::Main, scope: MeetingScope::Locality(locality_id) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub event_date: NaiveDate,
    pub kind: MeetingKind,
    pub scope: MeetingScope,
    pub name: String,
}

impl Meeting {
    pub fn key(&self) -> MeetingKey {
        MeetingKey { event_date: self.event_date, kind: self.kind, scope: self.scope }
    }
}

#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub key: MeetingKey,
    pub name: String,
}

/// Result of a meeting insert. A unique-constraint hit is a named branch,
/// not an error: it means another caller created the row first.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Meeting),
    UniqueViolation,
}

/// Raw `meetings` row, narrowed into `Meeting` right after the fetch.
#[derive(Debug, sqlx::FromRow)]
pub struct MeetingRow {
    pub id: i64,
    pub event_date: NaiveDate,
    pub kind: String,
    pub unit_id: Option<i64>,
    pub locality_id: Option<i64>,
    pub name: String,
}

impl TryFrom<MeetingRow> for Meeting {
    type Error = AppError;

    fn try_from(row: MeetingRow) -> Result<Self, Self::Error> {
        let kind = MeetingKind::parse(&row.kind).ok_or_else(|| {
            AppError::InvalidState(format!("meeting {} has unknown kind '{}'", row.id, row.kind))
        })?;
        let scope = match (row.unit_id, row.locality_id) {
            (Some(unit), None) => MeetingScope::Unit(unit),
            (None, Some(locality)) => MeetingScope::Locality(locality),
            _ => {
                return Err(AppError::InvalidState(format!(
                    "meeting {} must reference exactly one of unit or locality",
                    row.id
                )));
            }
        };
        Ok(Meeting { id: row.id, event_date: row.event_date, kind, scope, name: row.name })
    }
}
