use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{LocalityId, MemberId, UnitId};

/// One date range during which a member counts as locally enrolled.
/// `ends_on = None` means the period is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollmentPeriod {
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
}

impl EnrollmentPeriod {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.starts_on <= date && self.ends_on.is_none_or(|end| date <= end)
    }
}

/// Live member profile. Attendance rows keep their own copy of the
/// reporting fields (see `MemberSnapshot`), so edits here never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    /// Phonetic reading used for roster ordering.
    pub sort_key: String,
    pub baptized: bool,
    pub age_category: String,
    pub unit_id: Option<UnitId>,
    pub locality_id: Option<LocalityId>,
    pub enrollment: Vec<EnrollmentPeriod>,
}
