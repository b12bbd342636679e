pub mod attendance;
pub mod meeting;
pub mod member;
pub mod tier;
pub mod unit;

pub type LocalityId = i64;
pub type UnitId = i64;
pub type MemberId = i64;
pub type MeetingId = i64;
pub type RecordId = i64;
