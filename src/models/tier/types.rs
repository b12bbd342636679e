use serde::Serialize;

use crate::models::{MemberId, UnitId};

/// Attendance-priority class of a member within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Regular,
    Semi,
    Pool,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Regular => "regular",
            Tier::Semi => "semi",
            Tier::Pool => "pool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(Tier::Regular),
            "semi" => Some(Tier::Semi),
            "pool" => Some(Tier::Pool),
            _ => None,
        }
    }
}

/// One entry of a unit's regular/semi/pool list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierMembership {
    pub unit_id: UnitId,
    pub member_id: MemberId,
    pub tier: Tier,
}
