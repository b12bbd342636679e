use serde::Serialize;

use crate::models::{LocalityId, UnitId};

/// A district: the organizational node at which one weekly main meeting occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub locality_id: LocalityId,
    pub locality_name: String,
}
