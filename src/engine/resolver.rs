//! Meeting identity resolution.
//!
//! For a (date, unit) pair exactly one meeting row is authoritative. Rows
//! are created lazily with an insert-then-requery pattern that tolerates
//! concurrent creators, and duplicates that already exist are collapsed by
//! attendance count.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::attendance::AttendanceRecord;
use crate::models::meeting::{InsertOutcome, Meeting, MeetingKey, MeetingScope, NewMeeting};
use crate::models::unit::Unit;
use crate::models::{LocalityId, MeetingId, MemberId, UnitId};
use crate::store::AttendanceStore;

/// Localities that run one combined meeting on the date being resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedModes(HashSet<LocalityId>);

impl CombinedModes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, locality_id: LocalityId) {
        self.0.insert(locality_id);
    }

    pub fn is_combined(&self, locality_id: LocalityId) -> bool {
        self.0.contains(&locality_id)
    }

    /// Parse a comma-separated list of locality ids (`"3,7"`). Empty means none.
    pub fn parse_list(s: &str) -> Result<Self, AppError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<LocalityId>()
                    .map_err(|_| AppError::InvalidInput(format!("bad locality id '{}'", p)))
            })
            .collect()
    }
}

impl FromIterator<LocalityId> for CombinedModes {
    fn from_iter<I: IntoIterator<Item = LocalityId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of `insert_or_fetch`: the row now in the store, and whether this call created it.
#[derive(Debug, Clone)]
pub struct Registered {
    pub meeting: Meeting,
    pub created: bool,
}

/// Per-unit outcome of a batch resolution. One unit failing does not fail the others.
#[derive(Debug, Default)]
pub struct BatchResolution {
    pub meetings: HashMap<UnitId, MeetingId>,
    pub failures: BTreeMap<UnitId, AppError>,
}

impl BatchResolution {
    /// All-or-nothing view: the first failure (lowest unit id) wins.
    pub fn into_result(mut self) -> Result<HashMap<UnitId, MeetingId>, AppError> {
        match self.failures.pop_first() {
            Some((_, e)) => Err(e),
            None => Ok(self.meetings),
        }
    }
}

fn describe(key: &MeetingKey) -> String {
    match key.scope {
        MeetingScope::Unit(id) => format!("{} {} meeting of unit {}", key.event_date, key.kind.as_str(), id),
        MeetingScope::Locality(id) => {
            format!("{} combined {} meeting of locality {}", key.event_date, key.kind.as_str(), id)
        }
    }
}

fn unit_meeting(date: NaiveDate, unit: &Unit) -> NewMeeting {
    NewMeeting {
        key: MeetingKey::unit(date, unit.id),
        name: format!("{} main meeting {}", unit.name, date),
    }
}

fn locality_meeting(date: NaiveDate, unit: &Unit) -> NewMeeting {
    NewMeeting {
        key: MeetingKey::locality(date, unit.locality_id),
        name: format!("{} combined main meeting {}", unit.locality_name, date),
    }
}

pub struct MeetingResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: AttendanceStore> MeetingResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Authoritative meeting id for `unit` on `date`, created if absent.
    ///
    /// With `combined` set, the locality-wide meeting is ensured as well, but
    /// the id returned is still the unit's own: attendance always hangs off
    /// the per-unit meeting so flipping the mode later loses no history.
    pub async fn resolve(&self, date: NaiveDate, unit: &Unit, combined: bool) -> Result<MeetingId, AppError> {
        if combined {
            self.get_or_create(locality_meeting(date, unit)).await?;
        }
        Ok(self.get_or_create(unit_meeting(date, unit)).await?.id)
    }

    /// Resolve many units concurrently. Each combined locality's meeting is
    /// ensured once, however many of its units are in `units`.
    pub async fn resolve_all(&self, date: NaiveDate, units: &[Unit], combined: &CombinedModes) -> BatchResolution {
        let mut seen = BTreeSet::new();
        let locality_heads: Vec<&Unit> = units
            .iter()
            .filter(|u| combined.is_combined(u.locality_id) && seen.insert(u.locality_id))
            .collect();

        let (locality_results, unit_results) = futures::join!(
            join_all(locality_heads.iter().map(|u| self.get_or_create(locality_meeting(date, u)))),
            join_all(units.iter().map(|u| self.get_or_create(unit_meeting(date, u)))),
        );

        let mut failed_localities: HashMap<LocalityId, String> = HashMap::new();
        for (unit, result) in locality_heads.iter().zip(locality_results) {
            if let Err(e) = result {
                failed_localities.insert(unit.locality_id, e.to_string());
            }
        }

        let mut batch = BatchResolution::default();
        for (unit, result) in units.iter().zip(unit_results) {
            if let Some(reason) = failed_localities.get(&unit.locality_id) {
                batch.failures.insert(
                    unit.id,
                    AppError::RegistrationFailed(format!(
                        "combined meeting of locality {}: {}",
                        unit.locality_id, reason
                    )),
                );
                continue;
            }
            match result {
                Ok(meeting) => {
                    batch.meetings.insert(unit.id, meeting.id);
                }
                Err(e) => {
                    batch.failures.insert(unit.id, e);
                }
            }
        }
        batch
    }

    /// Find the authoritative row for `new.key`, inserting it if none exists.
    pub async fn get_or_create(&self, new: NewMeeting) -> Result<Meeting, AppError> {
        let candidates = self.store.find_meetings(&new.key).await?;
        if let Some(meeting) = self.pick_authoritative(&new.key, candidates).await? {
            return Ok(meeting);
        }
        Ok(self.insert_or_fetch(new).await?.meeting)
    }

    /// Idempotent insert. Losing a creation race is not an error: the row
    /// the winner created is fetched and returned with `created = false`.
    pub async fn insert_or_fetch(&self, new: NewMeeting) -> Result<Registered, AppError> {
        match self.store.insert_meeting(&new).await {
            Ok(InsertOutcome::Inserted(meeting)) => {
                log::info!("Registered meeting {} ({})", meeting.id, describe(&new.key));
                Ok(Registered { meeting, created: true })
            }
            Ok(InsertOutcome::UniqueViolation) => {
                log::debug!("Lost creation race for {}, using the existing row", describe(&new.key));
                let candidates = self.store.find_meetings(&new.key).await?;
                match self.pick_authoritative(&new.key, candidates).await? {
                    Some(meeting) => Ok(Registered { meeting, created: false }),
                    None => Err(AppError::RegistrationFailed(format!(
                        "{} conflicted on insert but no row is visible",
                        describe(&new.key)
                    ))),
                }
            }
            Err(e) => {
                log::error!("Could not register {}: {}", describe(&new.key), e);
                Err(AppError::RegistrationFailed(format!("{}: {}", describe(&new.key), e)))
            }
        }
    }

    /// Authoritative row for `key` without creating anything.
    pub async fn lookup(&self, key: &MeetingKey) -> Result<Option<Meeting>, AppError> {
        let candidates = self.store.find_meetings(key).await?;
        self.pick_authoritative(key, candidates).await
    }

    /// Collapse duplicates: the candidate with the most attendance rows wins,
    /// ties go to the lowest id. This repairs bad data, it does not prove
    /// the choice correct.
    async fn pick_authoritative(
        &self,
        key: &MeetingKey,
        mut candidates: Vec<Meeting>,
    ) -> Result<Option<Meeting>, AppError> {
        if candidates.len() <= 1 {
            return Ok(candidates.pop());
        }

        let ids: Vec<MeetingId> = candidates.iter().map(|m| m.id).collect();
        let counts = self.store.count_attendance(&ids).await?;
        let count_of = |id: MeetingId| counts.get(&id).copied().unwrap_or(0);
        let chosen = candidates
            .into_iter()
            .max_by_key(|m| (count_of(m.id), Reverse(m.id)));

        if let Some(meeting) = &chosen {
            log::warn!(
                "Duplicate meetings {:?} for {}; using {} with {} records (counts {:?})",
                ids,
                describe(key),
                meeting.id,
                count_of(meeting.id),
                counts
            );
        }
        Ok(chosen)
    }

    /// Look for attendance of `unit` outside its authoritative meeting, used
    /// when that meeting has no rows.
    ///
    /// First a point lookup on the unit key (a row created in the window
    /// between query and collapse), then the locality's combined meeting,
    /// keeping only rows of members on `roster`.
    pub async fn probe_fallback(
        &self,
        date: NaiveDate,
        unit: &Unit,
        authoritative: MeetingId,
        roster: &HashSet<MemberId>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        if let Some(meeting) = self.store.find_meeting(&MeetingKey::unit(date, unit.id)).await? {
            if meeting.id != authoritative {
                let rows = self.store.find_attendance(&[meeting.id]).await?;
                if !rows.is_empty() {
                    log::info!(
                        "Unit {} on {}: using {} rows from meeting {} instead of empty {}",
                        unit.id,
                        date,
                        rows.len(),
                        meeting.id,
                        authoritative
                    );
                    return Ok(rows);
                }
            }
        }

        let Some(combined) = self.store.find_meeting(&MeetingKey::locality(date, unit.locality_id)).await? else {
            return Ok(Vec::new());
        };
        let rows: Vec<AttendanceRecord> = self
            .store
            .find_attendance(&[combined.id])
            .await?
            .into_iter()
            .filter(|r| roster.contains(&r.member_id))
            .collect();
        if !rows.is_empty() {
            log::info!(
                "Unit {} on {}: using {} rows from combined meeting {}",
                unit.id,
                date,
                rows.len(),
                combined.id
            );
        }
        Ok(rows)
    }
}
