use std::collections::{HashMap, HashSet};

use crate::models::tier::{Tier, TierMembership};
use crate::models::{MemberId, UnitId};

/// The regular/semi/pool lists of one unit.
#[derive(Debug, Clone, Default)]
pub struct TierLists {
    pub regular: HashSet<MemberId>,
    pub semi: HashSet<MemberId>,
    pub pool: HashSet<MemberId>,
}

impl TierLists {
    /// Priority is regular > semi > pool; a member on no list is semi.
    /// A member listed twice is not an error, the higher tier wins.
    pub fn classify(&self, member_id: MemberId) -> Tier {
        if self.regular.contains(&member_id) {
            Tier::Regular
        } else if self.semi.contains(&member_id) {
            Tier::Semi
        } else if self.pool.contains(&member_id) {
            Tier::Pool
        } else {
            Tier::Semi
        }
    }

    fn insert(&mut self, member_id: MemberId, tier: Tier) {
        match tier {
            Tier::Regular => self.regular.insert(member_id),
            Tier::Semi => self.semi.insert(member_id),
            Tier::Pool => self.pool.insert(member_id),
        };
    }
}

/// Tier lists for every unit of a roster load, built from one batch fetch.
#[derive(Debug, Clone, Default)]
pub struct TierIndex {
    by_unit: HashMap<UnitId, TierLists>,
}

impl TierIndex {
    pub fn from_memberships(memberships: impl IntoIterator<Item = TierMembership>) -> Self {
        let mut by_unit: HashMap<UnitId, TierLists> = HashMap::new();
        for m in memberships {
            by_unit.entry(m.unit_id).or_default().insert(m.member_id, m.tier);
        }
        Self { by_unit }
    }

    pub fn classify(&self, unit_id: UnitId, member_id: MemberId) -> Tier {
        match self.by_unit.get(&unit_id) {
            Some(lists) => lists.classify(member_id),
            None => Tier::Semi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists(regular: &[i64], semi: &[i64], pool: &[i64]) -> TierLists {
        TierLists {
            regular: regular.iter().copied().collect(),
            semi: semi.iter().copied().collect(),
            pool: pool.iter().copied().collect(),
        }
    }

    #[test]
    fn test_classify_each_list() {
        let l = lists(&[1], &[2], &[3]);
        assert_eq!(l.classify(1), Tier::Regular);
        assert_eq!(l.classify(2), Tier::Semi);
        assert_eq!(l.classify(3), Tier::Pool);
    }

    #[test]
    fn test_unlisted_member_defaults_to_semi() {
        assert_eq!(lists(&[1], &[], &[3]).classify(99), Tier::Semi);
    }

    #[test]
    fn test_semi_and_pool_overlap_classifies_semi() {
        assert_eq!(lists(&[], &[7], &[7]).classify(7), Tier::Semi);
    }

    #[test]
    fn test_regular_beats_everything() {
        assert_eq!(lists(&[7], &[7], &[7]).classify(7), Tier::Regular);
    }

    #[test]
    fn test_index_is_per_unit() {
        let index = TierIndex::from_memberships(vec![
            TierMembership { unit_id: 1, member_id: 10, tier: Tier::Pool },
            TierMembership { unit_id: 2, member_id: 10, tier: Tier::Regular },
        ]);
        assert_eq!(index.classify(1, 10), Tier::Pool);
        assert_eq!(index.classify(2, 10), Tier::Regular);
        assert_eq!(index.classify(3, 10), Tier::Semi);
    }
}
