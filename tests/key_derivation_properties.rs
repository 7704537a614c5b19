//! Property-based tests for UID key derivation and the derivation cache.

use proptest::prelude::*;
use rand::RngCore;
use spooltag::keys::{derive, KEY_LEN, MIN_UID_LEN, SECTOR_COUNT};
use spooltag::KeyDerivationCache;
use std::collections::HashSet;

fn uid_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 4..=4),
        prop::collection::vec(any::<u8>(), 7..=7),
        prop::collection::vec(any::<u8>(), 4..=10),
    ]
}

proptest! {
    #[test]
    fn prop_sixteen_six_byte_keys(uid in uid_strategy()) {
        let keys = derive(&uid);
        prop_assert_eq!(keys.len(), SECTOR_COUNT);
        for pair in keys.iter() {
            prop_assert_eq!(pair.key_a.as_bytes().len(), KEY_LEN);
            prop_assert_eq!(pair.key_b.as_bytes().len(), KEY_LEN);
        }
    }

    #[test]
    fn prop_deterministic(uid in uid_strategy()) {
        prop_assert_eq!(derive(&uid), derive(&uid.clone()));
    }

    #[test]
    fn prop_distinct_uids_distinct_sets(a in uid_strategy(), b in uid_strategy()) {
        prop_assume!(a != b);
        prop_assert_ne!(derive(&a), derive(&b));
    }

    #[test]
    fn prop_no_zero_or_duplicate_keys(uid in uid_strategy()) {
        let keys = derive(&uid);
        let mut seen = HashSet::new();
        for key in keys.all_keys() {
            prop_assert!(!key.is_zero());
            prop_assert!(seen.insert(*key.as_bytes()));
        }
    }

    #[test]
    fn prop_short_uid_empty(uid in prop::collection::vec(any::<u8>(), 0..MIN_UID_LEN)) {
        prop_assert!(derive(&uid).is_empty());
    }

    #[test]
    fn prop_cache_matches_direct_derivation(
        uids in prop::collection::vec(uid_strategy(), 1..20),
        capacity in 1usize..5,
    ) {
        let cache = KeyDerivationCache::new(capacity);
        for uid in uids.iter().chain(uids.iter().rev()) {
            prop_assert_eq!(&*cache.get_or_derive(uid), &derive(uid));
        }
        prop_assert!(cache.len() <= capacity);
    }
}

#[test]
fn test_random_seven_byte_uids_unique() {
    let mut rng = rand::thread_rng();
    let mut sets = HashSet::new();
    for _ in 0..200 {
        let mut uid = [0u8; 7];
        rng.fill_bytes(&mut uid);
        let first = derive(&uid).sector(0).map(|p| *p.key_a.as_bytes());
        sets.insert((uid, first));
    }
    let firsts: HashSet<_> = sets.iter().map(|(_, k)| *k).collect();
    assert_eq!(firsts.len(), sets.len());
}
