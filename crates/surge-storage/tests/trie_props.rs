//! Property-based tests for the persistent trie.
//!
//! Uses proptest to verify the version contract across randomized key sets:
//! - Every key put (and not later overwritten or removed) is readable
//! - Lookups with the wrong value type miss
//! - Remove is idempotent and inverts a fresh put
//! - Old versions never observe later mutations

use proptest::prelude::*;
use std::collections::HashMap;
use surge_storage::Trie;

fn arbitrary_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..6)
}

fn arbitrary_entries() -> impl Strategy<Value = Vec<(Vec<u8>, u32)>> {
    prop::collection::vec((arbitrary_key(), any::<u32>()), 0..32)
}

fn build(entries: &[(Vec<u8>, u32)]) -> Trie {
    entries
        .iter()
        .fold(Trie::new(), |t, (k, v)| t.put(k, *v))
}

proptest! {
    /// Last write per key wins; keys never written miss.
    #[test]
    fn get_after_put(entries in arbitrary_entries(), probe in arbitrary_key()) {
        let trie = build(&entries);

        let mut expected: HashMap<&[u8], u32> = HashMap::new();
        for (k, v) in &entries {
            expected.insert(k.as_slice(), *v);
        }

        for (k, v) in &expected {
            prop_assert_eq!(trie.get::<u32>(k), Some(v));
        }
        if !expected.contains_key(probe.as_slice()) {
            prop_assert_eq!(trie.get::<u32>(&probe), None);
        }
    }

    /// A key stored with one type never answers lookups for another.
    #[test]
    fn type_discipline(key in arbitrary_key(), value in any::<u32>()) {
        let trie = Trie::new().put(&key, value);
        prop_assert_eq!(trie.get::<u64>(&key), None);
        prop_assert_eq!(trie.get::<String>(&key), None);
        prop_assert_eq!(trie.get::<u32>(&key), Some(&value));
    }

    /// remove(k) twice lands on the same result as removing once.
    #[test]
    fn remove_idempotent(entries in arbitrary_entries(), key in arbitrary_key()) {
        let trie = build(&entries);
        let once = trie.remove(&key);
        let twice = once.remove(&key);

        for (k, _) in &entries {
            prop_assert_eq!(once.get::<u32>(k), twice.get::<u32>(k));
        }
        prop_assert_eq!(once.get::<u32>(&key), None);
        prop_assert_eq!(twice.get::<u32>(&key), None);
    }

    /// put(k, v) followed by remove(k) restores every observable lookup,
    /// provided k was absent to begin with.
    #[test]
    fn put_then_remove_inverts(entries in arbitrary_entries(), key in arbitrary_key(), value in any::<u32>()) {
        let base = build(&entries);
        prop_assume!(base.get::<u32>(&key).is_none());

        let round_trip = base.put(&key, value).remove(&key);

        prop_assert_eq!(round_trip.get::<u32>(&key), None);
        for (k, _) in &entries {
            prop_assert_eq!(round_trip.get::<u32>(k), base.get::<u32>(k));
        }
        prop_assert_eq!(round_trip.is_empty(), base.is_empty());
    }

    /// Mutating a trie never changes what older versions return.
    #[test]
    fn old_versions_immutable(entries in arbitrary_entries(), key in arbitrary_key(), value in any::<u32>()) {
        let base = build(&entries);
        let before: Vec<Option<u32>> = entries
            .iter()
            .map(|(k, _)| base.get::<u32>(k).copied())
            .collect();

        let _mutated = base.put(&key, value);
        let _removed = base.remove(&key);

        let after: Vec<Option<u32>> = entries
            .iter()
            .map(|(k, _)| base.get::<u32>(k).copied())
            .collect();
        prop_assert_eq!(before, after);
    }
}

// ============================================================================
// Scenario tests
// ============================================================================

#[test]
fn mixed_types_across_versions() {
    let t1 = Trie::new().put(b"ab", 1u32);
    let t2 = t1.put(b"abc", 2u64);

    assert_eq!(t2.get::<u32>(b"ab"), Some(&1));
    assert_eq!(t2.get::<u64>(b"abc"), Some(&2));
    assert_eq!(t2.get::<u64>(b"ab"), None);
    assert_eq!(t1.get::<u64>(b"abc"), None);

    let t3 = t2.remove(b"abc");
    assert_eq!(t3.get::<u64>(b"abc"), None);
    assert_eq!(t3.get::<u32>(b"ab"), Some(&1));

    let t4 = t3.remove(b"ab");
    assert!(t4.is_empty());
}

#[test]
fn deep_chain_builds_and_collapses() {
    let key: Vec<u8> = (0..64).collect();
    let trie = Trie::new().put(&key, "deep".to_string());

    assert_eq!(trie.get::<String>(&key).map(String::as_str), Some("deep"));
    // No prefix of the key is a value node.
    for len in 0..key.len() {
        assert_eq!(trie.get::<String>(&key[..len]), None);
    }

    assert!(trie.remove(&key).is_empty());
}

#[test]
fn sibling_keys_survive_removal() {
    let trie = Trie::new()
        .put(b"car", 1u32)
        .put(b"cart", 2u32)
        .put(b"cat", 3u32);

    let trie = trie.remove(b"cart");
    assert_eq!(trie.get::<u32>(b"car"), Some(&1));
    assert_eq!(trie.get::<u32>(b"cat"), Some(&3));
    assert_eq!(trie.get::<u32>(b"cart"), None);

    let trie = trie.remove(b"car");
    assert_eq!(trie.get::<u32>(b"cat"), Some(&3));
    assert_eq!(trie.get::<u32>(b"car"), None);
}
