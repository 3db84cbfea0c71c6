//! Persistent copy-on-write trie keyed on byte strings.
//!
//! Every mutation returns a new [`Trie`] handle; the old handle keeps
//! answering lookups against the version it was created from. Versions share
//! all nodes off the mutated path, so a put or remove clones O(|key|) nodes.
//! Nodes are immutable once published and co-owned by every version that
//! references them; the graph is acyclic (parent to child only), so shared
//! ownership alone manages their lifetime.
//!
//! Values are heterogeneous per node: each value node stores a type-erased
//! cell, and [`Trie::get`] recovers the concrete type with a checked
//! downcast. Asking for the wrong type is not an error, just a miss.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Type-erased value payload, shared by every trie version that contains it.
type ValueCell = Arc<dyn Any + Send + Sync>;

/// A single trie node. A node with a value is a *value node*; interior nodes
/// exist only while some key passes through them.
#[derive(Default)]
struct TrieNode {
    children: BTreeMap<u8, Arc<TrieNode>>,
    value: Option<ValueCell>,
}

/// An immutable trie handle. Cloning the handle is O(1) and both clones see
/// the same version forever.
#[derive(Clone, Default)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    /// The empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no key has a value.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Look up `key`, returning its value if the terminal node stores a `T`.
    ///
    /// Returns `None` for missing keys, for keys whose terminal node is a
    /// bare interior node, and for values of a different type. The empty key
    /// addresses the root itself.
    pub fn get<T: Any + Send + Sync>(&self, key: &[u8]) -> Option<&T> {
        let mut node = self.root.as_deref()?;
        for &byte in key {
            node = node.children.get(&byte)?.as_ref();
        }
        node.value.as_ref()?.downcast_ref::<T>()
    }

    /// Return a new trie in which `key` maps to `value`.
    ///
    /// The terminal node keeps any children of the node it replaces, so
    /// overwriting a key never disturbs keys below it. Missing interior
    /// nodes along the path are created empty.
    pub fn put<T: Any + Send + Sync>(&self, key: &[u8], value: T) -> Trie {
        let cell: ValueCell = Arc::new(value);
        let new_root = put_node(self.root.as_ref(), key, cell);
        Trie {
            root: Some(Arc::new(new_root)),
        }
    }

    /// Return a new trie in which `key` has no value.
    ///
    /// If `key` does not address a value node the original trie is returned
    /// unchanged. Otherwise the terminal node loses its value and every
    /// node on the path that is left without value and children is dropped;
    /// a trie whose root dies this way is the empty trie.
    pub fn remove(&self, key: &[u8]) -> Trie {
        let Some(root) = self.root.as_ref() else {
            return self.clone();
        };
        match remove_node(root, key) {
            None => self.clone(),
            Some(None) => Trie::default(),
            Some(new_root) => Trie { root: new_root },
        }
    }
}

/// Rebuild the path for a put. Off-path children are shared with the source.
fn put_node(node: Option<&Arc<TrieNode>>, key: &[u8], cell: ValueCell) -> TrieNode {
    match key.split_first() {
        None => TrieNode {
            children: node.map(|n| n.children.clone()).unwrap_or_default(),
            value: Some(cell),
        },
        Some((&byte, rest)) => {
            let child = node.and_then(|n| n.children.get(&byte));
            let new_child = put_node(child, rest, cell);
            let mut children = node.map(|n| n.children.clone()).unwrap_or_default();
            children.insert(byte, Arc::new(new_child));
            TrieNode {
                children,
                value: node.and_then(|n| n.value.clone()),
            }
        }
    }
}

/// Rebuild the path for a remove.
///
/// * `None`: `key` has no value below `node`; nothing changes.
/// * `Some(None)`: the rewritten node is dead (no value, no children).
/// * `Some(Some(n))`: the rewritten node survives as `n`.
fn remove_node(node: &Arc<TrieNode>, key: &[u8]) -> Option<Option<Arc<TrieNode>>> {
    match key.split_first() {
        None => {
            node.value.as_ref()?;
            if node.children.is_empty() {
                Some(None)
            } else {
                Some(Some(Arc::new(TrieNode {
                    children: node.children.clone(),
                    value: None,
                })))
            }
        }
        Some((&byte, rest)) => {
            let child = node.children.get(&byte)?;
            let rewritten = remove_node(child, rest)?;
            let mut children = node.children.clone();
            match rewritten {
                None => {
                    children.remove(&byte);
                }
                Some(new_child) => {
                    children.insert(byte, new_child);
                }
            }
            if children.is_empty() && node.value.is_none() {
                Some(None)
            } else {
                Some(Some(Arc::new(TrieNode {
                    children,
                    value: node.value.clone(),
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trie() {
        let trie = Trie::new();
        assert!(trie.is_empty());
        assert_eq!(trie.get::<u32>(b"anything"), None);
        assert_eq!(trie.get::<u32>(b""), None);
    }

    #[test]
    fn test_put_and_get() {
        let trie = Trie::new().put(b"ab", 1u32);
        let trie = trie.put(b"abc", 2u64);

        assert_eq!(trie.get::<u32>(b"ab"), Some(&1));
        assert_eq!(trie.get::<u64>(b"abc"), Some(&2));
        assert_eq!(trie.get::<u32>(b"a"), None);
        assert_eq!(trie.get::<u32>(b"abcd"), None);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let trie = Trie::new().put(b"ab", 1u32);
        assert_eq!(trie.get::<u64>(b"ab"), None);
        assert_eq!(trie.get::<String>(b"ab"), None);
        assert_eq!(trie.get::<u32>(b"ab"), Some(&1));
    }

    #[test]
    fn test_old_versions_are_untouched() {
        let t1 = Trie::new().put(b"ab", 1u32);
        let t2 = t1.put(b"abc", 2u64);

        assert_eq!(t1.get::<u64>(b"abc"), None);
        assert_eq!(t2.get::<u64>(b"abc"), Some(&2));
        assert_eq!(t1.get::<u32>(b"ab"), Some(&1));

        let t3 = t2.remove(b"ab");
        assert_eq!(t2.get::<u32>(b"ab"), Some(&1));
        assert_eq!(t3.get::<u32>(b"ab"), None);
        assert_eq!(t3.get::<u64>(b"abc"), Some(&2));
    }

    #[test]
    fn test_overwrite_keeps_children() {
        let trie = Trie::new().put(b"a", 1u32).put(b"ab", 2u32);
        let trie = trie.put(b"a", "new".to_string());

        assert_eq!(trie.get::<String>(b"a").map(String::as_str), Some("new"));
        assert_eq!(trie.get::<u32>(b"ab"), Some(&2));
    }

    #[test]
    fn test_empty_key_addresses_root() {
        let trie = Trie::new().put(b"", 42u32);
        assert_eq!(trie.get::<u32>(b""), Some(&42));

        let trie = trie.put(b"x", 1u8);
        assert_eq!(trie.get::<u32>(b""), Some(&42));

        let removed = trie.remove(b"");
        assert_eq!(removed.get::<u32>(b""), None);
        assert_eq!(removed.get::<u8>(b"x"), Some(&1));

        // Removing the empty key from a childless value root empties the trie.
        let lone = Trie::new().put(b"", 7u32).remove(b"");
        assert!(lone.is_empty());
    }

    #[test]
    fn test_remove_collapses_dead_path() {
        let t2 = Trie::new().put(b"ab", 1u32).put(b"abc", 2u64);
        let t3 = t2.remove(b"abc");

        assert_eq!(t3.get::<u64>(b"abc"), None);
        assert_eq!(t3.get::<u32>(b"ab"), Some(&1));

        let t4 = t3.remove(b"ab");
        assert!(t4.is_empty());
    }

    #[test]
    fn test_remove_missing_key_returns_same_version() {
        let empty = Trie::new();
        assert!(empty.remove(b"x").is_empty());

        let t2 = Trie::new().put(b"ab", 1u32).put(b"abc", 2u64);
        // "a" is on the path but is not a value node.
        let same = t2.remove(b"a");
        assert!(Arc::ptr_eq(
            same.root.as_ref().unwrap(),
            t2.root.as_ref().unwrap()
        ));
        let same = t2.remove(b"zzz");
        assert!(Arc::ptr_eq(
            same.root.as_ref().unwrap(),
            t2.root.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let t = Trie::new().put(b"ab", 1u32).put(b"cd", 2u32);
        let once = t.remove(b"ab");
        let twice = once.remove(b"ab");
        assert!(Arc::ptr_eq(
            once.root.as_ref().unwrap(),
            twice.root.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_value_root_survives_deep_remove() {
        // Removing the last child of a value-bearing root must not drop the
        // root's own value.
        let trie = Trie::new().put(b"", 9u32).put(b"a", 1u32);
        let trie = trie.remove(b"a");
        assert_eq!(trie.get::<u32>(b""), Some(&9));
        assert!(!trie.is_empty());
    }

    #[test]
    fn test_structural_sharing_off_path() {
        let t1 = Trie::new().put(b"ax", 1u32).put(b"by", 2u32);
        let t2 = t1.put(b"az", 3u32);

        // The subtree under 'b' is shared by identity; the path through 'a'
        // was rewritten.
        let root1 = t1.root.as_ref().unwrap();
        let root2 = t2.root.as_ref().unwrap();
        assert!(!Arc::ptr_eq(root1, root2));
        assert!(Arc::ptr_eq(
            root1.children.get(&b'b').unwrap(),
            root2.children.get(&b'b').unwrap()
        ));
        assert!(!Arc::ptr_eq(
            root1.children.get(&b'a').unwrap(),
            root2.children.get(&b'a').unwrap()
        ));
    }

    #[test]
    fn test_values_are_shared_across_versions() {
        let t1 = Trie::new().put(b"k", "payload".to_string());
        let t2 = t1.put(b"other", 1u32);

        let a: *const String = t1.get::<String>(b"k").unwrap();
        let b: *const String = t2.get::<String>(b"k").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_copy_values() {
        let trie = Trie::new().put(b"boxed", Box::new(5u32));
        assert_eq!(trie.get::<Box<u32>>(b"boxed"), Some(&Box::new(5u32)));
    }

    #[test]
    fn test_concurrent_readers() {
        let trie = (0u32..64).fold(Trie::new(), |t, i| {
            t.put(format!("key{i}").as_bytes(), i)
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = trie.clone();
                std::thread::spawn(move || {
                    for i in 0u32..64 {
                        assert_eq!(t.get::<u32>(format!("key{i}").as_bytes()), Some(&i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
