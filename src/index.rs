//! Concurrent package dependency index.
//!
//! The index is the shared in-memory store behind every connection: a map
//! from package name to its dependency set and inbound-reference count.
//! Two rules hold between any two operations:
//!
//! - a package can only be indexed once all of its dependencies are, and
//! - a package cannot be removed while another indexed package depends
//!   on it.
//!
//! Because insertion requires dependencies to exist first, insertion order
//! is a topological order and the graph is acyclic by construction. No
//! cycle detection is needed anywhere.
//!
//! Names are raw bytes. The wire format reserves a few characters, but the
//! index itself imposes no lexical constraints at all — even the empty
//! name is storable here; the codec is what keeps it off the wire.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A package name as it appears on the wire: a byte string.
pub type Name = Vec<u8>;

/// What the index holds per package.
struct Entry {
    /// Number of currently indexed packages whose dependency set names
    /// this package. Guards removal.
    ref_count: u64,
    /// Dependency names supplied when the package was first indexed.
    /// Immutable for the entry's lifetime; re-indexing does not touch it.
    deps: HashSet<Name>,
}

/// Shared dependency index.
///
/// All operations return a bare verdict: `true` for success, `false` for
/// refusal. There is no error channel. Mutations are serialized by a
/// single readers/writer lock; queries run concurrently with each other.
pub struct Index {
    entries: RwLock<HashMap<Name, Entry>>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Index `pkg` with the given dependency set.
    ///
    /// Returns `true` if the package was inserted or was already present.
    /// Re-indexing an existing package is a deliberate no-op: the original
    /// dependency set is kept and the supplied one ignored, so clients can
    /// treat the operation as an idempotent retry. Returns `false`, with
    /// no mutation at all, if any dependency is not currently indexed.
    pub fn index(&self, pkg: &[u8], deps: HashSet<Name>) -> bool {
        let mut entries = self.write();
        if entries.contains_key(pkg) {
            return true;
        }
        if !deps.is_empty() {
            // Existence check and refcount bumps form one step under the
            // write lock; a failed check leaves every count untouched.
            if !deps.iter().all(|dep| entries.contains_key(dep)) {
                return false;
            }
            for dep in &deps {
                if let Some(entry) = entries.get_mut(dep) {
                    entry.ref_count += 1;
                }
            }
        }
        entries.insert(pkg.to_vec(), Entry { ref_count: 0, deps });
        true
    }

    /// Remove `pkg` from the index.
    ///
    /// Returns `true` if the package was removed or was never indexed.
    /// Returns `false`, with no mutation, while any other indexed package
    /// still depends on it.
    pub fn remove(&self, pkg: &[u8]) -> bool {
        let mut entries = self.write();
        match entries.get(pkg) {
            None => true,
            Some(entry) if entry.ref_count > 0 => false,
            Some(_) => {
                if let Some(entry) = entries.remove(pkg) {
                    for dep in &entry.deps {
                        if let Some(dep_entry) = entries.get_mut(dep) {
                            dep_entry.ref_count -= 1;
                        }
                    }
                }
                true
            }
        }
    }

    /// Whether `pkg` is currently indexed. Read-only fast path.
    pub fn query(&self, pkg: &[u8]) -> bool {
        self.read().contains_key(pkg)
    }

    /// Number of indexed packages.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Mutations never panic while the lock is held, so a poisoned lock
    // still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Name, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Name, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn deps(names: &[&str]) -> HashSet<Name> {
        names.iter().map(|n| n.as_bytes().to_vec()).collect()
    }

    #[test]
    fn lifecycle() {
        let index = Index::new();

        assert!(index.remove(b"A"), "removing an un-indexed package is ok");
        assert!(!index.query(b"A"));

        assert!(!index.index(b"A", deps(&["B"])), "missing dep must refuse");
        assert!(index.index(b"B", HashSet::new()));
        assert!(index.index(b"C", deps(&[])));
        assert!(index.index(b"A", deps(&["B"])));

        // The empty name is valid at this layer, as a package and as a dep.
        assert!(index.index(b"", deps(&["A", "B"])));
        assert!(index.index(b"D", deps(&["", "A"])));

        assert!(index.query(b"A"));
        assert!(index.query(b"B"));
        assert!(index.query(b"C"));
        assert!(index.query(b""));
        assert!(index.query(b"D"));

        // Re-index succeeds but must NOT add C to A's deps.
        assert!(index.index(b"A", deps(&["B", "C"])));
        assert!(index.remove(b"C"), "C has no dependents");
        assert!(!index.remove(b"B"), "A and the empty name depend on B");

        assert!(index.remove(b"D"));
        assert!(index.remove(b""));
        assert!(index.remove(b"A"));
        assert!(index.remove(b"B"));

        for pkg in [&b"A"[..], b"B", b"C", b"D", b""] {
            assert!(!index.query(pkg));
        }
        assert!(index.is_empty());
    }

    #[test]
    fn index_is_idempotent() {
        let index = Index::new();
        assert!(index.index(b"base", HashSet::new()));
        assert!(index.index(b"pkg", deps(&["base"])));
        assert!(index.index(b"pkg", deps(&["base"])));

        // Exactly one reference to base, no matter how often pkg retried.
        assert!(!index.remove(b"base"));
        assert!(index.remove(b"pkg"));
        assert!(index.remove(b"base"));
    }

    #[test]
    fn remove_is_idempotent() {
        let index = Index::new();
        assert!(index.index(b"pkg", HashSet::new()));
        assert!(index.remove(b"pkg"));
        assert!(index.remove(b"pkg"));
        assert!(!index.query(b"pkg"));
    }

    #[test]
    fn remove_restores_refcounts() {
        let index = Index::new();
        assert!(index.index(b"lib", HashSet::new()));
        assert!(index.index(b"app", deps(&["lib"])));

        // lib is pinned while app is indexed, free once app is gone.
        assert!(!index.remove(b"lib"));
        assert!(index.remove(b"app"));
        assert!(index.remove(b"lib"));
        assert!(index.is_empty());
    }

    #[test]
    fn self_dependency_refused() {
        let index = Index::new();
        // A package cannot name itself: it is not indexed yet.
        assert!(!index.index(b"loop", deps(&["loop"])));
        assert!(!index.query(b"loop"));
    }

    #[test]
    fn reverse_topological_teardown() {
        let index = Index::new();
        // Diamond: d -> {b, c} -> a
        assert!(index.index(b"a", HashSet::new()));
        assert!(index.index(b"b", deps(&["a"])));
        assert!(index.index(b"c", deps(&["a"])));
        assert!(index.index(b"d", deps(&["b", "c"])));

        // Removing in reverse insertion order always succeeds and drains
        // the index completely.
        for pkg in [&b"d"[..], b"c", b"b", b"a"] {
            assert!(index.remove(pkg), "remove failed for {:?}", pkg);
        }
        assert!(index.is_empty());
    }

    #[test]
    fn concurrent_interleaving_keeps_invariants() {
        let index = Arc::new(Index::new());
        assert!(index.index(b"base", HashSet::new()));

        let mut handles = Vec::new();
        for t in 0..8 {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                let pkg = format!("pkg-{t}").into_bytes();
                for _ in 0..200 {
                    assert!(index.index(&pkg, deps(&["base"])));
                    assert!(index.query(&pkg));
                    assert!(index.remove(&pkg));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every dependent released its reference, so base must be free.
        assert!(index.remove(b"base"));
        assert!(index.is_empty());
    }
}
