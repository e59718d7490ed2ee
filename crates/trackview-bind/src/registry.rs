#![forbid(unsafe_code)]

//! Per-call-site result cache.
//!
//! Maps an [`InstanceIdentity`] to the dependency list and result of the
//! last evaluation. Entries are written only by the binding that owns the
//! identity, so one registry is shared by every call site under a root.
//!
//! # Invariants
//!
//! 1. At most one entry per identity; deps and result are replaced together.
//! 2. A hit never invokes the compute closure and refreshes the stored deps.
//! 3. The compute closure runs with the registry unborrowed, so it may use
//!    the registry itself.
//! 4. `evict` is idempotent; an evicted identity behaves as a fresh miss.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use trackview_core::{Deps, deps_equal};

/// Opaque token naming one mounted call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceIdentity(u64);

impl InstanceIdentity {
    /// Get the raw identity value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site#{}", self.0)
    }
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub hits: u64,
    pub misses: u64,
    pub updates: u64,
    pub evictions: u64,
}

struct Entry {
    deps: Option<Deps>,
    result: Rc<dyn Any>,
}

/// Identity-keyed cache of `{deps, result}` entries.
pub struct Registry {
    next_identity: Cell<u64>,
    entries: RefCell<AHashMap<InstanceIdentity, Entry>>,
    stats: Cell<RegistryStats>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_identity: Cell::new(1),
            entries: RefCell::new(AHashMap::new()),
            stats: Cell::new(RegistryStats::default()),
        }
    }

    /// A fresh identity, never returned before by this registry.
    pub fn create_identity(&self) -> InstanceIdentity {
        let id = InstanceIdentity(self.next_identity.get());
        self.next_identity.set(id.0 + 1);
        id
    }

    /// Return the cached result for `id` if its stored deps equal `deps`,
    /// otherwise run `compute`, store `{deps, result}` and return it.
    ///
    /// An entry holding a value of another type counts as a miss.
    ///
    /// # Errors
    ///
    /// Whatever `compute` returns; the existing entry is left untouched.
    pub fn get_or_compute<T, E>(
        &self,
        id: InstanceIdentity,
        deps: Option<&Deps>,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<Rc<T>, E>
    where
        T: Any,
    {
        let hit = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&id) {
                Some(entry) if deps_equal(deps, entry.deps.as_ref()) => {
                    match Rc::clone(&entry.result).downcast::<T>() {
                        Ok(result) => {
                            entry.deps = deps.cloned();
                            Some(result)
                        }
                        Err(_) => None,
                    }
                }
                _ => None,
            }
        };
        if let Some(result) = hit {
            self.bump(|s| s.hits += 1);
            tracing::trace!(message = "registry.hit", identity = id.get());
            return Ok(result);
        }

        self.bump(|s| s.misses += 1);
        tracing::trace!(message = "registry.miss", identity = id.get());
        let result = Rc::new(compute()?);
        self.entries.borrow_mut().insert(
            id,
            Entry {
                deps: deps.cloned(),
                result: Rc::clone(&result) as Rc<dyn Any>,
            },
        );
        Ok(result)
    }

    /// Overwrite the entry for `id` unconditionally.
    pub fn update<T: Any>(&self, id: InstanceIdentity, deps: Option<Deps>, result: Rc<T>) {
        self.entries.borrow_mut().insert(id, Entry { deps, result });
        self.bump(|s| s.updates += 1);
        tracing::trace!(message = "registry.update", identity = id.get());
    }

    /// Remove the entry for `id`. Returns whether one existed.
    pub fn evict(&self, id: InstanceIdentity) -> bool {
        let removed = self.entries.borrow_mut().remove(&id);
        let existed = removed.is_some();
        // Drop the result outside the borrow.
        drop(removed);
        if existed {
            self.bump(|s| s.evictions += 1);
            tracing::trace!(message = "registry.evict", identity = id.get());
        }
        existed
    }

    /// The cached result for `id`, if present and of type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, id: InstanceIdentity) -> Option<Rc<T>> {
        let result = Rc::clone(&self.entries.borrow().get(&id)?.result);
        result.downcast::<T>().ok()
    }

    /// The deps stored for `id`.
    #[must_use]
    pub fn deps(&self, id: InstanceIdentity) -> Option<Deps> {
        self.entries.borrow().get(&id)?.deps.clone()
    }

    #[must_use]
    pub fn contains(&self, id: InstanceIdentity) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut RegistryStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use trackview_core::deps;

    fn ok<T>(value: T) -> impl FnOnce() -> Result<T, Infallible> {
        move || Ok(value)
    }

    #[test]
    fn identities_are_distinct() {
        let registry = Registry::new();
        let a = registry.create_identity();
        let b = registry.create_identity();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn equal_deps_hit_without_computing() {
        let registry = Registry::new();
        let id = registry.create_identity();
        let first = registry
            .get_or_compute(id, Some(&deps![1, "a"]), ok(10))
            .expect("compute");
        let second = registry
            .get_or_compute(id, Some(&deps![1, "a"]), || -> Result<i32, Infallible> {
                panic!("must not recompute")
            })
            .expect("hit");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.stats().hits, 1);
        assert_eq!(registry.stats().misses, 1);
    }

    #[test]
    fn hit_refreshes_stored_deps() {
        let registry = Registry::new();
        let id = registry.create_identity();
        let original = deps![1];
        let refreshed = deps![1];
        registry.get_or_compute(id, Some(&original), ok(1)).expect("compute");
        registry.get_or_compute(id, Some(&refreshed), ok(2)).expect("hit");
        let stored = registry.deps(id).expect("entry");
        assert!(stored.ptr_eq(&refreshed));
        assert!(!stored.ptr_eq(&original));
    }

    #[test]
    fn changed_or_absent_deps_recompute() {
        let registry = Registry::new();
        let id = registry.create_identity();
        registry.get_or_compute(id, Some(&deps![1]), ok(1)).expect("compute");
        let changed = registry.get_or_compute(id, Some(&deps![2]), ok(2)).expect("miss");
        assert_eq!(*changed, 2);
        let longer = registry.get_or_compute(id, Some(&deps![2, 3]), ok(3)).expect("miss");
        assert_eq!(*longer, 3);
        let absent = registry.get_or_compute(id, None, ok(4)).expect("miss");
        assert_eq!(*absent, 4);
        let again = registry.get_or_compute(id, None, ok(5)).expect("miss");
        assert_eq!(*again, 5);
        assert_eq!(registry.stats().hits, 0);
    }

    #[test]
    fn compute_error_leaves_entry_untouched() {
        let registry = Registry::new();
        let id = registry.create_identity();
        registry.get_or_compute(id, Some(&deps![1]), ok(1)).expect("compute");
        let err = registry
            .get_or_compute(id, Some(&deps![2]), || Err::<i32, _>("boom"))
            .expect_err("propagates");
        assert_eq!(err, "boom");
        assert_eq!(registry.get::<i32>(id).as_deref(), Some(&1));
    }

    #[test]
    fn type_mismatch_is_a_miss() {
        let registry = Registry::new();
        let id = registry.create_identity();
        registry.get_or_compute(id, Some(&deps![]), ok(1u8)).expect("compute");
        let text = registry
            .get_or_compute(id, Some(&deps![]), ok(String::from("x")))
            .expect("miss");
        assert_eq!(text.as_str(), "x");
    }

    #[test]
    fn compute_may_reenter_registry() {
        let registry = Registry::new();
        let outer = registry.create_identity();
        let inner = registry.create_identity();
        let value = registry
            .get_or_compute(outer, Some(&deps![]), || {
                let nested = registry.get_or_compute(inner, Some(&deps![]), ok(2))?;
                Ok::<_, Infallible>(*nested * 10)
            })
            .expect("compute");
        assert_eq!(*value, 20);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn update_overwrites_and_evict_is_idempotent() {
        let registry = Registry::new();
        let id = registry.create_identity();
        registry.update(id, Some(deps![1]), Rc::new(7));
        assert_eq!(registry.get::<i32>(id).as_deref(), Some(&7));
        assert!(registry.evict(id));
        assert!(!registry.evict(id));
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
        assert_eq!(registry.stats().evictions, 1);
    }
}
