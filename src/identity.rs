//! Class identity allocation.
//!
//! Every type participating in runtime conversion gets a process-wide
//! `ClassId` on first reference. The id space is split in two: the low
//! half for explicitly registered classes, the high half for "local" ids
//! handed out to types that are only ever used as conversion-cache keys.
//! A local id must never be observable through the registered-lookup
//! query, because downstream code treats a registered id as proof that
//! conversion edges exist for it.

use std::any::TypeId;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Key identifying a class to the registry. One id per distinct type.
pub type TypeKey = TypeId;

/// First id of the local (cache-key-only) partition.
pub const LOCAL_ID_BASE: u64 = u64::MAX / 2;

/// Opaque class identifier.
///
/// Ids below [`LOCAL_ID_BASE`] belong to explicitly registered classes and
/// are stable lookup keys for the process lifetime. Ids at or above it are
/// local ids: valid as cache keys, never reported as registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u64);

impl ClassId {
    pub fn is_local(self) -> bool {
        self.0 >= LOCAL_ID_BASE
    }

    /// Vertex-table index. Only meaningful for registered ids.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// IdentityRegistry
// ============================================================================

/// Thread-safe class id allocator and type-key map.
///
/// Ids are assigned monotonically and never reclaimed. The map and both
/// counters live behind one mutex so an id is assigned and recorded
/// atomically; no two distinct keys can race into the same id.
pub struct IdentityRegistry {
    inner: Mutex<IdentityInner>,
}

struct IdentityInner {
    ids: HashMap<TypeKey, ClassId>,
    next_registered: u64,
    next_local: u64,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IdentityInner {
                ids: HashMap::new(),
                next_registered: 0,
                next_local: LOCAL_ID_BASE,
            }),
        }
    }

    /// Allocate (or return) the registered id for a key.
    ///
    /// The first call for a key assigns the next low-partition id; later
    /// calls return the same id. A key that previously received a local id
    /// is upgraded to a registered id here.
    pub fn allocate(&self, key: TypeKey) -> ClassId {
        let mut inner = self.inner.lock();
        match inner.ids.get(&key).copied() {
            Some(id) if !id.is_local() => id,
            _ => {
                let id = ClassId(inner.next_registered);
                inner.next_registered += 1;
                inner.ids.insert(key, id);
                id
            }
        }
    }

    /// Look up the registered id for a key.
    ///
    /// Returns `None` for unknown keys and for keys that only ever received
    /// a local id.
    pub fn registered(&self, key: TypeKey) -> Option<ClassId> {
        let inner = self.inner.lock();
        inner.ids.get(&key).copied().filter(|id| !id.is_local())
    }

    /// Return the key's id, assigning a fresh local id if it has none.
    pub fn local(&self, key: TypeKey) -> ClassId {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.ids.get(&key).copied() {
            return id;
        }
        let id = ClassId(inner.next_local);
        inner.next_local += 1;
        debug_assert!(id.is_local());
        inner.ids.insert(key, id);
        id
    }

    /// Bind a caller-chosen registered id to a key ahead of first use.
    ///
    /// Idempotent for the same `(id, key)` pair, and allowed to replace a
    /// previously assigned local id. Rebinding a key that already holds a
    /// different registered id is a contract violation.
    ///
    /// # Panics
    ///
    /// If `id` is in the local partition, or if `key` is already bound to a
    /// different registered id.
    pub fn bind(&self, id: ClassId, key: TypeKey) {
        assert!(!id.is_local(), "bind requires a registered-partition id");
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.ids.get(&key).copied() {
            assert!(
                existing == id || existing.is_local(),
                "type key already bound to class {existing}, cannot rebind to {id}"
            );
        }
        inner.ids.insert(key, id);
        // Later allocations must stay clear of explicitly bound ids.
        inner.next_registered = inner.next_registered.max(id.0 + 1);
    }

    // ========================================================================
    // Typed front-ends
    // ========================================================================

    pub fn allocate_for<T: ?Sized + 'static>(&self) -> ClassId {
        self.allocate(TypeId::of::<T>())
    }

    pub fn registered_for<T: ?Sized + 'static>(&self) -> Option<ClassId> {
        self.registered(TypeId::of::<T>())
    }

    pub fn local_for<T: ?Sized + 'static>(&self) -> ClassId {
        self.local(TypeId::of::<T>())
    }

    pub fn bind_for<T: ?Sized + 'static>(&self, id: ClassId) {
        self.bind(id, TypeId::of::<T>())
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
