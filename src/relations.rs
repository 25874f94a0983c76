//! Pointer-relation registry.
//!
//! Wrapper types (reference-counted handles and the like) are registered
//! classes in their own right, but conversion needs to know what they
//! refer to: a handle's most-derived conversion path runs through its
//! pointee. Each relation records the wrapper flavor, the pointee's class
//! id, and optional functions projecting the wrapper to and from the
//! generic boxed representation.
//!
//! Registration happens a handful of times at startup; lookups happen on
//! every wrapper conversion. The table sits behind the weak/hard lock:
//! registration takes a hard guard, lookups take weak guards and proceed
//! concurrently.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::boxed::CastBox;
use crate::identity::ClassId;
use crate::lock::WeakHardLock;

/// Projects a wrapper value to or from the generic boxed representation.
/// The invalid box signals that the projection refused the value.
pub type HandleCastFn = Arc<dyn Fn(&CastBox) -> CastBox + Send + Sync>;

/// Wrapper flavor of a registered pointer-like class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerKind {
    /// Plain pointer or reference wrapper.
    Raw,
    /// Shared (reference-counted) handle.
    Shared,
    /// Non-owning observer of a shared handle.
    Weak,
}

/// One registered relation: what a wrapper class points at and how to
/// unwrap/rewrap it.
#[derive(Clone)]
pub struct PointerDescriptor {
    pub kind: PointerKind,
    pub target: ClassId,
    pub cast_to: Option<HandleCastFn>,
    pub cast_from: Option<HandleCastFn>,
}

impl PointerDescriptor {
    pub fn new(kind: PointerKind, target: ClassId) -> Self {
        Self {
            kind,
            target,
            cast_to: None,
            cast_from: None,
        }
    }

    pub fn with_casts(mut self, cast_to: HandleCastFn, cast_from: HandleCastFn) -> Self {
        self.cast_to = Some(cast_to);
        self.cast_from = Some(cast_from);
        self
    }
}

impl fmt::Debug for PointerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerDescriptor")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("cast_to", &self.cast_to.is_some())
            .field("cast_from", &self.cast_from.is_some())
            .finish()
    }
}

// ============================================================================
// PointerRelationRegistry
// ============================================================================

pub struct PointerRelationRegistry {
    relations: WeakHardLock<HashMap<ClassId, SmallVec<[PointerDescriptor; 2]>>>,
}

impl PointerRelationRegistry {
    pub fn new() -> Self {
        Self {
            relations: WeakHardLock::new(HashMap::new()),
        }
    }

    /// Record that `pointer` is a wrapper class described by `descriptor`.
    /// Exclusive: waits out every in-flight lookup.
    pub fn register(&self, pointer: ClassId, descriptor: PointerDescriptor) {
        let mut relations = self.relations.hard();
        debug!(pointer = %pointer, target = %descriptor.target, kind = ?descriptor.kind,
            "pointer relation registered");
        relations.entry(pointer).or_default().push(descriptor);
    }

    /// All relations registered for `pointer`, in registration order, or
    /// `None` if it was never registered as a wrapper. Shared: concurrent
    /// lookups proceed together.
    pub fn pointed_types(&self, pointer: ClassId) -> Option<Vec<PointerDescriptor>> {
        let relations = self.relations.weak();
        relations.get(&pointer).map(|descs| descs.to_vec())
    }
}

impl Default for PointerRelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
