//! # castgraph-rs — Runtime Cross-Type Pointer Conversion
//!
//! Answers one question for binding and marshalling layers: given two
//! independently registered class identities and a pointer typed as one of
//! them, can the pointer be converted to the other through a chain of
//! separately registered, possibly runtime-checked conversion steps — and
//! if so, what is the adjusted pointer?
//!
//! ## Design Principles
//!
//! 1. **Registered edges, not compiled-in layout**: base/derived and custom
//!    convertibility relationships arrive one hop at a time, in any order,
//!    from any thread
//! 2. **Dynamic-layout-aware caching**: resolved paths are memoized per
//!    (static pair, most-derived id, pointer displacement), because the
//!    same static pair can need different byte adjustments in different
//!    concrete layouts
//! 3. **"No path" is an answer, not an error**: unrelated types resolve to
//!    `None`, memoized like any other result
//! 4. **One owned runtime, no ambient globals**: construct a
//!    [`CastRuntime`] and pass it by reference
//!
//! ## Quick Start
//!
//! ```rust
//! use castgraph_rs::{CastRuntime, graph::offset_cast};
//!
//! struct Base;
//! struct Derived;
//!
//! let rt = CastRuntime::new();
//! let base = rt.class_id_of::<Base>();
//! let derived = rt.class_id_of::<Derived>();
//!
//! // Derived -> Base upcast; the subobject sits at offset 0 here.
//! rt.add_cast(derived, base, offset_cast(0));
//!
//! let mut obj = 7u32;
//! let p = &mut obj as *mut u32 as *mut u8;
//! let res = rt.resolve(p, derived, base, derived, p as *const u8).unwrap();
//! assert_eq!(res.hops, 1);
//! assert_eq!(res.ptr, p);
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod boxed;
pub mod graph;
pub mod identity;
pub mod lock;
pub mod relations;

// ============================================================================
// Re-exports: Identities
// ============================================================================

pub use identity::{ClassId, IdentityRegistry, TypeKey, LOCAL_ID_BASE};

// ============================================================================
// Re-exports: Graph
// ============================================================================

pub use graph::{CastFn, CastGraph, Resolution};

// ============================================================================
// Re-exports: Relations, boxed values, lock
// ============================================================================

pub use boxed::CastBox;
pub use lock::WeakHardLock;
pub use relations::{HandleCastFn, PointerDescriptor, PointerKind, PointerRelationRegistry};

// ============================================================================
// Top-level runtime handle
// ============================================================================

/// The primary entry point. Bundles the identity registry, the cast graph,
/// and the pointer-relation registry into one explicitly owned instance.
///
/// Each component keeps its own lock discipline; any method may be called
/// from any thread.
pub struct CastRuntime {
    identities: IdentityRegistry,
    graph: CastGraph,
    relations: PointerRelationRegistry,
}

impl CastRuntime {
    pub fn new() -> Self {
        Self {
            identities: IdentityRegistry::new(),
            graph: CastGraph::new(),
            relations: PointerRelationRegistry::new(),
        }
    }

    // ========================================================================
    // Identities
    // ========================================================================

    /// Registered class id for `T`, allocating on first use.
    pub fn class_id_of<T: ?Sized + 'static>(&self) -> ClassId {
        self.identities.allocate_for::<T>()
    }

    /// Registered class id for `T`, or `None` if `T` was never explicitly
    /// registered (a local cache-key id does not count).
    pub fn registered_of<T: ?Sized + 'static>(&self) -> Option<ClassId> {
        self.identities.registered_for::<T>()
    }

    /// Cache-key id for `T`, from the local partition if `T` is not
    /// registered.
    pub fn local_id_of<T: ?Sized + 'static>(&self) -> ClassId {
        self.identities.local_for::<T>()
    }

    /// Bind a pre-chosen registered id to `T`. See [`IdentityRegistry::bind`].
    pub fn bind<T: ?Sized + 'static>(&self, id: ClassId) {
        self.identities.bind_for::<T>(id)
    }

    // ========================================================================
    // Graph
    // ========================================================================

    /// Register a one-hop conversion edge. Idempotent per (src, target).
    pub fn add_cast(&self, src: ClassId, target: ClassId, cast: CastFn) {
        self.graph.insert(src, target, cast)
    }

    /// Resolve a pointer conversion; see [`CastGraph::resolve`].
    pub fn resolve(
        &self,
        p: *mut u8,
        src: ClassId,
        target: ClassId,
        dynamic_id: ClassId,
        dynamic_ptr: *const u8,
    ) -> Option<Resolution> {
        self.graph.resolve(p, src, target, dynamic_id, dynamic_ptr)
    }

    /// Like [`resolve`](Self::resolve), but "no path" becomes an error.
    /// For marshalling call sites where a missing conversion is a type
    /// error rather than an answer.
    pub fn convert(
        &self,
        p: *mut u8,
        src: ClassId,
        target: ClassId,
        dynamic_id: ClassId,
        dynamic_ptr: *const u8,
    ) -> Result<Resolution> {
        self.resolve(p, src, target, dynamic_id, dynamic_ptr)
            .ok_or(Error::NoConversion {
                from: src,
                to: target,
            })
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Record a pointer-wrapper relation; see
    /// [`PointerRelationRegistry::register`].
    pub fn register_relation(&self, pointer: ClassId, descriptor: PointerDescriptor) {
        self.relations.register(pointer, descriptor)
    }

    /// Look up a wrapper's relations; see
    /// [`PointerRelationRegistry::pointed_types`].
    pub fn pointed_types(&self, pointer: ClassId) -> Option<Vec<PointerDescriptor>> {
        self.relations.pointed_types(pointer)
    }

    // ========================================================================
    // Component access (for advanced use)
    // ========================================================================

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn graph(&self) -> &CastGraph {
        &self.graph
    }

    pub fn relations(&self) -> &PointerRelationRegistry {
        &self.relations
    }
}

impl Default for CastRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no conversion path from class {from} to class {to}")]
    NoConversion { from: ClassId, to: ClassId },

    #[error("boxed payload is not a {expected}")]
    PayloadMismatch { expected: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
