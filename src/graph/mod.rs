//! The cast graph: registered one-hop conversions and shortest-path
//! pointer resolution.
//!
//! Vertices are class ids, addressed by index into a growable table (no
//! pointer-linked nodes; vertices are never destroyed, so indices are
//! stable for the process lifetime). Edges are one-hop conversion
//! functions: pointer in, adjusted-pointer-or-`None` out. `None` from an
//! edge means the runtime check behind it (a guarded downcast, say)
//! refused this particular object; that prunes the branch, nothing more.
//!
//! ## Locking
//!
//! Edge storage and the path cache share one `RwLock` and are mutated as a
//! unit. [`CastGraph::resolve`] holds the read guard for the cache-hit
//! fast path; on a miss it re-acquires as a writer and re-probes the cache
//! before searching, since another resolver may have filled the entry in
//! the window. [`CastGraph::insert`] is a writer throughout. Lookups
//! vastly outnumber insertions, so the fast path never blocks on other
//! readers.

mod cache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::collections::VecDeque;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::identity::ClassId;
use cache::{CacheEntry, CacheKey, PathCache};

// ============================================================================
// Cast functions
// ============================================================================

/// One-hop conversion: adjusted pointer on success, `None` when the
/// runtime check refused this object.
pub type CastFn = Arc<dyn Fn(*mut u8) -> Option<*mut u8> + Send + Sync>;

/// Unconditional fixed byte adjustment — the non-virtual base-subobject
/// case, where the displacement is the same for every object.
pub fn offset_cast(delta: isize) -> CastFn {
    Arc::new(move |p| Some(p.wrapping_offset(delta)))
}

/// Wrap a runtime-checked conversion (e.g. a guarded downcast) as a
/// [`CastFn`].
pub fn checked_cast<F>(f: F) -> CastFn
where
    F: Fn(*mut u8) -> Option<*mut u8> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// Graph storage
// ============================================================================

#[derive(Clone)]
struct Edge {
    target: ClassId,
    cast: CastFn,
}

struct Vertex {
    id: ClassId,
    /// Sorted by target id: binary-search insert keeps them deduplicated.
    edges: SmallVec<[Edge; 4]>,
}

struct GraphInner {
    vertices: Vec<Vertex>,
    cache: PathCache,
}

impl GraphInner {
    fn grow_to(&mut self, max_index: usize) {
        while self.vertices.len() <= max_index {
            let id = ClassId(self.vertices.len() as u64);
            self.vertices.push(Vertex {
                id,
                edges: SmallVec::new(),
            });
        }
    }
}

/// A resolved conversion: the adjusted pointer and the number of edges
/// traversed to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub ptr: *mut u8,
    pub hops: u32,
}

struct QueueEntry {
    p: *mut u8,
    vertex: ClassId,
    hops: u32,
}

// ============================================================================
// CastGraph
// ============================================================================

pub struct CastGraph {
    inner: RwLock<GraphInner>,
    searches: AtomicU64,
}

impl CastGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner {
                vertices: Vec::new(),
                cache: PathCache::default(),
            }),
            searches: AtomicU64::new(0),
        }
    }

    /// Register a one-hop conversion from `src` to `target`.
    ///
    /// Idempotent: a second edge to the same target is a silent no-op and
    /// does not invalidate the cache. An actual insertion drops the whole
    /// path cache, since a shorter path may now exist for any cached key.
    pub fn insert(&self, src: ClassId, target: ClassId, cast: CastFn) {
        let mut inner = self.inner.write();
        inner.grow_to(src.index().max(target.index()));

        let idx = src.index();
        match inner.vertices[idx]
            .edges
            .binary_search_by_key(&target, |e| e.target)
        {
            Ok(_) => {
                trace!(src = %src, target = %target, "cast edge already present");
            }
            Err(pos) => {
                inner.vertices[idx].edges.insert(pos, Edge { target, cast });
                inner.cache.invalidate();
                debug!(src = %src, target = %target, "cast edge inserted, path cache invalidated");
            }
        }
    }

    /// Convert `p` (statically typed as `src`) to `target`.
    ///
    /// `dynamic_id` and `dynamic_ptr` describe the most-derived object `p`
    /// points into; they key the cache, because the same static pair can
    /// need different byte adjustments in different concrete layouts.
    ///
    /// Returns `None` when no path exists or every path was refused for
    /// this object — a normal outcome, and memoized either way.
    pub fn resolve(
        &self,
        p: *mut u8,
        src: ClassId,
        target: ClassId,
        dynamic_id: ClassId,
        dynamic_ptr: *const u8,
    ) -> Option<Resolution> {
        if src == target {
            return Some(Resolution { ptr: p, hops: 0 });
        }

        let object_offset = (dynamic_ptr as isize).wrapping_sub(p as isize);
        let key = CacheKey {
            src,
            target,
            dynamic_id,
            object_offset,
        };

        {
            let inner = self.inner.read();
            if src.index() >= inner.vertices.len() || target.index() >= inner.vertices.len() {
                return None;
            }
            if let Some(entry) = inner.cache.get(&key) {
                trace!(src = %src, target = %target, "path cache hit");
                return apply_entry(p, entry);
            }
        }

        let mut inner = self.inner.write();
        // Another resolver may have filled this key between the guards.
        if let Some(entry) = inner.cache.get(&key) {
            return apply_entry(p, entry);
        }

        self.searches.fetch_add(1, Ordering::Relaxed);
        let result = search(&inner.vertices, p, src, target);

        let entry = match result {
            Some(res) => CacheEntry::Path {
                offset: (res.ptr as isize).wrapping_sub(p as isize),
                hops: res.hops,
            },
            None => CacheEntry::NoPath,
        };
        inner.cache.put(key, entry);
        trace!(src = %src, target = %target, found = result.is_some(), "path search completed");

        result
    }

    /// Number of graph searches actually run (cache misses). Hits and
    /// memoized no-path answers do not count.
    pub fn search_count(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }
}

impl Default for CastGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_entry(p: *mut u8, entry: CacheEntry) -> Option<Resolution> {
    match entry {
        CacheEntry::NoPath => None,
        CacheEntry::Path { offset, hops } => Some(Resolution {
            ptr: p.wrapping_offset(offset),
            hops,
        }),
    }
}

/// Breadth-first search from `src`, carrying the adjusted pointer along
/// each frontier entry. First dequeue of `target` is a shortest path by
/// hop count.
fn search(vertices: &[Vertex], p: *mut u8, src: ClassId, target: ClassId) -> Option<Resolution> {
    let mut visited = vec![false; vertices.len()];
    visited[src.index()] = true;

    let mut queue = VecDeque::new();
    queue.push_back(QueueEntry {
        p,
        vertex: src,
        hops: 0,
    });

    while let Some(qe) = queue.pop_front() {
        let v = &vertices[qe.vertex.index()];
        if v.id == target {
            return Some(Resolution {
                ptr: qe.p,
                hops: qe.hops,
            });
        }

        for e in &v.edges {
            if visited[e.target.index()] {
                continue;
            }
            // A refused edge prunes this branch only.
            if let Some(casted) = (e.cast)(qe.p) {
                visited[e.target.index()] = true;
                queue.push_back(QueueEntry {
                    p: casted,
                    vertex: e.target,
                    hops: qe.hops + 1,
                });
            }
        }
    }

    None
}

// ============================================================================
// Tests
// ============================================================================
