//! Mark-sweep garbage collector
//!
//! The GC works in two phases:
//! 1. Mark: traverse all reachable objects starting from roots, set mark bit
//! 2. Sweep: free every unmarked slot and bump its generation
//!
//! Roots are the objects pinned by the embedder's handle table plus anything
//! referenced from the pending job queue. Collection never moves objects, so
//! an `ObjectRef` held by a bridge handle stays valid for as long as it is
//! rooted.

use crate::bridge::{GcStats, ObjectRef};

use super::heap::Heap;

/// Run garbage collection on the heap
pub fn collect(heap: &mut Heap, extra_roots: impl IntoIterator<Item = ObjectRef>) -> GcStats {
    let objects_before = heap.live();

    // Phase 1: Clear marks
    heap.clear_marks();

    // Phase 2: Mark reachable objects
    let mut worklist = heap.roots();
    worklist.extend(extra_roots);
    mark_from(heap, worklist);

    // Phase 3: Sweep
    let freed = heap.sweep();

    GcStats {
        objects_before,
        objects_after: heap.live(),
        freed,
    }
}

fn mark_from(heap: &mut Heap, mut worklist: Vec<ObjectRef>) {
    let mut children = Vec::new();
    while let Some(obj) = worklist.pop() {
        if !heap.mark(obj) {
            continue;
        }
        if let Some(object) = heap.get(obj) {
            object.trace(&mut children);
            worklist.append(&mut children);
        }
    }
}
