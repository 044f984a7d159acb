//! Slot heap for managed objects
//!
//! Objects live in a vector of slots addressed by [`ObjectRef`]. A freed slot
//! bumps its generation so stale references stop resolving, and goes onto a
//! free list for reuse.
//!
//! ```text
//! slots: [ Promise | Free | Object | Promise | ... ]
//!           gen 0    gen 3   gen 1    gen 0
//! free:  [ 1 ]
//! ```
//!
//! Each slot carries a mark bit for the collector and a root count fed by the
//! embedder's handle table.

use crate::bridge::{ManagedValue, ObjectRef};

use super::promise::PromiseRecord;

/// Object tags, one per managed object layout
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTag {
    Free = 0,
    Object = 1,
    Promise = 2,
}

/// A managed heap object
#[derive(Debug)]
pub enum HeapObject {
    /// Plain object with no internal slots
    Object,
    Promise(PromiseRecord),
}

impl HeapObject {
    pub fn tag(&self) -> ObjectTag {
        match self {
            HeapObject::Object => ObjectTag::Object,
            HeapObject::Promise(_) => ObjectTag::Promise,
        }
    }

    /// Push every object this one references onto `out`
    pub fn trace(&self, out: &mut Vec<ObjectRef>) {
        match self {
            HeapObject::Object => {}
            HeapObject::Promise(record) => record.trace(out),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    marked: bool,
    roots: u32,
    object: Option<HeapObject>,
}

/// The managed heap
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Maximum number of live objects
    limit: usize,
    live: usize,
}

impl Heap {
    /// Create a new heap holding at most `limit` live objects
    pub fn new(limit: usize) -> Self {
        Heap {
            slots: Vec::with_capacity(limit.min(1024)),
            free: Vec::new(),
            limit,
            live: 0,
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.live >= self.limit
    }

    /// Allocate a slot for `object`
    ///
    /// Returns None if the heap is full.
    pub fn alloc(&mut self, object: HeapObject) -> Option<ObjectRef> {
        if self.is_full() {
            return None;
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.object = Some(object);
        slot.marked = false;
        slot.roots = 0;
        self.live += 1;

        Some(ObjectRef::new(index, slot.generation))
    }

    fn slot(&self, obj: ObjectRef) -> Option<&Slot> {
        self.slots
            .get(obj.index as usize)
            .filter(|slot| slot.generation == obj.generation && slot.object.is_some())
    }

    fn slot_mut(&mut self, obj: ObjectRef) -> Option<&mut Slot> {
        self.slots
            .get_mut(obj.index as usize)
            .filter(|slot| slot.generation == obj.generation && slot.object.is_some())
    }

    pub fn get(&self, obj: ObjectRef) -> Option<&HeapObject> {
        self.slot(obj).and_then(|slot| slot.object.as_ref())
    }

    pub fn get_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject> {
        self.slot_mut(obj).and_then(|slot| slot.object.as_mut())
    }

    pub fn is_live(&self, obj: ObjectRef) -> bool {
        self.slot(obj).is_some()
    }

    /// Tag of the object `obj` refers to, `Free` for stale references
    pub fn tag(&self, obj: ObjectRef) -> ObjectTag {
        self.get(obj).map_or(ObjectTag::Free, HeapObject::tag)
    }

    /// Register an external root
    pub fn retain(&mut self, obj: ObjectRef) -> bool {
        match self.slot_mut(obj) {
            Some(slot) => {
                slot.roots += 1;
                true
            }
            None => false,
        }
    }

    /// Drop an external root. Never frees; the collector does that.
    pub fn release(&mut self, obj: ObjectRef) -> bool {
        match self.slot_mut(obj) {
            Some(slot) if slot.roots > 0 => {
                slot.roots -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn root_count(&self, obj: ObjectRef) -> u32 {
        self.slot(obj).map_or(0, |slot| slot.roots)
    }

    /// Number of live objects with at least one external root
    pub fn rooted(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.object.is_some() && slot.roots > 0)
            .count()
    }

    /// Externally rooted objects
    pub(super) fn roots(&self) -> Vec<ObjectRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some() && slot.roots > 0)
            .map(|(index, slot)| ObjectRef::new(index as u32, slot.generation))
            .collect()
    }

    pub(super) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Set the mark bit. Returns false if it was already set or `obj` is stale.
    pub(super) fn mark(&mut self, obj: ObjectRef) -> bool {
        match self.slot_mut(obj) {
            Some(slot) if !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    /// Free every unmarked object, returning how many were freed
    pub(super) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_some() && !slot.marked {
                slot.object = None;
                slot.roots = 0;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

/// Push the object a managed value refers to, if any
pub(super) fn trace_value(value: &ManagedValue, out: &mut Vec<ObjectRef>) {
    if let ManagedValue::Object(obj) = value {
        out.push(*obj);
    }
}
