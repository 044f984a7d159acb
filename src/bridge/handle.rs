//! Handle table
//!
//! Bridge objects are stored in a stack of slots. A handle scope remembers the
//! stack height when it was opened; closing it pops everything above that
//! height. The caller is responsible for dropping the GC roots of popped
//! entries.
//!
//! Every slot has a serial that is bumped whenever its entry is popped, and
//! every handle records the serial it was issued under plus a tag of the
//! owning isolate. A handle from a closed scope or from another isolate is
//! rejected instead of resolving to whatever now occupies its slot.

use std::fmt;

use super::BridgeError;
use super::object::{BridgeObject, IsolateId};

/// Handle into an isolate's handle table
///
/// Packed as `isolate tag (19 bits) | serial (16 bits) | index (24 bits)`, which
/// fits the special payload of a `Value`. Isolate ids are compared by their low
/// 19 bits. A stale handle can only alias a live one after its slot has been
/// reused 65536 times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    const INDEX_BITS: u32 = 24;
    const SERIAL_BITS: u32 = 16;
    const ISOLATE_BITS: u32 = 19;

    pub const MAX_INDEX: u32 = (1 << Self::INDEX_BITS) - 1;
    pub const MAX_ISOLATE_TAG: u32 = (1 << Self::ISOLATE_BITS) - 1;

    /// # Panics
    /// Panics if `index` exceeds [`HandleId::MAX_INDEX`].
    pub const fn new(isolate: IsolateId, index: u32, serial: u16) -> Self {
        assert!(index <= Self::MAX_INDEX, "handle table index out of range");
        let tag = (isolate.0 & Self::MAX_ISOLATE_TAG) as u64;
        HandleId(
            (tag << (Self::INDEX_BITS + Self::SERIAL_BITS))
                | ((serial as u64) << Self::INDEX_BITS)
                | index as u64,
        )
    }

    /// Rebuild from a `Value` payload. Bits above the packed width are ignored.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        HandleId(bits & ((1 << (Self::INDEX_BITS + Self::SERIAL_BITS + Self::ISOLATE_BITS)) - 1))
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> u32 {
        (self.0 & Self::MAX_INDEX as u64) as u32
    }

    #[inline]
    pub const fn serial(self) -> u16 {
        (self.0 >> Self::INDEX_BITS) as u16
    }

    #[inline]
    pub const fn isolate_tag(self) -> u32 {
        (self.0 >> (Self::INDEX_BITS + Self::SERIAL_BITS)) as u32
    }

    const fn tag_of(isolate: IsolateId) -> u32 {
        isolate.0 & Self::MAX_ISOLATE_TAG
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index(), self.serial())
    }
}

/// Marker returned when a scope is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark {
    depth: usize,
    start: usize,
}

#[derive(Debug)]
pub struct HandleTable {
    isolate: IsolateId,
    entries: Vec<Box<dyn BridgeObject>>,
    /// Serial per slot; outlives the entries so popped slots stay bumped
    serials: Vec<u16>,
    scopes: Vec<usize>,
}

impl HandleTable {
    pub fn new(isolate: IsolateId) -> Self {
        Self::with_capacity(isolate, 0)
    }

    pub fn with_capacity(isolate: IsolateId, capacity: usize) -> Self {
        HandleTable {
            isolate,
            entries: Vec::with_capacity(capacity),
            serials: Vec::with_capacity(capacity),
            scopes: Vec::new(),
        }
    }

    /// Number of live handles
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Panics
    /// Panics if the table already holds [`HandleId::MAX_INDEX`] + 1 entries.
    pub fn push(&mut self, content: Box<dyn BridgeObject>) -> HandleId {
        let index = self.entries.len();
        assert!(index <= HandleId::MAX_INDEX as usize, "handle table is full");
        if index == self.serials.len() {
            self.serials.push(0);
        }
        self.entries.push(content);
        HandleId::new(self.isolate, index as u32, self.serials[index])
    }

    pub fn get(&self, id: HandleId) -> Result<&dyn BridgeObject, BridgeError> {
        if id.isolate_tag() != HandleId::tag_of(self.isolate) {
            return Err(BridgeError::WrongIsolate {
                expected: self.isolate,
                found: IsolateId(id.isolate_tag()),
            });
        }
        let index = id.index() as usize;
        match self.entries.get(index) {
            Some(content) if self.serials[index] == id.serial() => Ok(&**content),
            _ => Err(BridgeError::InvalidHandle(id)),
        }
    }

    pub fn open_scope(&mut self) -> ScopeMark {
        let start = self.entries.len();
        self.scopes.push(start);
        ScopeMark {
            depth: self.scopes.len(),
            start,
        }
    }

    /// Close the innermost scope, returning the entries it owned
    pub fn close_scope(&mut self, mark: ScopeMark) -> Result<Vec<Box<dyn BridgeObject>>, BridgeError> {
        if self.scopes.len() != mark.depth || self.scopes.last() != Some(&mark.start) {
            return Err(BridgeError::ScopeMismatch);
        }
        self.scopes.pop();
        self.retire(mark.start);
        Ok(self.entries.drain(mark.start..).collect())
    }

    /// Remove every entry, innermost first
    pub fn drain_all(&mut self) -> Vec<Box<dyn BridgeObject>> {
        self.scopes.clear();
        self.retire(0);
        self.entries.drain(..).rev().collect()
    }

    /// Invalidate handles to the slots from `start` up
    fn retire(&mut self, start: usize) {
        let end = self.entries.len();
        for serial in &mut self.serials[start..end] {
            *serial = serial.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{GenericObject, ObjectRef};

    fn object(index: u32) -> Box<dyn BridgeObject> {
        Box::new(GenericObject::new(IsolateId(0), ObjectRef::new(index, 0)))
    }

    #[test]
    fn test_handle_id_fields() {
        let id = HandleId::new(IsolateId(5), 12, 3);
        assert_eq!(id.index(), 12);
        assert_eq!(id.serial(), 3);
        assert_eq!(id.isolate_tag(), 5);
        assert_eq!(HandleId::from_bits(id.to_bits()), id);
        assert_eq!(id.to_string(), "#12.3");
    }

    #[test]
    fn test_push_and_get() {
        let mut table = HandleTable::with_capacity(IsolateId(0), 4);
        let id = table.push(object(5));
        assert_eq!(table.get(id).unwrap().managed(), ObjectRef::new(5, 0));

        let missing = HandleId::new(IsolateId(0), 9, 0);
        assert_eq!(table.get(missing).unwrap_err(), BridgeError::InvalidHandle(missing));
    }

    #[test]
    fn test_scope_pops_inner_entries() {
        let mut table = HandleTable::new(IsolateId(0));
        let outer = table.push(object(0));
        let mark = table.open_scope();
        table.push(object(1));
        table.push(object(2));

        let popped = table.close_scope(mark).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.get(outer).is_ok());
    }

    #[test]
    fn test_reused_slot_rejects_stale_handle() {
        let mut table = HandleTable::new(IsolateId(0));
        let mark = table.open_scope();
        let stale = table.push(object(1));
        table.close_scope(mark).unwrap();

        let fresh = table.push(object(2));
        assert_eq!(fresh.index(), stale.index());
        assert_ne!(fresh, stale);
        assert_eq!(table.get(stale).unwrap_err(), BridgeError::InvalidHandle(stale));
        assert_eq!(table.get(fresh).unwrap().managed(), ObjectRef::new(2, 0));
    }

    #[test]
    fn test_foreign_handle_is_wrong_isolate() {
        let mut a = HandleTable::new(IsolateId(1));
        let mut b = HandleTable::new(IsolateId(2));
        let from_a = a.push(object(1));
        b.push(object(2));
        assert_eq!(
            b.get(from_a).unwrap_err(),
            BridgeError::WrongIsolate {
                expected: IsolateId(2),
                found: IsolateId(1),
            }
        );
    }

    #[test]
    fn test_out_of_order_close() {
        let mut table = HandleTable::new(IsolateId(0));
        let outer = table.open_scope();
        let inner = table.open_scope();
        assert_eq!(table.close_scope(outer).unwrap_err(), BridgeError::ScopeMismatch);
        assert!(table.close_scope(inner).is_ok());
        assert!(table.close_scope(outer).is_ok());
    }

    #[test]
    fn test_drain_all() {
        let mut table = HandleTable::new(IsolateId(0));
        let first = table.push(object(0));
        table.open_scope();
        table.push(object(1));
        let drained = table.drain_all();
        assert_eq!(drained[0].managed(), ObjectRef::new(1, 0));
        assert!(table.is_empty());
        assert!(table.get(first).is_err());
    }
}
