//! Native string table
//!
//! Strings cross the bridge as interned ids so that `Value` stays a single
//! word. Interning is isolate-wide and not tied to handle scopes.

use std::collections::HashMap;
use std::rc::Rc;

/// Index of an interned string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(pub u32);

#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<Rc<str>>,
    index: HashMap<Rc<str>, StringId>,
}

impl StringTable {
    pub fn new() -> Self {
        StringTable::default()
    }

    /// Get the number of interned strings
    #[inline]
    pub fn count(&self) -> usize {
        self.strings.len()
    }

    /// Intern a string, returning the existing id if already present
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.index.get(s) {
            return *id;
        }
        self.insert(Rc::from(s))
    }

    /// Intern a shared string without copying it
    pub fn intern_rc(&mut self, s: Rc<str>) -> StringId {
        if let Some(id) = self.index.get(&*s) {
            return *id;
        }
        self.insert(s)
    }

    fn insert(&mut self, s: Rc<str>) -> StringId {
        let id = StringId(self.strings.len() as u32);
        self.strings.push(Rc::clone(&s));
        self.index.insert(s, id);
        id
    }

    pub fn get(&self, id: StringId) -> Option<&Rc<str>> {
        self.strings.get(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        let c = table.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_intern_rc_shares_ids() {
        let mut table = StringTable::new();
        let a = table.intern("err");
        let b = table.intern_rc(Rc::from("err"));
        assert_eq!(a, b);
        assert_eq!(table.get(a).map(|s| &**s), Some("err"));
    }

    #[test]
    fn test_unknown_id() {
        let table = StringTable::new();
        assert!(table.get(StringId(0)).is_none());
    }
}
