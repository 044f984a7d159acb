//! Managed promise records
//!
//! A [`PromiseRecord`] is the internal state of a promise object in the host
//! heap: its settlement state, result, the "already resolved" latch and the
//! reactions waiting for settlement. Transitions are one-way:
//! `Pending -> Fulfilled` or `Pending -> Rejected`.

use crate::bridge::{FunctionId, ManagedValue, ObjectRef, PromiseState};

use super::heap::trace_value;

/// Where the outcome of a reaction goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTarget {
    /// The promise returned by `then`; settled through the resolution procedure
    Derived(ObjectRef),
    /// A promise that adopted this one's state; settled directly
    Adopt(ObjectRef),
}

impl ReactionTarget {
    pub fn object(self) -> ObjectRef {
        match self {
            ReactionTarget::Derived(obj) | ReactionTarget::Adopt(obj) => obj,
        }
    }
}

/// A reaction registered on a pending promise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// `None` passes the value or reason through unchanged
    pub handler: Option<FunctionId>,
    pub target: ReactionTarget,
}

impl Reaction {
    pub fn derived(handler: Option<FunctionId>, derived: ObjectRef) -> Self {
        Reaction {
            handler,
            target: ReactionTarget::Derived(derived),
        }
    }

    pub fn adopt(promise: ObjectRef) -> Self {
        Reaction {
            handler: None,
            target: ReactionTarget::Adopt(promise),
        }
    }
}

#[derive(Debug)]
pub struct PromiseRecord {
    state: PromiseState,
    result: ManagedValue,
    /// Set once resolve/reject has been accepted, even if the promise is
    /// still pending while it follows another promise.
    already_resolved: bool,
    is_handled: bool,
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
}

impl PromiseRecord {
    pub fn new() -> Self {
        PromiseRecord {
            state: PromiseState::Pending,
            result: ManagedValue::Undefined,
            already_resolved: false,
            is_handled: false,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> PromiseState {
        self.state
    }

    /// Fulfillment value or rejection reason; undefined while pending
    #[inline]
    pub fn result(&self) -> &ManagedValue {
        &self.result
    }

    #[inline]
    pub fn is_handled(&self) -> bool {
        self.is_handled
    }

    pub fn mark_handled(&mut self) {
        self.is_handled = true;
    }

    #[inline]
    pub fn already_resolved(&self) -> bool {
        self.already_resolved
    }

    /// Latch the "already resolved" flag. Returns false if it was set.
    pub fn lock(&mut self) -> bool {
        !std::mem::replace(&mut self.already_resolved, true)
    }

    /// Settle as fulfilled, returning the reactions that are now due
    pub fn fulfill(&mut self, value: ManagedValue) -> Vec<Reaction> {
        self.settle(PromiseState::Fulfilled, value)
    }

    /// Settle as rejected, returning the reactions that are now due
    pub fn reject(&mut self, reason: ManagedValue) -> Vec<Reaction> {
        self.settle(PromiseState::Rejected, reason)
    }

    fn settle(&mut self, state: PromiseState, result: ManagedValue) -> Vec<Reaction> {
        debug_assert_eq!(self.state, PromiseState::Pending, "promise settled twice");
        self.state = state;
        self.result = result;
        self.already_resolved = true;
        let fulfill = std::mem::take(&mut self.fulfill_reactions);
        let reject = std::mem::take(&mut self.reject_reactions);
        match state {
            PromiseState::Fulfilled => fulfill,
            _ => reject,
        }
    }

    /// Queue reactions on a pending promise
    pub fn add_reactions(&mut self, on_fulfilled: Reaction, on_rejected: Reaction) {
        self.fulfill_reactions.push(on_fulfilled);
        self.reject_reactions.push(on_rejected);
    }

    pub fn trace(&self, out: &mut Vec<ObjectRef>) {
        trace_value(&self.result, out);
        for reaction in self.fulfill_reactions.iter().chain(&self.reject_reactions) {
            out.push(reaction.target.object());
        }
    }
}

impl Default for PromiseRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = PromiseRecord::new();
        assert_eq!(record.state(), PromiseState::Pending);
        assert_eq!(record.result(), &ManagedValue::Undefined);
        assert!(!record.already_resolved());
        assert!(!record.is_handled());
    }

    #[test]
    fn test_fulfill_returns_fulfill_reactions() {
        let mut record = PromiseRecord::new();
        let target = ObjectRef::new(1, 0);
        record.add_reactions(
            Reaction::derived(Some(FunctionId(0)), target),
            Reaction::derived(None, target),
        );

        let due = record.fulfill(ManagedValue::Int(42));
        assert_eq!(due, vec![Reaction::derived(Some(FunctionId(0)), target)]);
        assert_eq!(record.state(), PromiseState::Fulfilled);
        assert_eq!(record.result(), &ManagedValue::Int(42));
        assert!(record.already_resolved());
    }

    #[test]
    fn test_reject_returns_reject_reactions() {
        let mut record = PromiseRecord::new();
        let target = ObjectRef::new(2, 0);
        record.add_reactions(Reaction::derived(None, target), Reaction::adopt(target));

        let due = record.reject(ManagedValue::Null);
        assert_eq!(due, vec![Reaction::adopt(target)]);
        assert_eq!(record.state(), PromiseState::Rejected);
    }

    #[test]
    fn test_lock_is_one_shot() {
        let mut record = PromiseRecord::new();
        assert!(record.lock());
        assert!(!record.lock());
        assert_eq!(record.state(), PromiseState::Pending);
    }

    #[test]
    fn test_trace_reports_result_and_targets() {
        let mut record = PromiseRecord::new();
        let target = ObjectRef::new(3, 0);
        record.add_reactions(Reaction::adopt(target), Reaction::adopt(target));
        let mut out = Vec::new();
        record.trace(&mut out);
        assert_eq!(out, vec![target, target]);
    }
}
