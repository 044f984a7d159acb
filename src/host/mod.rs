//! Reference managed runtime
//!
//! `HostRuntime` owns a garbage-collected heap of plain objects and promises
//! and a microtask queue. It implements the promise algorithm the bridge
//! forwards to:
//! - Resolution procedure with adoption of other promises (via a job)
//! - Self-resolution rejects with a chaining-cycle reason
//! - Reactions are queued on settlement and only run from `next_job`
//!
//! Only promises are thenables here; plain objects fulfill like any other
//! value.

mod collector;
mod heap;
mod jobs;
mod promise;

pub use heap::{Heap, HeapObject, ObjectTag};
use jobs::{Job, JobQueue};
pub use promise::{PromiseRecord, Reaction, ReactionTarget};

use std::rc::Rc;

use crate::bridge::{
    FunctionId, GcStats, HeapStats, HostError, ManagedRuntime, ManagedValue, NativeJob, ObjectRef,
    PromiseState, ReactionKind,
};

/// Reason used when a promise is resolved with itself
pub const CHAINING_CYCLE_MESSAGE: &str = "TypeError: Chaining cycle detected for promise #<Promise>";

pub struct HostRuntime {
    heap: Heap,
    jobs: JobQueue,
    terminating: bool,
}

impl HostRuntime {
    /// Create a runtime whose heap holds at most `heap_limit` objects
    pub fn new(heap_limit: usize) -> Self {
        HostRuntime {
            heap: Heap::new(heap_limit),
            jobs: JobQueue::new(),
            terminating: false,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    fn check_running(&self) -> Result<(), HostError> {
        if self.terminating {
            Err(HostError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Allocate, collecting once if the heap is full
    fn alloc(&mut self, object: HeapObject) -> Result<ObjectRef, HostError> {
        self.check_running()?;

        if cfg!(feature = "gc-stress") || self.heap.is_full() {
            self.collect_garbage();
        }

        self.heap.alloc(object).ok_or(HostError::OutOfMemory {
            limit: self.heap.limit(),
        })
    }

    fn record(&self, promise: ObjectRef) -> Result<&PromiseRecord, HostError> {
        match self.heap.get(promise) {
            Some(HeapObject::Promise(record)) => Ok(record),
            Some(_) => Err(HostError::NotAPromise(promise)),
            None => Err(HostError::DeadObject(promise)),
        }
    }

    fn record_mut(&mut self, promise: ObjectRef) -> Result<&mut PromiseRecord, HostError> {
        match self.heap.get_mut(promise) {
            Some(HeapObject::Promise(record)) => Ok(record),
            Some(_) => Err(HostError::NotAPromise(promise)),
            None => Err(HostError::DeadObject(promise)),
        }
    }

    /// The resolution procedure. Returns false if `promise` was already resolved.
    fn resolve_promise(&mut self, promise: ObjectRef, value: ManagedValue) -> Result<bool, HostError> {
        if !self.record_mut(promise)?.lock() {
            return Ok(false);
        }

        match value {
            ManagedValue::Object(obj) if obj == promise => {
                self.reject_promise(promise, ManagedValue::String(Rc::from(CHAINING_CYCLE_MESSAGE)))?;
            }
            ManagedValue::Object(obj) if self.heap.tag(obj) == ObjectTag::Promise => {
                self.jobs.enqueue(Job::ResolveThenable {
                    promise,
                    thenable: obj,
                });
            }
            value => self.fulfill_promise(promise, value)?,
        }
        Ok(true)
    }

    /// Reject unless already resolved
    fn reject_resolving(&mut self, promise: ObjectRef, reason: ManagedValue) -> Result<bool, HostError> {
        if !self.record_mut(promise)?.lock() {
            return Ok(false);
        }
        self.reject_promise(promise, reason)?;
        Ok(true)
    }

    fn fulfill_promise(&mut self, promise: ObjectRef, value: ManagedValue) -> Result<(), HostError> {
        let due = self.record_mut(promise)?.fulfill(value.clone());
        self.enqueue_reactions(ReactionKind::Fulfill, due, &value);
        Ok(())
    }

    fn reject_promise(&mut self, promise: ObjectRef, reason: ManagedValue) -> Result<(), HostError> {
        let due = self.record_mut(promise)?.reject(reason.clone());
        self.enqueue_reactions(ReactionKind::Reject, due, &reason);
        Ok(())
    }

    fn enqueue_reactions(&mut self, kind: ReactionKind, reactions: Vec<Reaction>, argument: &ManagedValue) {
        for reaction in reactions {
            self.jobs.enqueue(Job::Reaction {
                kind,
                reaction,
                argument: argument.clone(),
            });
        }
    }

    /// Attach reactions, or queue one right away if already settled
    fn perform_then(
        &mut self,
        promise: ObjectRef,
        on_fulfilled: Reaction,
        on_rejected: Reaction,
    ) -> Result<(), HostError> {
        let record = self.record_mut(promise)?;
        record.mark_handled();
        match record.state() {
            PromiseState::Pending => record.add_reactions(on_fulfilled, on_rejected),
            PromiseState::Fulfilled => {
                let argument = record.result().clone();
                self.enqueue_reactions(ReactionKind::Fulfill, vec![on_fulfilled], &argument);
            }
            PromiseState::Rejected => {
                let argument = record.result().clone();
                self.enqueue_reactions(ReactionKind::Reject, vec![on_rejected], &argument);
            }
        }
        Ok(())
    }

    /// Run one internal job. Returns a native job if the reaction needs the embedder.
    fn run_job(&mut self, job: Job) -> Result<Option<NativeJob>, HostError> {
        match job {
            Job::ResolveThenable { promise, thenable } => {
                self.perform_then(thenable, Reaction::adopt(promise), Reaction::adopt(promise))?;
                Ok(None)
            }
            Job::Reaction {
                kind,
                reaction,
                argument,
            } => match (reaction.handler, reaction.target) {
                (Some(handler), ReactionTarget::Derived(derived)) => {
                    // Pinned until the embedder settles it
                    self.heap.retain(derived);
                    Ok(Some(NativeJob {
                        kind,
                        handler,
                        argument,
                        derived,
                    }))
                }
                (_, ReactionTarget::Derived(derived)) => {
                    match kind {
                        ReactionKind::Fulfill => self.resolve_promise(derived, argument)?,
                        ReactionKind::Reject => self.reject_resolving(derived, argument)?,
                    };
                    Ok(None)
                }
                (_, ReactionTarget::Adopt(promise)) => {
                    if self.record(promise)?.state() == PromiseState::Pending {
                        match kind {
                            ReactionKind::Fulfill => self.fulfill_promise(promise, argument)?,
                            ReactionKind::Reject => self.reject_promise(promise, argument)?,
                        }
                    }
                    Ok(None)
                }
            },
        }
    }
}

impl ManagedRuntime for HostRuntime {
    fn is_promise(&self, obj: ObjectRef) -> bool {
        self.heap.tag(obj) == ObjectTag::Promise
    }

    fn create_object(&mut self) -> Result<ObjectRef, HostError> {
        self.alloc(HeapObject::Object)
    }

    fn promise_state(&self, promise: ObjectRef) -> Result<PromiseState, HostError> {
        Ok(self.record(promise)?.state())
    }

    fn promise_result(&self, promise: ObjectRef) -> Result<ManagedValue, HostError> {
        Ok(self.record(promise)?.result().clone())
    }

    fn resolver_new(&mut self) -> Result<ObjectRef, HostError> {
        self.alloc(HeapObject::Promise(PromiseRecord::new()))
    }

    fn resolver_resolve(&mut self, resolver: ObjectRef, value: ManagedValue) -> Result<bool, HostError> {
        self.check_running()?;
        self.resolve_promise(resolver, value)
    }

    fn resolver_reject(&mut self, resolver: ObjectRef, reason: ManagedValue) -> Result<bool, HostError> {
        self.check_running()?;
        self.reject_resolving(resolver, reason)
    }

    fn resolver_get_promise(&self, resolver: ObjectRef) -> Result<ObjectRef, HostError> {
        self.record(resolver)?;
        Ok(resolver)
    }

    fn promise_then(
        &mut self,
        promise: ObjectRef,
        on_fulfilled: Option<FunctionId>,
        on_rejected: Option<FunctionId>,
    ) -> Result<ObjectRef, HostError> {
        self.record(promise)?;
        // Keep the source alive across a possible collection in alloc
        self.heap.retain(promise);
        let derived = self.alloc(HeapObject::Promise(PromiseRecord::new()));
        self.heap.release(promise);
        let derived = derived?;

        self.perform_then(
            promise,
            Reaction::derived(on_fulfilled, derived),
            Reaction::derived(on_rejected, derived),
        )?;
        Ok(derived)
    }

    fn promise_has_handler(&self, promise: ObjectRef) -> Result<bool, HostError> {
        Ok(self.record(promise)?.is_handled())
    }

    fn promise_mark_as_handled(&mut self, promise: ObjectRef) -> Result<(), HostError> {
        self.record_mut(promise)?.mark_handled();
        Ok(())
    }

    fn next_job(&mut self) -> Option<NativeJob> {
        while !self.terminating {
            let job = self.jobs.pop()?;
            match self.run_job(job) {
                Ok(Some(native)) => return Some(native),
                Ok(None) => {}
                Err(err) => tracing::warn!(%err, "dropping microtask"),
            }
        }
        None
    }

    fn retain(&mut self, obj: ObjectRef) {
        if !self.heap.retain(obj) {
            tracing::warn!(%obj, "retain of dead object");
        }
    }

    fn release(&mut self, obj: ObjectRef) {
        if !self.heap.release(obj) {
            tracing::warn!(%obj, "release without matching retain");
        }
    }

    fn collect_garbage(&mut self) -> GcStats {
        let roots = self.jobs.trace();
        let stats = collector::collect(&mut self.heap, roots);
        tracing::debug!(
            before = stats.objects_before,
            after = stats.objects_after,
            freed = stats.freed,
            "managed heap collected"
        );
        stats
    }

    fn heap_stats(&self) -> HeapStats {
        HeapStats {
            limit: self.heap.limit(),
            live: self.heap.live(),
            rooted: self.heap.rooted(),
            pending_jobs: self.jobs.len(),
        }
    }

    fn terminate_execution(&mut self) {
        self.terminating = true;
    }

    fn cancel_terminate_execution(&mut self) {
        self.terminating = false;
    }

    fn is_execution_terminating(&self) -> bool {
        self.terminating
    }
}
