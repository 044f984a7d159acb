//! Managed runtime interface
//!
//! The bridge never touches managed objects directly. Everything it needs from
//! the host runtime goes through [`ManagedRuntime`]: promise queries and
//! settlement, a type predicate for the handle factory, GC root registration
//! and the microtask queue hand-off.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Opaque reference to an object in the managed heap
///
/// The generation distinguishes a reused slot from the object that used to
/// live there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub index: u32,
    pub generation: u32,
}

impl ObjectRef {
    pub const fn new(index: u32, generation: u32) -> Self {
        ObjectRef { index, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}.{}", self.index, self.generation)
    }
}

/// Identifier of a native function registered with an isolate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// A value as the managed runtime sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    String(Rc<str>),
    Object(ObjectRef),
}

impl ManagedValue {
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            ManagedValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

/// Settlement state of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending => f.write_str("pending"),
            PromiseState::Fulfilled => f.write_str("fulfilled"),
            PromiseState::Rejected => f.write_str("rejected"),
        }
    }
}

/// Which settlement path a reaction was queued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Fulfill,
    Reject,
}

/// A promise reaction whose handler is a native function
///
/// The runtime keeps `derived` rooted until the embedder settles it and calls
/// [`ManagedRuntime::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeJob {
    pub kind: ReactionKind,
    pub handler: FunctionId,
    pub argument: ManagedValue,
    pub derived: ObjectRef,
}

/// Failures reported by the managed runtime
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("execution is terminating")]
    Terminated,
    #[error("managed heap exhausted ({limit} objects)")]
    OutOfMemory { limit: usize },
    #[error("{0} is not a live object")]
    DeadObject(ObjectRef),
    #[error("{0} is not a promise")]
    NotAPromise(ObjectRef),
}

/// Heap statistics reported by the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Maximum number of live objects
    pub limit: usize,
    /// Currently allocated objects
    pub live: usize,
    /// Objects with a non-zero root count
    pub rooted: usize,
    /// Queued microtasks
    pub pending_jobs: usize,
}

/// Statistics about a GC run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub objects_before: usize,
    pub objects_after: usize,
    pub freed: usize,
}

/// The callable surface of a managed runtime, as consumed by the bridge
pub trait ManagedRuntime {
    /// Type predicate used by the handle factory before wrapping.
    fn is_promise(&self, obj: ObjectRef) -> bool;

    /// Allocate a plain (non-promise) object.
    fn create_object(&mut self) -> Result<ObjectRef, HostError>;

    fn promise_state(&self, promise: ObjectRef) -> Result<PromiseState, HostError>;

    /// Fulfillment value or rejection reason; `Undefined` while pending.
    fn promise_result(&self, promise: ObjectRef) -> Result<ManagedValue, HostError>;

    /// Allocate a new pending promise together with its settlement authority.
    fn resolver_new(&mut self) -> Result<ObjectRef, HostError>;

    /// `Ok(false)` when the promise was already resolved.
    fn resolver_resolve(&mut self, resolver: ObjectRef, value: ManagedValue) -> Result<bool, HostError>;

    /// `Ok(false)` when the promise was already resolved.
    fn resolver_reject(&mut self, resolver: ObjectRef, reason: ManagedValue) -> Result<bool, HostError>;

    fn resolver_get_promise(&self, resolver: ObjectRef) -> Result<ObjectRef, HostError>;

    /// Register reactions and return the derived promise.
    fn promise_then(
        &mut self,
        promise: ObjectRef,
        on_fulfilled: Option<FunctionId>,
        on_rejected: Option<FunctionId>,
    ) -> Result<ObjectRef, HostError>;

    fn promise_has_handler(&self, promise: ObjectRef) -> Result<bool, HostError>;

    fn promise_mark_as_handled(&mut self, promise: ObjectRef) -> Result<(), HostError>;

    /// Run internal jobs until a native reaction is due, and hand it out.
    fn next_job(&mut self) -> Option<NativeJob>;

    /// Register a GC root for `obj`.
    fn retain(&mut self, obj: ObjectRef);

    /// Drop a GC root previously registered with [`ManagedRuntime::retain`].
    fn release(&mut self, obj: ObjectRef);

    fn collect_garbage(&mut self) -> GcStats;

    fn heap_stats(&self) -> HeapStats;

    fn terminate_execution(&mut self);

    fn cancel_terminate_execution(&mut self);

    fn is_execution_terminating(&self) -> bool;
}
