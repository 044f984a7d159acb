//! Promise handles
//!
//! [`PromiseBridge`] is the bridge object for managed promises. It binds one
//! managed promise reference and forwards every query and settlement to the
//! runtime; it never caches state.
//!
//! [`Promise`] and [`Resolver`] are the two native views of such a handle.
//! With the host runtime they share the underlying managed object: a resolver
//! is a promise handle used through the settlement operations. A runtime that
//! keeps resolvers as separate objects hands back a non-promise resolver; its
//! handle is a generic one and [`Resolver::get_promise`] asks the runtime for
//! the promise it settles.

use crate::bridge::{
    BridgeObject, HandleId, HostError, IsolateId, ManagedRuntime, ManagedValue, ObjectKind,
    ObjectRef, PromiseState,
};
use crate::context::Context;
use crate::function::Function;
use crate::value::Value;

/// Bridge object for a managed promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseBridge {
    isolate: IsolateId,
    promise: ObjectRef,
}

impl PromiseBridge {
    /// Bind to an existing managed promise
    ///
    /// `promise` must be a reference the runtime identifies as a promise;
    /// [`crate::bridge::object::wrap`] checks this before constructing.
    pub fn new(isolate: IsolateId, promise: ObjectRef) -> Self {
        PromiseBridge { isolate, promise }
    }

    pub fn state(&self, runtime: &dyn ManagedRuntime) -> Result<PromiseState, HostError> {
        tracing::trace!(isolate = %self.isolate, promise = %self.promise, "promise state");
        runtime.promise_state(self.promise)
    }

    pub fn result(&self, runtime: &dyn ManagedRuntime) -> Result<ManagedValue, HostError> {
        tracing::trace!(isolate = %self.isolate, promise = %self.promise, "promise result");
        runtime.promise_result(self.promise)
    }

    pub fn resolve(&self, runtime: &mut dyn ManagedRuntime, value: ManagedValue) -> Result<bool, HostError> {
        tracing::trace!(isolate = %self.isolate, promise = %self.promise, "resolver resolve");
        runtime.resolver_resolve(self.promise, value)
    }

    pub fn reject(&self, runtime: &mut dyn ManagedRuntime, reason: ManagedValue) -> Result<bool, HostError> {
        tracing::trace!(isolate = %self.isolate, promise = %self.promise, "resolver reject");
        runtime.resolver_reject(self.promise, reason)
    }
}

impl BridgeObject for PromiseBridge {
    fn isolate(&self) -> IsolateId {
        self.isolate
    }

    fn managed(&self) -> ObjectRef {
        self.promise
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Promise
    }

    fn is_promise(&self) -> bool {
        true
    }

    fn as_promise(&self) -> Option<&PromiseBridge> {
        Some(self)
    }

    fn copy_to(&self, managed: ObjectRef) -> Box<dyn BridgeObject> {
        Box::new(PromiseBridge::new(self.isolate, managed))
    }
}

/// Look up the promise bridge behind a handle
///
/// # Panics
/// Panics if the handle is not live or does not refer to a promise.
fn bridge_of(ctx: &Context<'_>, id: HandleId) -> PromiseBridge {
    let content = ctx.isolate_ref().content(id);
    match content.as_promise() {
        Some(bridge) => *bridge,
        None => panic!("handle {id} is a {}, not a Promise", content.kind()),
    }
}

/// Unwrap a runtime answer on a handle that is known to be a live promise
fn expect_live<T>(operation: &str, result: Result<T, HostError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{operation} on a live promise handle failed: {err}"),
    }
}

fn to_managed(ctx: &Context<'_>, value: Value) -> ManagedValue {
    match ctx.isolate_ref().to_managed(value) {
        Ok(managed) => managed,
        Err(err) => panic!("{err}"),
    }
}

/// Native promise handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Promise(HandleId);

impl Promise {
    /// Capability check: view `value` as a promise if its handle is one
    pub fn cast(ctx: &Context<'_>, value: Value) -> Option<Promise> {
        let id = value.to_handle()?;
        ctx.isolate_ref().content(id).is_promise().then_some(Promise(id))
    }

    #[inline]
    pub fn handle(self) -> HandleId {
        self.0
    }

    #[inline]
    pub fn into_value(self) -> Value {
        Value::handle(self.0)
    }

    /// Current settlement state, queried live from the runtime
    pub fn state(self, ctx: &Context<'_>) -> PromiseState {
        let bridge = bridge_of(ctx, self.0);
        expect_live("state", bridge.state(ctx.isolate_ref().runtime()))
    }

    /// Fulfillment value or rejection reason
    ///
    /// Returns undefined while the promise is pending; check
    /// [`Promise::state`] first to tell the cases apart.
    pub fn result(self, ctx: &mut Context<'_>) -> Value {
        let bridge = bridge_of(ctx, self.0);
        let result = expect_live("result", bridge.result(ctx.isolate_ref().runtime()));
        ctx.isolate().to_native(result)
    }

    /// Whether a reaction has been attached or the promise marked as handled
    pub fn has_handler(self, ctx: &Context<'_>) -> bool {
        let bridge = bridge_of(ctx, self.0);
        expect_live(
            "has_handler",
            ctx.isolate_ref().runtime().promise_has_handler(bridge.managed()),
        )
    }

    pub fn mark_as_handled(self, ctx: &mut Context<'_>) {
        let bridge = bridge_of(ctx, self.0);
        expect_live(
            "mark_as_handled",
            ctx.isolate().runtime_mut().promise_mark_as_handled(bridge.managed()),
        );
    }

    /// Register a fulfillment reaction
    ///
    /// Returns the derived promise, or None if the runtime refused (allocation
    /// failure or terminating execution).
    pub fn then(self, ctx: &mut Context<'_>, on_fulfilled: Function) -> Option<Promise> {
        self.add_reactions(ctx, Some(on_fulfilled), None)
    }

    /// Register fulfillment and rejection reactions
    pub fn then2(self, ctx: &mut Context<'_>, on_fulfilled: Function, on_rejected: Function) -> Option<Promise> {
        self.add_reactions(ctx, Some(on_fulfilled), Some(on_rejected))
    }

    /// Register a rejection reaction
    pub fn catch(self, ctx: &mut Context<'_>, on_rejected: Function) -> Option<Promise> {
        self.add_reactions(ctx, None, Some(on_rejected))
    }

    fn add_reactions(
        self,
        ctx: &mut Context<'_>,
        on_fulfilled: Option<Function>,
        on_rejected: Option<Function>,
    ) -> Option<Promise> {
        let bridge = bridge_of(ctx, self.0);
        let isolate = ctx.isolate();
        let derived = isolate.runtime_mut().promise_then(
            bridge.managed(),
            on_fulfilled.map(Function::id),
            on_rejected.map(Function::id),
        );
        match derived {
            Ok(derived) => Some(Promise(isolate.wrap(derived))),
            Err(err) => {
                tracing::debug!(%err, promise = %bridge.managed(), "then refused");
                None
            }
        }
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        promise.into_value()
    }
}

/// Native resolver handle: a promise with settlement authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolver(HandleId);

impl Resolver {
    /// Allocate a new pending promise with its settlement authority
    ///
    /// Returns None if the runtime cannot allocate, e.g. the heap is exhausted
    /// or execution is terminating.
    pub fn new(ctx: &mut Context<'_>) -> Option<Resolver> {
        let isolate = ctx.isolate();
        match isolate.runtime_mut().resolver_new() {
            Ok(resolver) => Some(Resolver(isolate.wrap(resolver))),
            Err(err) => {
                tracing::debug!(%err, isolate = %isolate.id(), "resolver allocation failed");
                None
            }
        }
    }

    /// View a promise handle value as its resolver
    pub fn cast(ctx: &Context<'_>, value: Value) -> Option<Resolver> {
        Promise::cast(ctx, value).map(|promise| Resolver(promise.handle()))
    }

    #[inline]
    pub fn handle(self) -> HandleId {
        self.0
    }

    #[inline]
    pub fn into_value(self) -> Value {
        Value::handle(self.0)
    }

    /// Fulfill the promise with `value`
    ///
    /// `Some(false)` means the promise was already resolved and nothing
    /// changed. None means the runtime refused the call (terminating).
    pub fn resolve(self, ctx: &mut Context<'_>, value: Value) -> Option<bool> {
        let value = to_managed(ctx, value);
        let (bridge, managed) = resolver_of(ctx, self.0);
        let runtime = ctx.isolate().runtime_mut();
        let outcome = match bridge {
            Some(bridge) => bridge.resolve(runtime, value),
            None => {
                tracing::trace!(resolver = %managed, "resolver resolve");
                runtime.resolver_resolve(managed, value)
            }
        };
        settle_outcome(outcome)
    }

    /// Reject the promise with `reason`
    ///
    /// Same return contract as [`Resolver::resolve`].
    pub fn reject(self, ctx: &mut Context<'_>, reason: Value) -> Option<bool> {
        let reason = to_managed(ctx, reason);
        let (bridge, managed) = resolver_of(ctx, self.0);
        let runtime = ctx.isolate().runtime_mut();
        let outcome = match bridge {
            Some(bridge) => bridge.reject(runtime, reason),
            None => {
                tracing::trace!(resolver = %managed, "resolver reject");
                runtime.resolver_reject(managed, reason)
            }
        };
        settle_outcome(outcome)
    }

    /// The promise this resolver settles
    pub fn get_promise(self, ctx: &mut Context<'_>) -> Promise {
        let content = ctx.isolate_ref().content(self.0);
        if content.is_promise() {
            return Promise(self.0);
        }

        let managed = content.managed();
        let isolate = ctx.isolate();
        let promise = expect_live("get_promise", isolate.runtime().resolver_get_promise(managed));
        Promise(isolate.wrap(promise))
    }
}

impl From<Resolver> for Value {
    fn from(resolver: Resolver) -> Self {
        resolver.into_value()
    }
}

/// Promise bridge (if the content is one) and managed reference behind a resolver
fn resolver_of(ctx: &Context<'_>, id: HandleId) -> (Option<PromiseBridge>, ObjectRef) {
    let content = ctx.isolate_ref().content(id);
    (content.as_promise().copied(), content.managed())
}

fn settle_outcome(result: Result<bool, HostError>) -> Option<bool> {
    match result {
        Ok(settled) => Some(settled),
        Err(err) => {
            tracing::debug!(%err, "settlement refused");
            None
        }
    }
}
