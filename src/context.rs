//! Isolates and execution contexts
//!
//! An [`Isolate`] is one engine instance: it owns the managed runtime, the
//! handle table, the string table and the registered native functions. It is
//! neither `Send` nor `Sync`; every operation on its handles happens on the
//! thread that owns it.
//!
//! A [`Context`] is the execution context passed to every embedding API
//! operation. It borrows the isolate mutably for as long as it lives.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bridge::{
    self, BridgeError, BridgeObject, GcStats, HandleId, HandleTable, HeapStats, IsolateId,
    ManagedRuntime, NativeJob, ObjectKind, ObjectRef, ReactionKind, ScopeMark, StringTable,
};
use crate::config::IsolateConfig;
use crate::function::NativeFunction;
use crate::host::HostRuntime;
use crate::value::Value;

static NEXT_ISOLATE_ID: AtomicU32 = AtomicU32::new(0);

pub struct Isolate {
    id: IsolateId,
    config: IsolateConfig,
    runtime: Box<dyn ManagedRuntime>,
    handles: HandleTable,
    strings: StringTable,
    functions: Vec<NativeFunction>,
}

impl Isolate {
    /// Create an isolate backed by the built-in host runtime
    ///
    /// # Panics
    /// Panics if `config.heap_limit` is zero.
    pub fn new(config: IsolateConfig) -> Self {
        assert!(config.heap_limit > 0, "heap_limit must be at least 1");
        let runtime = HostRuntime::new(config.heap_limit);
        Self::with_runtime(config, Box::new(runtime))
    }

    /// Create an isolate on top of any managed runtime
    pub fn with_runtime(config: IsolateConfig, runtime: Box<dyn ManagedRuntime>) -> Self {
        let id = IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(isolate = %id, heap_limit = config.heap_limit, "isolate created");
        Isolate {
            id,
            handles: HandleTable::with_capacity(id, config.handle_capacity),
            strings: StringTable::new(),
            functions: Vec::new(),
            config,
            runtime,
        }
    }

    #[inline]
    pub fn id(&self) -> IsolateId {
        self.id
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.config
    }

    /// Enter an execution context
    pub fn context(&mut self) -> Context<'_> {
        Context { isolate: self }
    }

    pub fn runtime(&self) -> &dyn ManagedRuntime {
        &*self.runtime
    }

    pub(crate) fn runtime_mut(&mut self) -> &mut dyn ManagedRuntime {
        &mut *self.runtime
    }

    pub(crate) fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub(crate) fn strings_mut(&mut self) -> &mut StringTable {
        &mut self.strings
    }

    pub fn terminate_execution(&mut self) {
        tracing::debug!(isolate = %self.id, "terminating execution");
        self.runtime.terminate_execution();
    }

    pub fn cancel_terminate_execution(&mut self) {
        self.runtime.cancel_terminate_execution();
    }

    pub fn is_execution_terminating(&self) -> bool {
        self.runtime.is_execution_terminating()
    }

    /// Run the managed collector. Objects reachable from live handles survive.
    pub fn collect_garbage(&mut self) -> GcStats {
        self.runtime.collect_garbage()
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.runtime.heap_stats()
    }

    /// Number of live handles across all scopes
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Register a bridge object, pinning its managed object
    pub(crate) fn register(&mut self, content: Box<dyn BridgeObject>) -> HandleId {
        self.runtime.retain(content.managed());
        self.handles.push(content)
    }

    /// Bridge a managed reference as a new handle in the current scope
    pub(crate) fn wrap(&mut self, managed: ObjectRef) -> HandleId {
        let content = bridge::object::wrap(&*self.runtime, self.id, managed);
        self.register(content)
    }

    pub(crate) fn try_content(&self, id: HandleId) -> Result<&dyn BridgeObject, BridgeError> {
        self.handles.get(id)
    }

    /// # Panics
    /// Panics if `id` is from a closed scope or another isolate.
    pub(crate) fn content(&self, id: HandleId) -> &dyn BridgeObject {
        match self.try_content(id) {
            Ok(content) => content,
            Err(err) => panic!("{err}"),
        }
    }

    /// Duplicate a handle into the current scope through the copy hook
    pub(crate) fn duplicate(&mut self, id: HandleId) -> HandleId {
        let content = self.content(id);
        let copy = content.copy_to(content.managed());
        self.register(copy)
    }

    pub(crate) fn open_scope(&mut self) -> ScopeMark {
        self.handles.open_scope()
    }

    pub(crate) fn close_scope(&mut self, mark: ScopeMark) {
        match self.handles.close_scope(mark) {
            Ok(released) => {
                for content in released {
                    self.runtime.release(content.managed());
                }
            }
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn register_function(&mut self, function: NativeFunction) -> bridge::FunctionId {
        self.functions.push(function);
        bridge::FunctionId((self.functions.len() - 1) as u32)
    }

    pub(crate) fn function(&self, id: bridge::FunctionId) -> Option<NativeFunction> {
        self.functions.get(id.0 as usize).cloned()
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::debug!(handles = self.handles.len(), "releasing isolate handles");
        for content in self.handles.drain_all() {
            self.runtime.release(content.managed());
        }
    }
}

/// Execution context
pub struct Context<'i> {
    isolate: &'i mut Isolate,
}

impl<'i> Context<'i> {
    pub fn new(isolate: &'i mut Isolate) -> Self {
        Context { isolate }
    }

    pub fn isolate(&mut self) -> &mut Isolate {
        &mut *self.isolate
    }

    pub fn isolate_ref(&self) -> &Isolate {
        &*self.isolate
    }

    /// Create a string value
    pub fn string(&mut self, s: &str) -> Value {
        Value::string(self.isolate.strings.intern(s))
    }

    /// Get the contents of a string value
    pub fn to_rust_string(&self, value: Value) -> Option<String> {
        let id = value.to_string_id()?;
        self.isolate.strings.get(id).map(|s| s.to_string())
    }

    /// Allocate a plain managed object
    ///
    /// Returns None if the runtime cannot allocate.
    pub fn new_object(&mut self) -> Option<Value> {
        match self.isolate.runtime.create_object() {
            Ok(obj) => Some(Value::handle(self.isolate.wrap(obj))),
            Err(err) => {
                tracing::debug!(%err, "object allocation failed");
                None
            }
        }
    }

    /// Kind of the object a handle value refers to
    pub fn kind_of(&self, value: Value) -> Option<ObjectKind> {
        value.to_handle().map(|id| self.isolate.content(id).kind())
    }

    /// Copy a handle value into the current scope
    ///
    /// Non-handle values are returned unchanged.
    pub fn new_local(&mut self, value: Value) -> Value {
        match value.to_handle() {
            Some(id) => Value::handle(self.isolate.duplicate(id)),
            None => value,
        }
    }

    /// Run `f` in a new handle scope. Handles created inside are released
    /// when it returns.
    pub fn handle_scope<R>(&mut self, f: impl FnOnce(&mut Context<'_>) -> R) -> R {
        let mark = self.isolate.open_scope();
        let result = f(self);
        self.isolate.close_scope(mark);
        result
    }

    /// Like [`Context::handle_scope`], but the value `f` returns is copied into
    /// the enclosing scope.
    pub fn escapable_handle_scope(&mut self, f: impl FnOnce(&mut Context<'_>) -> Value) -> Value {
        let mark = self.isolate.open_scope();
        let value = f(self);
        let escaped = value.to_handle().map(|id| {
            let content = self.isolate.content(id);
            content.copy_to(content.managed())
        });
        self.isolate.close_scope(mark);
        match escaped {
            Some(copy) => Value::handle(self.isolate.register(copy)),
            None => value,
        }
    }

    /// Drain the microtask queue, running native reactions
    ///
    /// Returns the number of native reactions run. Stops early if execution
    /// is terminating.
    pub fn perform_microtask_checkpoint(&mut self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.isolate.runtime.next_job() {
            self.handle_scope(|ctx| ctx.run_reaction(&job));
            self.isolate.runtime.release(job.derived);
            ran += 1;
        }
        ran
    }

    fn run_reaction(&mut self, job: &NativeJob) {
        let argument = self.isolate.to_native(job.argument.clone());
        let outcome = match self.isolate.function(job.handler) {
            Some(function) => function(self, argument),
            None => {
                tracing::warn!(handler = job.handler.0, "reaction handler is not registered");
                Err(Value::undefined())
            }
        };

        let (path, value) = match outcome {
            Ok(value) => (ReactionKind::Fulfill, value),
            Err(reason) => (ReactionKind::Reject, reason),
        };
        let managed = match self.isolate.to_managed(value) {
            Ok(managed) => managed,
            Err(err) => panic!("{err}"),
        };

        let runtime = self.isolate.runtime_mut();
        let settled = match path {
            ReactionKind::Fulfill => runtime.resolver_resolve(job.derived, managed),
            ReactionKind::Reject => runtime.resolver_reject(job.derived, managed),
        };
        if let Err(err) = settled {
            tracing::debug!(%err, derived = %job.derived, kind = ?job.kind, "derived promise left pending");
        }
    }

    /// Render a value, including string contents and object kinds
    pub fn display(&self, value: Value) -> String {
        if let Some(s) = self.to_rust_string(value) {
            return format!("{s:?}");
        }
        match self.kind_of(value) {
            Some(kind) => format!("[object {kind}]"),
            None => value.to_string(),
        }
    }
}
