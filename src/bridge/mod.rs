//! Generic object bridge
//!
//! This module is the layer between native handles and managed objects:
//! - The managed runtime interface the bridge calls through
//! - Bridge objects and the typed handle factory
//! - The handle table and its scopes (GC root registration)
//! - The native string table
//! - Value translation in both directions

mod convert;
pub mod handle;
pub mod object;
pub mod runtime;
pub mod strings;

pub use handle::{HandleId, HandleTable, ScopeMark};
pub use object::{BridgeObject, GenericObject, IsolateId, ObjectKind};
pub use runtime::{
    FunctionId, GcStats, HeapStats, HostError, ManagedRuntime, ManagedValue, NativeJob, ObjectRef,
    PromiseState, ReactionKind,
};
pub use strings::{StringId, StringTable};

use thiserror::Error;

/// Misuse of handles or strings across the bridge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("handle {0} is not live")]
    InvalidHandle(HandleId),
    #[error("handle belongs to isolate {found}, not {expected}")]
    WrongIsolate { expected: IsolateId, found: IsolateId },
    #[error("handle scope closed out of order")]
    ScopeMismatch,
    #[error("string #{0} is not interned in this isolate")]
    InvalidString(u32),
}
