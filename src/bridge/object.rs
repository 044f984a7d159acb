//! Bridge objects
//!
//! A bridge object is the native-side content of a handle: it binds one
//! managed [`ObjectRef`] for its whole life and remembers which isolate it
//! belongs to. Each managed object kind gets its own wrapper type; the
//! factory [`wrap`] picks the right one by asking the runtime.

use std::fmt;

use crate::promise::PromiseBridge;

use super::runtime::{ManagedRuntime, ObjectRef};

/// Identifier of the isolate a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolateId(pub u32);

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

/// Kinds of bridged objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Promise,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Object => f.write_str("Object"),
            ObjectKind::Promise => f.write_str("Promise"),
        }
    }
}

/// Native-side content of a handle
pub trait BridgeObject: fmt::Debug {
    fn isolate(&self) -> IsolateId;

    /// The managed object this handle is bound to. Never changes.
    fn managed(&self) -> ObjectRef;

    fn kind(&self) -> ObjectKind;

    /// Capability check
    fn is_promise(&self) -> bool {
        false
    }

    fn as_promise(&self) -> Option<&PromiseBridge> {
        None
    }

    /// Copy hook: a new wrapper of the same kind bound to `managed`, which
    /// denotes the same logical object as `self.managed()`.
    fn copy_to(&self, managed: ObjectRef) -> Box<dyn BridgeObject>;
}

/// Wrapper for managed objects with no specialized bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericObject {
    isolate: IsolateId,
    managed: ObjectRef,
}

impl GenericObject {
    pub fn new(isolate: IsolateId, managed: ObjectRef) -> Self {
        GenericObject { isolate, managed }
    }
}

impl BridgeObject for GenericObject {
    fn isolate(&self) -> IsolateId {
        self.isolate
    }

    fn managed(&self) -> ObjectRef {
        self.managed
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Object
    }

    fn copy_to(&self, managed: ObjectRef) -> Box<dyn BridgeObject> {
        Box::new(GenericObject::new(self.isolate, managed))
    }
}

/// Bridge a managed reference as a typed native wrapper
///
/// Promise wrappers are only constructed for references the runtime
/// identifies as promises.
pub fn wrap(runtime: &dyn ManagedRuntime, isolate: IsolateId, managed: ObjectRef) -> Box<dyn BridgeObject> {
    if runtime.is_promise(managed) {
        Box::new(PromiseBridge::new(isolate, managed))
    } else {
        Box::new(GenericObject::new(isolate, managed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostRuntime;

    #[test]
    fn test_generic_object_is_not_promise() {
        let obj = GenericObject::new(IsolateId(1), ObjectRef::new(0, 0));
        assert!(!obj.is_promise());
        assert!(obj.as_promise().is_none());
        assert_eq!(obj.kind(), ObjectKind::Object);
    }

    #[test]
    fn test_copy_rebinds_same_kind() {
        let obj = GenericObject::new(IsolateId(1), ObjectRef::new(0, 0));
        let copy = obj.copy_to(ObjectRef::new(0, 0));
        assert_eq!(copy.kind(), ObjectKind::Object);
        assert_eq!(copy.isolate(), IsolateId(1));
        assert_eq!(copy.managed(), obj.managed());
    }

    #[test]
    fn test_wrap_tags_by_runtime_type() {
        let mut rt = HostRuntime::new(8);
        let promise = rt.resolver_new().unwrap();
        rt.retain(promise);
        let plain = rt.create_object().unwrap();

        let wrapped = wrap(&rt, IsolateId(0), promise);
        assert!(wrapped.is_promise());
        assert_eq!(wrapped.kind(), ObjectKind::Promise);

        let wrapped = wrap(&rt, IsolateId(0), plain);
        assert!(!wrapped.is_promise());
        assert_eq!(wrapped.managed(), plain);
    }
}
