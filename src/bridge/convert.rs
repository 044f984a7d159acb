//! Value translation between the native and managed representations
//!
//! Native -> managed resolves strings through the string table and handles
//! through the handle table. Managed -> native interns strings and wraps
//! objects as fresh handles in the current scope.

use crate::context::Isolate;
use crate::value::Value;

use super::BridgeError;
use super::runtime::ManagedValue;

impl Isolate {
    pub(crate) fn to_managed(&self, value: Value) -> Result<ManagedValue, BridgeError> {
        if let Some(i) = value.to_i32() {
            return Ok(ManagedValue::Int(i));
        }
        if let Some(b) = value.to_bool() {
            return Ok(ManagedValue::Bool(b));
        }
        if value.is_null() {
            return Ok(ManagedValue::Null);
        }
        if let Some(id) = value.to_string_id() {
            return self
                .strings()
                .get(id)
                .map(|s| ManagedValue::String(s.clone()))
                .ok_or(BridgeError::InvalidString(id.0));
        }
        if let Some(id) = value.to_handle() {
            return Ok(ManagedValue::Object(self.try_content(id)?.managed()));
        }
        Ok(ManagedValue::Undefined)
    }

    pub(crate) fn to_native(&mut self, value: ManagedValue) -> Value {
        match value {
            ManagedValue::Undefined => Value::undefined(),
            ManagedValue::Null => Value::null(),
            ManagedValue::Bool(b) => Value::bool(b),
            ManagedValue::Int(i) => Value::int(i),
            ManagedValue::String(s) => Value::string(self.strings_mut().intern_rc(s)),
            ManagedValue::Object(obj) => Value::handle(self.wrap(obj)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::{BridgeError, ManagedValue, StringId};
    use crate::config::IsolateConfig;
    use crate::context::Isolate;
    use crate::value::Value;

    #[test]
    fn test_immediates_round_trip() {
        let mut isolate = Isolate::new(IsolateConfig::default());
        for value in [Value::int(-3), Value::bool(true), Value::null(), Value::undefined()] {
            let managed = isolate.to_managed(value).unwrap();
            assert_eq!(isolate.to_native(managed), value);
        }
    }

    #[test]
    fn test_strings_are_interned() {
        let mut isolate = Isolate::new(IsolateConfig::default());
        let native = isolate.to_native(ManagedValue::String("err".into()));
        assert_eq!(
            isolate.to_managed(native).unwrap(),
            ManagedValue::String("err".into())
        );
        assert_eq!(
            isolate.to_managed(Value::string(StringId(99))),
            Err(BridgeError::InvalidString(99))
        );
    }

    #[test]
    fn test_objects_become_handles() {
        let mut isolate = Isolate::new(IsolateConfig::default());
        let mut ctx = isolate.context();
        let object = ctx.new_object().unwrap();
        let managed = ctx.isolate().to_managed(object).unwrap();
        let obj = managed.as_object().unwrap();

        let before = ctx.isolate().handle_count();
        let native = ctx.isolate().to_native(ManagedValue::Object(obj));
        assert!(native.is_handle());
        assert_ne!(native, object);
        assert_eq!(ctx.isolate().handle_count(), before + 1);
        assert_eq!(ctx.isolate().to_managed(native).unwrap(), managed);
    }
}
