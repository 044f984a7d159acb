//! Native functions
//!
//! Native callables registered with an isolate, used as promise reaction
//! handlers. A handler receives the settled value and returns `Ok(value)` to
//! fulfill the derived promise or `Err(reason)` to reject it.

use std::rc::Rc;

use crate::bridge::FunctionId;
use crate::context::Context;
use crate::value::Value;

pub type NativeFunction = Rc<dyn Fn(&mut Context<'_>, Value) -> Result<Value, Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Function(FunctionId);

impl Function {
    /// Register `f` with the context's isolate
    pub fn new<F>(ctx: &mut Context<'_>, f: F) -> Function
    where
        F: Fn(&mut Context<'_>, Value) -> Result<Value, Value> + 'static,
    {
        Function(ctx.isolate().register_function(Rc::new(f)))
    }

    #[inline]
    pub fn id(self) -> FunctionId {
        self.0
    }
}
