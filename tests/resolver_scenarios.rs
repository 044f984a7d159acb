//! End-to-end scenarios through the public embedding API

use std::cell::RefCell;
use std::rc::Rc;

use promise_bridge::{Function, Isolate, IsolateConfig, Promise, PromiseState, Resolver, Value};

#[test]
fn test_fulfill_then_ignore_later_settlement() {
    let mut isolate = Isolate::new(IsolateConfig::default());
    let mut ctx = isolate.context();

    let resolver = Resolver::new(&mut ctx).unwrap();
    let promise = resolver.get_promise(&mut ctx);
    assert_eq!(promise.state(&ctx), PromiseState::Pending);

    assert_eq!(resolver.resolve(&mut ctx, Value::int(42)), Some(true));
    assert_eq!(resolver.reject(&mut ctx, Value::int(99)), Some(false));
    assert_eq!(promise.state(&ctx), PromiseState::Fulfilled);
    assert_eq!(promise.result(&mut ctx), Value::int(42));
}

#[test]
fn test_reactions_observe_settlement_order() {
    let mut isolate = Isolate::new(IsolateConfig::default());
    let mut ctx = isolate.context();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let first = Resolver::new(&mut ctx).unwrap();
    let second = Resolver::new(&mut ctx).unwrap();
    for (resolver, tag) in [(first, 1), (second, 2)] {
        let seen = Rc::clone(&seen);
        let record = Function::new(&mut ctx, move |_, v| {
            seen.borrow_mut().push((tag, v.to_i32()));
            Ok(v)
        });
        resolver.get_promise(&mut ctx).then(&mut ctx, record).unwrap();
    }

    second.resolve(&mut ctx, Value::int(20));
    first.resolve(&mut ctx, Value::int(10));
    assert!(seen.borrow().is_empty());

    assert_eq!(ctx.perform_microtask_checkpoint(), 2);
    assert_eq!(*seen.borrow(), vec![(2, Some(20)), (1, Some(10))]);
}

#[test]
fn test_adoption_chain_through_checkpoint() {
    let mut isolate = Isolate::new(IsolateConfig::default());
    let mut ctx = isolate.context();

    let a = Resolver::new(&mut ctx).unwrap();
    let b = Resolver::new(&mut ctx).unwrap();
    let c = Resolver::new(&mut ctx).unwrap();
    let b_promise = b.get_promise(&mut ctx);
    let c_promise = c.get_promise(&mut ctx);
    a.resolve(&mut ctx, b_promise.into());
    b.resolve(&mut ctx, c_promise.into());
    let reason = ctx.string("boom");
    c.reject(&mut ctx, reason);

    ctx.perform_microtask_checkpoint();
    let promise = a.get_promise(&mut ctx);
    assert_eq!(promise.state(&ctx), PromiseState::Rejected);
    let result = promise.result(&mut ctx);
    assert_eq!(ctx.to_rust_string(result).as_deref(), Some("boom"));
}

#[test]
fn test_scoped_resolvers_are_collected() {
    let mut isolate = Isolate::new(IsolateConfig::default().with_heap_limit(4));
    let mut ctx = isolate.context();

    let kept = Resolver::new(&mut ctx).unwrap();
    for _ in 0..10 {
        ctx.handle_scope(|ctx| {
            let resolver = Resolver::new(ctx).unwrap();
            resolver.resolve(ctx, Value::bool(true));
        });
    }
    assert_eq!(kept.resolve(&mut ctx, Value::int(1)), Some(true));
    assert_eq!(kept.get_promise(&mut ctx).result(&mut ctx), Value::int(1));
}

#[test]
fn test_escaped_promise_outlives_scope() {
    let mut isolate = Isolate::new(IsolateConfig::default());
    let mut ctx = isolate.context();

    let escaped = ctx.escapable_handle_scope(|ctx| {
        let resolver = Resolver::new(ctx).unwrap();
        resolver.reject(ctx, Value::null());
        resolver.get_promise(ctx).into_value()
    });
    ctx.isolate().collect_garbage();

    let promise = Promise::cast(&ctx, escaped).unwrap();
    assert_eq!(promise.state(&ctx), PromiseState::Rejected);
    assert!(promise.result(&mut ctx).is_null());
}

#[test]
fn test_termination_leaves_state_untouched() {
    let mut isolate = Isolate::new(IsolateConfig::default());
    let mut ctx = isolate.context();
    let resolver = Resolver::new(&mut ctx).unwrap();
    let promise = resolver.get_promise(&mut ctx);

    ctx.isolate().terminate_execution();
    assert!(ctx.isolate().is_execution_terminating());
    assert_eq!(resolver.resolve(&mut ctx, Value::int(1)), None);
    assert!(Resolver::new(&mut ctx).is_none());
    assert_eq!(promise.state(&ctx), PromiseState::Pending);

    ctx.isolate().cancel_terminate_execution();
    assert_eq!(resolver.reject(&mut ctx, Value::int(2)), Some(true));
    assert_eq!(promise.state(&ctx), PromiseState::Rejected);
}
