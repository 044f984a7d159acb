//! promise-bridge - native Promise handles over a managed runtime
//!
//! Embedders hold native [`Promise`] and [`Resolver`] handles while the
//! promise objects themselves live in a garbage-collected managed runtime.
//! Every query and settlement is forwarded to the runtime; the native side
//! never caches promise state.
//!
//! # Features
//! - V8-shaped embedding API: `Promise::state/result/then`, `Resolver::new/resolve/reject/get_promise`
//! - Handle scopes that register and deregister GC roots
//! - Pluggable managed runtime behind the [`bridge::ManagedRuntime`] trait
//! - Reference host runtime with a mark-sweep heap and a FIFO microtask queue
//!
//! # Example
//! ```
//! use promise_bridge::{Isolate, IsolateConfig, PromiseState, Resolver, Value};
//!
//! let mut isolate = Isolate::new(IsolateConfig::default());
//! let mut ctx = isolate.context();
//! let resolver = Resolver::new(&mut ctx).unwrap();
//! assert_eq!(resolver.resolve(&mut ctx, Value::int(42)), Some(true));
//!
//! let promise = resolver.get_promise(&mut ctx);
//! assert_eq!(promise.state(&ctx), PromiseState::Fulfilled);
//! assert_eq!(promise.result(&mut ctx).to_i32(), Some(42));
//! ```

// Core modules
pub mod value;
pub mod context;
pub mod config;

// Native <-> managed object bridge
pub mod bridge;

// Embedding API
pub mod function;
pub mod promise;

// Reference managed runtime
pub mod host;

// Re-export main types
pub use bridge::PromiseState;
pub use config::{ConfigError, IsolateConfig};
pub use context::{Context, Isolate};
pub use function::Function;
pub use promise::{Promise, Resolver};
pub use value::Value;
