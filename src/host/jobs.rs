//! Microtask queue
//!
//! Strict FIFO. Jobs are only run when the embedder asks for them through
//! `ManagedRuntime::next_job`; settling a promise merely enqueues.

use std::collections::VecDeque;

use crate::bridge::{ManagedValue, ObjectRef, ReactionKind};

use super::heap::trace_value;
use super::promise::Reaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Run a reaction with the settled value or reason
    Reaction {
        kind: ReactionKind,
        reaction: Reaction,
        argument: ManagedValue,
    },
    /// Make `promise` follow `thenable`
    ResolveThenable { promise: ObjectRef, thenable: ObjectRef },
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue::default()
    }

    pub fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Objects referenced by queued jobs. These are GC roots.
    pub fn trace(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        for job in &self.jobs {
            match job {
                Job::Reaction {
                    reaction, argument, ..
                } => {
                    out.push(reaction.target.object());
                    trace_value(argument, &mut out);
                }
                Job::ResolveThenable { promise, thenable } => {
                    out.push(*promise);
                    out.push(*thenable);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = JobQueue::new();
        let a = ObjectRef::new(0, 0);
        let b = ObjectRef::new(1, 0);
        queue.enqueue(Job::ResolveThenable { promise: a, thenable: b });
        queue.enqueue(Job::ResolveThenable { promise: b, thenable: a });

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(Job::ResolveThenable { promise: a, thenable: b }));
        assert_eq!(queue.pop(), Some(Job::ResolveThenable { promise: b, thenable: a }));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_trace_includes_targets_and_arguments() {
        let mut queue = JobQueue::new();
        let target = ObjectRef::new(4, 0);
        let payload = ObjectRef::new(5, 0);
        queue.enqueue(Job::Reaction {
            kind: ReactionKind::Fulfill,
            reaction: Reaction::adopt(target),
            argument: ManagedValue::Object(payload),
        });
        assert_eq!(queue.trace(), vec![target, payload]);
    }
}
