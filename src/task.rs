//! # Task Model
//!
//! A task is one cooperative step: the scheduler calls it once per cycle and
//! it must return promptly. There is no preemption, so a step that blocks
//! or loops stalls every other task on the vehicle.
//!
//! Tasks receive the runtime context `C` by mutable reference on every
//! step; whatever private state a task needs lives in the task value itself.
//!
//! Two ways to define a task:
//! - any `FnMut(&mut C)` closure
//! - a plain step function bound to its own context value with [`BoundStep`]

/// One cooperative unit of periodic work.
pub trait Task<C> {
    /// Run one step. Must not block.
    fn step(&mut self, cx: &mut C);

    /// Short name for diagnostics.
    fn name(&self) -> &'static str {
        "task"
    }
}

impl<C, F: FnMut(&mut C)> Task<C> for F {
    fn step(&mut self, cx: &mut C) {
        self(cx)
    }
}

/// A step function paired with the context value it was registered with.
pub struct BoundStep<C, T> {
    name: &'static str,
    step: fn(&mut C, &mut T),
    context: T,
}

impl<C, T> BoundStep<C, T> {
    pub const fn new(name: &'static str, step: fn(&mut C, &mut T), context: T) -> Self {
        Self {
            name,
            step,
            context,
        }
    }

    pub fn context(&self) -> &T {
        &self.context
    }
}

impl<C, T> Task<C> for BoundStep<C, T> {
    fn step(&mut self, cx: &mut C) {
        (self.step)(cx, &mut self.context)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Registration slot of a task; also its position in every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
