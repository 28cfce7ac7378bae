//! # Scheduler
//!
//! Cooperative round-robin scheduler. Tasks are registered once at startup;
//! afterwards the scheduler invokes every task exactly once per cycle, in
//! registration order, for as long as the vehicle runs.
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────────────┐  schedule_task()  ┌───────┐  execute()  ┌─────────┐
//!   │ Uninitialized │ ────────────────► │ Ready │ ──────────► │ Running │
//!   └───────────────┘                   └───────┘             └─────────┘
//!           ▲                                                (no return)
//!           └──────────── init() ─────────┘
//! ```
//!
//! There is no priority, deadline or skip policy. Every task's period is the
//! wall-clock cost of one full cycle.

use crate::config::MAX_TASKS;
use crate::error::SchedulerError;
use crate::task::{Task, TaskId};

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No tasks registered yet.
    Uninitialized,
    /// Tasks registered, run loop not started.
    Ready,
    /// Cycling through tasks. Never left during normal operation.
    Running,
}

/// Ordered task table plus the cursor of the next task to run.
///
/// `C` is the context handed to every task step.
pub struct Scheduler<'t, C, const MAX: usize = MAX_TASKS> {
    tasks: [Option<&'t mut dyn Task<C>>; MAX],
    task_count: usize,
    cursor: usize,
    cycles: u32,
    state: SchedulerState,
}

impl<'t, C, const MAX: usize> Scheduler<'t, C, MAX> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            tasks: core::array::from_fn(|_| None),
            task_count: 0,
            cursor: 0,
            cycles: 0,
            state: SchedulerState::Uninitialized,
        }
    }

    /// Reset the task list to empty.
    pub fn init(&mut self) {
        self.tasks.iter_mut().for_each(|slot| *slot = None);
        self.task_count = 0;
        self.cursor = 0;
        self.cycles = 0;
        self.state = SchedulerState::Uninitialized;
    }

    /// Append a task to the registration list.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the task's position in every cycle
    /// - `Err(TaskTableFull)`: `MAX` tasks already registered
    /// - `Err(AlreadyRunning)`: the run loop has started
    pub fn schedule_task(&mut self, task: &'t mut dyn Task<C>) -> Result<TaskId, SchedulerError> {
        if self.state == SchedulerState::Running {
            log::warn!("task '{}' registered after start", task.name());
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.task_count >= MAX {
            return Err(SchedulerError::TaskTableFull);
        }

        let id = TaskId(self.task_count);
        log::debug!("task '{}' registered in slot {}", task.name(), id.index());
        self.tasks[id.index()] = Some(task);
        self.task_count += 1;
        self.state = SchedulerState::Ready;
        Ok(id)
    }

    /// Run every registered task once, in registration order.
    pub fn run_cycle(&mut self, cx: &mut C) {
        self.state = SchedulerState::Running;
        self.cursor = 0;
        while self.cursor < self.task_count {
            if let Some(task) = self.tasks[self.cursor].as_deref_mut() {
                task.step(cx);
            }
            self.cursor += 1;
        }
        self.cursor = 0;
        self.cycles = self.cycles.wrapping_add(1);
    }

    /// Enter the run loop. **Does not return.**
    ///
    /// Returning from here would be a fatal condition, so the signature rules
    /// it out. A task step that never returns stalls the whole system,
    /// watchdog feed included.
    pub fn execute(&mut self, cx: &mut C) -> ! {
        if self.task_count == 0 {
            log::warn!("scheduler started without tasks");
        } else {
            log::info!("scheduler running {} tasks", self.task_count);
        }
        loop {
            self.run_cycle(cx);
        }
    }

    #[inline]
    pub const fn task_count(&self) -> usize {
        self.task_count
    }

    /// Completed cycles (wrapping).
    #[inline]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    #[inline]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Name of a registered task.
    pub fn task_name(&self, id: TaskId) -> Option<&'static str> {
        self.tasks.get(id.index())?.as_deref().map(|t| t.name())
    }
}

impl<C, const MAX: usize> Default for Scheduler<'_, C, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
