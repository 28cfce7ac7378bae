//! # Rover Runtime
//!
//! Cooperative on-board runtime for a small autonomous vehicle on an
//! ARM Cortex-M4 microcontroller.
//!
//! ## Overview
//!
//! The vehicle runs a fixed set of periodic task steps in one endless
//! round-robin loop. Working memory comes from a fixed pool of pages; when
//! the pool runs dry, the oldest allocations are evicted and their bytes
//! leave over the serial link to the remote side instead of being lost.
//!
//! - **No heap**: every component is statically sized
//! - **No preemption**: tasks are steps, the loop calls each once per cycle
//! - **One shared context**: tasks reach the allocator and the link through
//!   the [`runtime::Runtime`] they are handed
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │           Tasks (tasks.rs): status · commands · log    │
//! ├────────────────────────────────────────────────────────┤
//! │                Runtime context (runtime.rs)            │
//! │       boot() · start() · allocate() · send_status()    │
//! ├──────────────┬───────────────────┬─────────────────────┤
//! │  Scheduler   │  Swappable memory │  Serial link        │
//! │  scheduler.rs│  swap.rs          │  link.rs · frame.rs │
//! │  ─ schedule  │  ─ allocate       │  ─ send_*           │
//! │  ─ run_cycle │  ─ evict (FIFO)───┼─►─ Evicted frames   │
//! │  ─ execute   │  ─ read / write   │  ─ receive          │
//! ├──────────────┼───────────────────┼─────────────────────┤
//! │  task.rs     │  page_pool.rs     │  queue.rs · sync.rs │
//! │  Task trait  │  fixed pages      │  ring buffers       │
//! ├──────────────┴───────────────────┴─────────────────────┤
//! │     Status snapshot (status.rs) · Fatal halt (halt.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │      Arch Port (arch/cortex_m4.rs, `firmware` only)    │
//! │        static LINK · SysTick USART2 service            │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Model
//!
//! Ordinary failures (no pages, full queue, stale handle) come back as
//! typed errors from [`error`]. Two conditions halt the vehicle through
//! [`halt::halt`]: an eviction whose bytes the link cannot take, and a
//! command frame that cannot be queued.
//!
//! ## Memory Model
//!
//! - **No `alloc`**: pure `core` on the target
//! - **Const-generic sizes**: `PagePool<N, P>`, `ByteQueue<C>`,
//!   `Scheduler<C, MAX>`; the firmware uses the values in [`config`]
//! - **Critical sections**: the `critical-section` crate guards every
//!   structure the serial interrupt shares with the loop
//!
//! ## Building
//!
//! Host builds (and `cargo test`) use the `std` critical-section
//! implementation. The firmware binary needs `--features firmware` and a
//! `thumbv7em-none-eabihf` target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod frame;
pub mod halt;
pub mod link;
pub mod page_pool;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod status;
pub mod swap;
pub mod sync;
pub mod task;
pub mod tasks;

#[cfg(feature = "firmware")]
pub mod arch;
