//! # Rover Runtime Configuration
//!
//! Compile-time constants governing memory, queues and scheduling.
//! All limits are fixed at compile time; nothing grows at runtime.

/// Size of one page in bytes. Every allocation is rounded up to whole pages.
pub const PAGE_SIZE: usize = 32;

/// Number of pages owned by the page pool. Together with `PAGE_SIZE`
/// this is the whole working-memory budget of the vehicle's tasks.
pub const PAGE_COUNT: usize = 16;

/// Capacity in bytes of each serial byte queue (outbound and inbound).
pub const QUEUE_CAPACITY: usize = 128;

/// Payload slot of one serial frame: command byte plus arguments,
/// zero-padded to this size on the wire.
pub const SCI_CMD_AND_PAYLOAD_SIZE: usize = 16;

/// Maximum number of task steps the scheduler can hold.
pub const MAX_TASKS: usize = 8;

/// Upper bound reported for the task-queue load; the display scales
/// its load bar to this value.
pub const TASK_QUEUE_LOAD_MAX: usize = 256;

/// Free receive-queue value the display shows while the receive queue is idle.
pub const RECEIVE_QUEUE_DISPLAY_MAX: u16 = 255;

/// The status task sends one resource snapshot every this many cycles.
pub const STATUS_PERIOD_CYCLES: u32 = 64;

/// Bytes per sample-log block. Small enough that evicting one block fits
/// the outbound queue as checksummed frames.
pub const SAMPLE_BLOCK_SIZE: usize = 64;

/// SysTick frequency in Hz. Each tick services the serial port once,
/// so this must exceed the link's byte rate (115200 baud ≈ 11.5 kB/s).
pub const TICK_HZ: u32 = 16_000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
