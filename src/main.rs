//! # Rover Firmware
//!
//! Boots the runtime and runs three cooperative tasks, each once per cycle:
//!
//! | Task | Work per step |
//! |------|---------------|
//! | `sample-log` | One line-sensor byte into working memory; full blocks spill over the link |
//! | `commands` | Decodes inbound frames, answers `Ping` and `StatusRequest` |
//! | `status` | Resource snapshot every `STATUS_PERIOD_CYCLES` cycles |
//!
//! USART2 is serviced from SysTick; see `arch::cortex_m4`.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use rover_rt::arch::cortex_m4;
use rover_rt::config::{SAMPLE_BLOCK_SIZE, STATUS_PERIOD_CYCLES};
use rover_rt::halt::halt;
use rover_rt::runtime::{Runtime, VehiclePages};
use rover_rt::scheduler::Scheduler;
use rover_rt::tasks::{CommandTask, SampleLogTask, StatusTask};

/// Firmware entry point. Boots the runtime, registers the tasks and
/// starts the scheduler. Does not return.
#[entry]
fn main() -> ! {
    let Some(mut cp) = cortex_m::Peripherals::take() else {
        halt(&"core peripherals already taken")
    };
    let Some(pages) = cortex_m::singleton!(: VehiclePages = VehiclePages::new()) else {
        halt(&"page pool already taken")
    };

    // PagePool → SwappableMemoryPool → ByteQueues, before any interrupt runs.
    let rt = Runtime::boot(pages, &cortex_m4::LINK);

    cortex_m4::init_usart2();
    cortex_m4::set_interrupt_priorities();
    cortex_m4::configure_systick(&mut cp.SYST);

    let mut sampler = SampleLogTask::new(SAMPLE_BLOCK_SIZE, cortex_m4::read_line_sensors);
    let mut commands = CommandTask::new();
    let mut status = StatusTask::new(STATUS_PERIOD_CYCLES);

    let mut scheduler: Scheduler<'_, Runtime<'static, fn()>> = Scheduler::new();
    scheduler.schedule_task(&mut sampler).unwrap_or_else(|err| halt(&err));
    scheduler.schedule_task(&mut commands).unwrap_or_else(|err| halt(&err));
    scheduler.schedule_task(&mut status).unwrap_or_else(|err| halt(&err));

    rt.start(&mut scheduler)
}
