//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the STM32F4 (Cortex-M4) vehicle controller.
//! Owns the static serial link and services USART2 from the SysTick
//! exception.
//!
//! ## Serial Service
//!
//! SysTick fires at `TICK_HZ`, faster than the link's byte rate. Each tick
//! moves at most one byte in each direction:
//!
//! ```text
//!   SysTick ──► RXNE set? ──► LINK.on_receive(DR)
//!           └─► TXE set?  ──► LINK.on_transmit_ready() ──► DR
//! ```
//!
//! A write into an idle link pends SysTick at once ([`resume_transmit`]),
//! so the first byte of a frame does not wait for the next tick.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest), so any device ISR added later can
//!   preempt the serial service.

use core::ptr::{read_volatile, write_volatile};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::link::SerialLink;
use crate::runtime::VehicleLink;

// ---------------------------------------------------------------------------
// Register map (STM32F4)
// ---------------------------------------------------------------------------

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const RCC_APB1ENR: *mut u32 = 0x4002_3840 as *mut u32;
const RCC_GPIOAEN: u32 = 1 << 0;
const RCC_USART2EN: u32 = 1 << 17;

const GPIOA_MODER: *mut u32 = 0x4002_0000 as *mut u32;
const GPIOA_IDR: *const u32 = 0x4002_0010 as *const u32;
const GPIOA_AFRL: *mut u32 = 0x4002_0020 as *mut u32;

const USART2_SR: *const u32 = 0x4000_4400 as *const u32;
const USART2_DR: *mut u32 = 0x4000_4404 as *mut u32;
const USART2_BRR: *mut u32 = 0x4000_4408 as *mut u32;
const USART2_CR1: *mut u32 = 0x4000_440C as *mut u32;

const SR_RXNE: u32 = 1 << 5;
const SR_TXE: u32 = 1 << 7;
const CR1_RE: u32 = 1 << 2;
const CR1_TE: u32 = 1 << 3;
const CR1_UE: u32 = 1 << 13;

const BAUD_RATE: u32 = 115_200;

// ---------------------------------------------------------------------------
// Serial link
// ---------------------------------------------------------------------------

/// The vehicle's only serial link, shared with the SysTick service.
pub static LINK: VehicleLink<fn()> = SerialLink::new(resume_transmit as fn());

/// Pend SysTick so the service runs as soon as the loop yields the core.
pub fn resume_transmit() {
    SCB::set_pendst();
}

/// Bring up USART2 on PA2 (TX) / PA3 (RX), 8N1 at 115200 baud.
pub fn init_usart2() {
    unsafe {
        write_volatile(RCC_AHB1ENR, read_volatile(RCC_AHB1ENR) | RCC_GPIOAEN);
        write_volatile(RCC_APB1ENR, read_volatile(RCC_APB1ENR) | RCC_USART2EN);

        // PA2/PA3: alternate function mode (0b10), AF7.
        let moder = read_volatile(GPIOA_MODER) & !(0b1111 << 4);
        write_volatile(GPIOA_MODER, moder | (0b1010 << 4));
        let afrl = read_volatile(GPIOA_AFRL) & !(0xFF << 8);
        write_volatile(GPIOA_AFRL, afrl | (0x77 << 8));

        write_volatile(USART2_BRR, (SYSTEM_CLOCK_HZ + BAUD_RATE / 2) / BAUD_RATE);
        write_volatile(USART2_CR1, CR1_UE | CR1_TE | CR1_RE);
    }
}

/// Line sensors on GPIOA[7:0], one bit per sensor.
pub fn read_line_sensors() -> u8 {
    unsafe { read_volatile(GPIOA_IDR) as u8 }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the serial service.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = read_volatile(shpr3);
        write_volatile(shpr3, val | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: one byte each way on USART2.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let sr = read_volatile(USART2_SR);

    if sr & SR_RXNE != 0 {
        let byte = read_volatile(USART2_DR) as u8;
        // Inbound full: the byte is lost, the frame decoder resyncs on checksum.
        let _ = LINK.on_receive(byte);
    }

    if sr & SR_TXE != 0 {
        if let Some(byte) = LINK.on_transmit_ready() {
            write_volatile(USART2_DR, u32::from(byte));
        }
    }
}
