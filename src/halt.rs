//! # Fatal Halt
//!
//! The one way out of the run loop. Used where continuing would put a
//! partial frame on the wire or lose evicted data: there is no supervisor
//! to restart the vehicle, so it stops and the link goes silent.

use core::fmt::Display;

/// Stop the system. **Does not return.**
///
/// On the target, interrupts are disabled first so the serial handlers stop
/// draining, then `panic-halt` parks the core. Hosted builds panic, which
/// lets tests observe the halt.
#[cold]
pub fn halt(reason: &dyn Display) -> ! {
    log::error!("fatal halt: {}", reason);

    #[cfg(feature = "firmware")]
    cortex_m::interrupt::disable();

    panic!("fatal halt: {}", reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;

    #[test]
    #[should_panic(expected = "fatal halt: eviction sink refused the evicted bytes")]
    fn test_halt_reports_reason() {
        halt(&PoolError::EvictionRejected);
    }
}
