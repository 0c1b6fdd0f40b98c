// Uptime tick shared between the timer ISR and the main loop
//
// The timer ISR calls signal_tick(); the main loop consumes the pending
// flag via try_wake() and idles with wait_for_interrupt() otherwise.
// Uptime is counted in milliseconds; TICK_MS is the weight of one
// interrupt and follows the timer period when it is slowed down while
// idle. Critical section guards riscv32imc (no atomic RMW).

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::kernel::clock::Clock;

/// Milliseconds per timer interrupt unless changed with [`set_tick_ms`].
pub const DEFAULT_TICK_MS: u32 = 10;

static WAKE_TICK: AtomicBool = AtomicBool::new(false);

static TICK_MS: AtomicU32 = AtomicU32::new(DEFAULT_TICK_MS);

// cs: riscv32imc has no atomic add
static UPTIME_MS: critical_section::Mutex<Cell<u32>> =
    critical_section::Mutex::new(Cell::new(0));

#[inline]
pub fn signal_tick() {
    let weight = TICK_MS.load(Ordering::Relaxed);
    critical_section::with(|cs| {
        let ms = UPTIME_MS.borrow(cs);
        ms.set(ms.get().wrapping_add(weight));
    });
    WAKE_TICK.store(true, Ordering::Release);
}

pub fn set_tick_ms(ms: u32) {
    TICK_MS.store(ms, Ordering::Release);
}

pub fn tick_ms() -> u32 {
    TICK_MS.load(Ordering::Acquire)
}

pub fn uptime_millis() -> u32 {
    critical_section::with(|cs| UPTIME_MS.borrow(cs).get())
}

pub fn uptime_secs() -> u32 {
    uptime_millis() / 1000
}

/// Consume the pending tick, if any.
pub fn try_wake() -> bool {
    critical_section::with(|_| {
        let pending = WAKE_TICK.load(Ordering::Relaxed);
        if pending {
            WAKE_TICK.store(false, Ordering::Relaxed);
        }
        pending
    })
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "riscv32"))]
    core::hint::spin_loop();
}

/// [`Clock`] over the interrupt-driven uptime counter.
///
/// Resolution is one timer tick. Micros are derived from millis, so a
/// microsecond delay shorter than a tick expires on the next tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct UptimeClock;

impl Clock for UptimeClock {
    fn millis(&self) -> u32 {
        uptime_millis()
    }

    fn micros(&self) -> u32 {
        uptime_millis().wrapping_mul(1000)
    }

    fn seconds(&self) -> u32 {
        uptime_secs()
    }
}
