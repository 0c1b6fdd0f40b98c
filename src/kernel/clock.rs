// Time sources for delay expiry
//
// A Clock answers "now" in three granularities. Values are free-running
// and wrap; the delay arithmetic only ever looks at the low 16 bits.
// FakeClock is driven by hand from tests, the real clocks come from the
// uptime tick (wake.rs), std::time or embassy-time.

use core::cell::Cell;

pub trait Clock {
    fn millis(&self) -> u32;
    fn micros(&self) -> u32;
    fn seconds(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    #[inline]
    fn millis(&self) -> u32 {
        (**self).millis()
    }

    #[inline]
    fn micros(&self) -> u32 {
        (**self).micros()
    }

    #[inline]
    fn seconds(&self) -> u32 {
        (**self).seconds()
    }
}

/// Manually driven clock.
///
/// The three counters are independent, so a test can exercise one delay
/// kind without the others moving. Share it with a scheduler by reference:
/// `Scheduler::new(&clock)`.
#[derive(Debug, Default)]
pub struct FakeClock {
    millis: Cell<u32>,
    micros: Cell<u32>,
    seconds: Cell<u32>,
}

impl FakeClock {
    pub const fn new() -> Self {
        Self {
            millis: Cell::new(0),
            micros: Cell::new(0),
            seconds: Cell::new(0),
        }
    }

    pub fn set_millis(&self, now: u32) {
        self.millis.set(now);
    }

    pub fn set_micros(&self, now: u32) {
        self.micros.set(now);
    }

    pub fn set_seconds(&self, now: u32) {
        self.seconds.set(now);
    }

    pub fn advance_millis(&self, delta: u32) {
        self.millis.set(self.millis.get().wrapping_add(delta));
    }

    pub fn advance_micros(&self, delta: u32) {
        self.micros.set(self.micros.get().wrapping_add(delta));
    }

    pub fn advance_seconds(&self, delta: u32) {
        self.seconds.set(self.seconds.get().wrapping_add(delta));
    }
}

impl Clock for FakeClock {
    fn millis(&self) -> u32 {
        self.millis.get()
    }

    fn micros(&self) -> u32 {
        self.micros.get()
    }

    fn seconds(&self) -> u32 {
        self.seconds.get()
    }
}

/// Host clock measured from the moment it was created.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn millis(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    fn micros(&self) -> u32 {
        self.origin.elapsed().as_micros() as u32
    }

    fn seconds(&self) -> u32 {
        self.origin.elapsed().as_secs() as u32
    }
}

// embassy-time keeps a 64-bit tick count; truncation is fine since the
// delay code wraps anyway
#[cfg(feature = "embassy")]
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

#[cfg(feature = "embassy")]
impl Clock for EmbassyClock {
    fn millis(&self) -> u32 {
        embassy_time::Instant::now().as_millis() as u32
    }

    fn micros(&self) -> u32 {
        embassy_time::Instant::now().as_micros() as u32
    }

    fn seconds(&self) -> u32 {
        embassy_time::Instant::now().as_secs() as u32
    }
}
