// Delay timers with wraparound-safe expiry
//
// Start and duration are stored as u16 in the unit of the delay kind.
// Durations are capped at half the u16 range so that
// `now.wrapping_sub(start)` stays correct across one clock wrap between
// arming and checking.

use core::fmt;

use crate::kernel::clock::Clock;

/// Longest delay, in units of the delay kind. Larger requests are clamped.
pub const DELAY_CAP: u16 = u16::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Millis,
    Micros,
    Seconds,
}

impl TimeUnit {
    /// Current time in this unit, truncated to 16 bits.
    #[inline]
    pub fn now<C: Clock + ?Sized>(self, clock: &C) -> u16 {
        let now = match self {
            TimeUnit::Millis => clock.millis(),
            TimeUnit::Micros => clock.micros(),
            TimeUnit::Seconds => clock.seconds(),
        };
        now as u16
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Millis => "ms",
            TimeUnit::Micros => "us",
            TimeUnit::Seconds => "s",
        }
    }
}

#[inline]
pub const fn clamp(duration: u16) -> u16 {
    if duration >= DELAY_CAP { DELAY_CAP } else { duration }
}

/// One armed delay. A coroutine holds at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    unit: TimeUnit,
    start: u16,
    duration: u16,
}

impl Delay {
    pub fn start<C: Clock + ?Sized>(unit: TimeUnit, duration: u16, clock: &C) -> Self {
        Self {
            unit,
            start: unit.now(clock),
            duration: clamp(duration),
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn duration(&self) -> u16 {
        self.duration
    }

    pub fn elapsed<C: Clock + ?Sized>(&self, clock: &C) -> u16 {
        self.unit.now(clock).wrapping_sub(self.start)
    }

    #[inline]
    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.elapsed(clock) >= self.duration
    }
}

// duration with unit, e.g. "250ms"
impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.duration, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::clock::FakeClock;
    use pretty_assertions::assert_eq;

    #[test]
    fn expires_across_wraparound() {
        let clock = FakeClock::new();
        clock.set_millis(65530);
        let delay = Delay::start(TimeUnit::Millis, 20, &clock);

        clock.set_millis(65540);
        assert!(!delay.is_expired(&clock));

        // 65536 + 14: the low 16 bits read 14
        clock.set_millis(65536 + 14);
        assert_eq!(delay.elapsed(&clock), 20);
        assert!(delay.is_expired(&clock));
    }

    #[test]
    fn oversized_request_is_clamped() {
        let clock = FakeClock::new();
        let delay = Delay::start(TimeUnit::Millis, 40000, &clock);
        assert_eq!(delay.duration(), 32767);

        clock.set_millis(32766);
        assert!(!delay.is_expired(&clock));
        clock.set_millis(32767);
        assert!(delay.is_expired(&clock));
    }

    #[test]
    fn clamp_boundary() {
        assert_eq!(clamp(0), 0);
        assert_eq!(clamp(DELAY_CAP - 1), DELAY_CAP - 1);
        assert_eq!(clamp(DELAY_CAP), DELAY_CAP);
        assert_eq!(clamp(u16::MAX), DELAY_CAP);
    }

    #[test]
    fn units_read_their_own_counter() {
        let clock = FakeClock::new();
        clock.set_micros(1000);
        let delay = Delay::start(TimeUnit::Micros, 50, &clock);

        clock.advance_millis(500);
        assert!(!delay.is_expired(&clock));
        clock.advance_micros(50);
        assert!(delay.is_expired(&clock));
    }

    #[test]
    fn zero_delay_is_immediately_expired() {
        let clock = FakeClock::new();
        clock.set_seconds(9);
        let delay = Delay::start(TimeUnit::Seconds, 0, &clock);
        assert!(delay.is_expired(&clock));
    }

    #[test]
    fn display_shows_duration_and_unit() {
        use std::string::ToString;

        let clock = FakeClock::new();
        assert_eq!(Delay::start(TimeUnit::Micros, 40000, &clock).to_string(), "32767us");
        assert_eq!(Delay::start(TimeUnit::Seconds, 3, &clock).to_string(), "3s");
    }
}
