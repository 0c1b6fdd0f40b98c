// Cooperative coroutine kernel
// Single core, no preemption, no heap. Every coroutine body is re-entered
// from the top on each dispatch and jumps to its saved suspension point.
//
// step() runs exactly one registered coroutine per call; the host main
// loop calls it forever, optionally idling on wake::wait_for_interrupt()
// between uptime ticks.

pub mod clock;
pub mod coroutine;
pub mod delay;
pub mod scheduler;
pub mod status;
pub mod wake;

pub use clock::{Clock, FakeClock};
pub use coroutine::{Context, Coroutine, FnRoutine, Point, Routine, Step, Suspended, from_fn};
pub use delay::{DELAY_CAP, Delay, TimeUnit};
pub use scheduler::{CoroutineId, Dispatch, Listener, Scheduler, SpawnError, TaskInfo};
pub use status::Status;
pub use wake::UptimeClock;

#[cfg(feature = "std")]
pub use clock::StdClock;

#[cfg(feature = "embassy")]
pub use clock::EmbassyClock;
