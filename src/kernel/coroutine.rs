// Coroutine state block and the resumption protocol
//
// There is no stack per coroutine. The scheduler calls Routine::run()
// from the top on every dispatch, and the body jumps straight to where
// it left off. resume! lays the body out as straight-line code and
// suspension points, and skips everything before the saved marker:
//
//   const WAIT: Point = Point::new(1);
//   const TICK: Point = Point::new(2);
//
//   fn run(&mut self, co: &mut Context<'_>) -> Step {
//       resume!(co;
//           { self.ticks = 0; }            // first dispatch only
//           delay_millis(WAIT, 100);
//           [TICK] {                       // block holding a point
//               while self.ticks < 3 {
//                   co.yield_at(TICK)?;
//                   self.ticks += 1;
//               }
//           }
//           end;
//       )
//   }
//
// Every suspension idiom takes its own Point. On the way out it records
// the point as the continuation marker, sets the status and returns
// Break(Suspended). A dispatch that starts at a saved marker passes
// through every other idiom without suspending, and the idiom at the
// marker re-checks its condition or timer before letting control fall
// through. Plain statements outside resume! are not skipped and run
// again on every dispatch.
//
// A body that never reaches an idiom never returns control, and starves
// every other coroutine. Nothing detects that.

use core::fmt;
use core::num::NonZeroU16;
use core::ops::ControlFlow;

use log::warn;

use crate::kernel::clock::Clock;
use crate::kernel::delay::{Delay, TimeUnit};
use crate::kernel::scheduler::CoroutineId;
use crate::kernel::status::Status;

/// Stable identifier of one suspension point inside a body.
///
/// Zero is reserved for "start of body".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point(NonZeroU16);

impl Point {
    pub const fn new(id: u16) -> Self {
        match NonZeroU16::new(id) {
            Some(id) => Point(id),
            None => panic!("suspension point 0 is reserved for the start of the body"),
        }
    }

    #[inline]
    pub const fn id(self) -> u16 {
        self.0.get()
    }
}

/// Proof that a suspension idiom handed control back to the scheduler.
///
/// Only [`Context`] can make one, so a body cannot return early without
/// going through an idiom.
#[must_use]
#[derive(Debug)]
pub struct Suspended {
    _private: (),
}

/// What a body returns. `Continue(())` means the body ran off its end.
pub type Step = ControlFlow<Suspended>;

/// Per-coroutine bookkeeping owned by the scheduler.
#[derive(Debug, Clone)]
pub struct Coroutine {
    status: Status,
    marker: Option<Point>,
    delay: Option<Delay>,
    milestone: u16,
    // set when a dispatch starts at a saved marker; the first idiom clears it
    reentered: bool,
}

impl Default for Coroutine {
    fn default() -> Self {
        Self::new()
    }
}

impl Coroutine {
    pub const fn new() -> Self {
        Self {
            status: Status::Yielding,
            marker: None,
            delay: None,
            milestone: 0,
            reentered: false,
        }
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_suspended(&self) -> bool {
        self.status == Status::Suspended
    }

    pub fn is_yielding(&self) -> bool {
        self.status == Status::Yielding
    }

    pub fn is_delaying(&self) -> bool {
        self.status == Status::Delaying
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn is_ending(&self) -> bool {
        self.status == Status::Ending
    }

    pub fn is_terminated(&self) -> bool {
        self.status == Status::Terminated
    }

    /// Ending or Terminated.
    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    /// Saved continuation marker; `None` starts from the top.
    pub fn resume_point(&self) -> Option<Point> {
        self.marker
    }

    /// Id of the last suspension point reached, 0 before the first one.
    ///
    /// end() does not move it, so a finished coroutine still shows where
    /// it last suspended.
    pub fn milestone(&self) -> u16 {
        self.milestone
    }

    pub fn delay(&self) -> Option<&Delay> {
        self.delay.as_ref()
    }

    /// Park the coroutine. No-op once it is done.
    pub fn suspend(&mut self) {
        if self.is_done() {
            return;
        }
        self.status = Status::Suspended;
    }

    // Whatever the coroutine was doing before suspend() is dropped here,
    // including a running delay. The idiom at the saved marker restores
    // its own state on the next dispatch.
    pub fn resume(&mut self) {
        if self.status != Status::Suspended {
            return;
        }
        self.status = Status::Yielding;
        self.delay = None;
    }

    /// Start over from the top of the body on the next dispatch.
    ///
    /// State owned by the body itself is untouched.
    pub fn reset(&mut self) {
        self.status = Status::Yielding;
        self.marker = None;
        self.delay = None;
        self.reentered = false;
    }

    pub(crate) fn is_ready<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        match self.status {
            Status::Yielding => true,
            Status::Delaying => self.delay.is_none_or(|d| d.is_expired(clock)),
            _ => false,
        }
    }

    pub(crate) fn enter(&mut self) {
        self.status = Status::Running;
        self.reentered = self.marker.is_some();
    }

    /// Dispatch the body once without a scheduler, if it is ready.
    ///
    /// For a lone coroutine driven straight from a main loop. There are no
    /// peers: peer commands return `false`, peer status reads Terminated.
    pub fn run_once(&mut self, routine: &mut dyn Routine, clock: &dyn Clock) -> bool {
        if !self.is_ready(clock) {
            return false;
        }
        self.enter();
        let step = routine.run(&mut Context::new(
            CoroutineId::DETACHED,
            self,
            clock,
            &mut NoPeers,
        ));
        self.leave(step);
        true
    }

    pub(crate) fn leave(&mut self, step: Step) {
        if core::mem::take(&mut self.reentered) {
            if let Some(at) = self.marker {
                warn!("resume point {} never reached, left as {}", at.id(), self.status);
            }
        }
        match step {
            ControlFlow::Continue(()) => {
                self.status = Status::Ending;
                self.delay = None;
            }
            // a stashed Suspended token returned without an idiom: treat
            // as a yield in place
            ControlFlow::Break(_) if self.status == Status::Running => {
                self.status = Status::Yielding;
            }
            ControlFlow::Break(_) => {}
        }
    }

    pub(crate) fn terminate(&mut self) {
        self.status = Status::Terminated;
    }
}

/// A coroutine body and its description.
pub trait Routine {
    /// Run from the top, resuming at the saved marker.
    fn run(&mut self, co: &mut Context<'_>) -> Step;

    fn name(&self) -> &str {
        "?"
    }

    /// Extra column for the scheduler listing.
    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_char('-')
    }

    /// One-time hook, called by `Scheduler::setup_all()` before dispatching.
    fn setup(&mut self) {}
}

/// Routine built from a closure; see [`from_fn`].
pub struct FnRoutine<F> {
    name: &'static str,
    body: F,
}

pub fn from_fn<F>(name: &'static str, body: F) -> FnRoutine<F>
where
    F: FnMut(&mut Context<'_>) -> Step,
{
    FnRoutine { name, body }
}

impl<F> Routine for FnRoutine<F>
where
    F: FnMut(&mut Context<'_>) -> Step,
{
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        (self.body)(co)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> fmt::Debug for FnRoutine<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRoutine").field("name", &self.name).finish()
    }
}

// Access to the other registered coroutines during a dispatch. The
// running coroutine is not reachable through it.
pub(crate) trait Peers {
    fn peer_mut(&mut self, id: CoroutineId) -> Option<&mut Coroutine>;
    fn peer_status(&self, id: CoroutineId) -> Status;
}

// Peer view of a coroutine run without a scheduler.
struct NoPeers;

impl Peers for NoPeers {
    fn peer_mut(&mut self, _id: CoroutineId) -> Option<&mut Coroutine> {
        None
    }

    fn peer_status(&self, _id: CoroutineId) -> Status {
        Status::Terminated
    }
}

// How an idiom relates to the saved marker in this dispatch.
enum Reentry {
    // not a resumed dispatch, or the marker was already reached
    Fresh,
    // resumed dispatch, still before the marker
    Passing,
    // this idiom is the marker
    Landed,
}

/// Handed to [`Routine::run`]: the suspension idioms plus a view of the
/// clock and the other coroutines.
pub struct Context<'s> {
    id: CoroutineId,
    co: &'s mut Coroutine,
    clock: &'s dyn Clock,
    peers: &'s mut dyn Peers,
}

impl<'s> Context<'s> {
    pub(crate) fn new(
        id: CoroutineId,
        co: &'s mut Coroutine,
        clock: &'s dyn Clock,
        peers: &'s mut dyn Peers,
    ) -> Self {
        Self {
            id,
            co,
            clock,
            peers,
        }
    }

    pub fn id(&self) -> CoroutineId {
        self.id
    }

    pub fn resume_point(&self) -> Option<Point> {
        self.co.marker
    }

    pub fn coroutine(&self) -> &Coroutine {
        &*self.co
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock
    }

    pub fn now_millis(&self) -> u32 {
        self.clock.millis()
    }

    pub fn now_micros(&self) -> u32 {
        self.clock.micros()
    }

    pub fn now_seconds(&self) -> u32 {
        self.clock.seconds()
    }

    fn reentry(&mut self, at: Point) -> Reentry {
        if !self.co.reentered {
            return Reentry::Fresh;
        }
        if self.co.marker != Some(at) {
            return Reentry::Passing;
        }
        self.co.reentered = false;
        Reentry::Landed
    }

    fn suspend_at(&mut self, at: Point, status: Status) -> Step {
        self.co.marker = Some(at);
        self.co.milestone = at.id();
        self.co.status = status;
        ControlFlow::Break(Suspended { _private: () })
    }

    fn resumed(&mut self) -> Step {
        self.co.status = Status::Running;
        ControlFlow::Continue(())
    }

    /// Give the other coroutines a turn.
    pub fn yield_at(&mut self, at: Point) -> Step {
        match self.reentry(at) {
            Reentry::Passing => ControlFlow::Continue(()),
            Reentry::Landed => self.resumed(),
            Reentry::Fresh => self.suspend_at(at, Status::Yielding),
        }
    }

    /// Yield until `ready` holds. Falls through without yielding if it
    /// already does.
    pub fn await_until(&mut self, at: Point, ready: bool) -> Step {
        if let Reentry::Passing = self.reentry(at) {
            return ControlFlow::Continue(());
        }
        if ready {
            return self.resumed();
        }
        self.suspend_at(at, Status::Yielding)
    }

    pub fn delay_millis(&mut self, at: Point, millis: u16) -> Step {
        self.delay(at, TimeUnit::Millis, millis)
    }

    pub fn delay_micros(&mut self, at: Point, micros: u16) -> Step {
        self.delay(at, TimeUnit::Micros, micros)
    }

    pub fn delay_seconds(&mut self, at: Point, seconds: u16) -> Step {
        self.delay(at, TimeUnit::Seconds, seconds)
    }

    // Durations above DELAY_CAP are clamped. A zero delay still suspends
    // once, like a yield.
    fn delay(&mut self, at: Point, unit: TimeUnit, duration: u16) -> Step {
        match self.reentry(at) {
            Reentry::Passing => return ControlFlow::Continue(()),
            Reentry::Landed => {
                if let Some(armed) = self.co.delay.filter(|d| d.unit() == unit) {
                    if armed.is_expired(self.clock) {
                        self.co.delay = None;
                        return self.resumed();
                    }
                    return self.suspend_at(at, Status::Delaying);
                }
                // timer dropped by resume(): start it again
            }
            Reentry::Fresh => {}
        }
        self.co.delay = Some(Delay::start(unit, duration, self.clock));
        self.suspend_at(at, Status::Delaying)
    }

    /// Finish the body. The scheduler reaps it on its next visit.
    pub fn end(&mut self) -> Step {
        self.co.delay = None;
        self.co.status = Status::Ending;
        ControlFlow::Break(Suspended { _private: () })
    }

    /// Suspend another coroutine. Refuses the running one.
    pub fn suspend_peer(&mut self, id: CoroutineId) -> bool {
        self.command(id, Coroutine::suspend)
    }

    pub fn resume_peer(&mut self, id: CoroutineId) -> bool {
        self.command(id, Coroutine::resume)
    }

    pub fn reset_peer(&mut self, id: CoroutineId) -> bool {
        self.command(id, Coroutine::reset)
    }

    pub fn peer_status(&self, id: CoroutineId) -> Status {
        if id == self.id {
            return self.co.status;
        }
        self.peers.peer_status(id)
    }

    fn command(&mut self, id: CoroutineId, f: fn(&mut Coroutine)) -> bool {
        if id == self.id {
            return false;
        }
        match self.peers.peer_mut(id) {
            Some(peer) => {
                f(peer);
                true
            }
            None => false,
        }
    }
}

/// Lay out a body as plain blocks and suspension points, in order.
///
/// The first argument names the [`Context`]. Items:
///
/// - `{ ... }` runs on the way through, skipped while resuming past it;
/// - `yield_at(P);`, `await_until(P, cond);`, `delay_millis(P, n);` and the
///   other idioms, called on `co` with `?`;
/// - `[P, ..] { ... }` a block with suspension points of its own inside
///   (a loop around `co.yield_at(P)?`, say), entered when resuming at
///   any of them;
/// - `end;` finishes the body.
///
/// A dispatch that starts at a saved marker skips every item before the
/// one holding that marker. Running off the last item completes the body.
///
/// ```ignore
/// fn run(&mut self, co: &mut Context<'_>) -> Step {
///     resume!(co;
///         { self.count += 1; }
///         yield_at(A);
///         { self.count += 1; }
///         delay_millis(B, 250);
///         end;
///     )
/// }
/// ```
#[macro_export]
macro_rules! resume {
    (@items $co:ident, $m:ident, $live:ident;) => {};

    (@items $co:ident, $m:ident, $live:ident; end; $($rest:tt)*) => {
        if $live {
            return $co.end();
        }
        $crate::resume!(@items $co, $m, $live; $($rest)*);
    };

    (@items $co:ident, $m:ident, $live:ident; [$($p:expr),+ $(,)?] $body:block $($rest:tt)*) => {
        if !$live && ($($m == ::core::option::Option::Some($p))||+) {
            $live = true;
        }
        if $live {
            $body
        }
        $crate::resume!(@items $co, $m, $live; $($rest)*);
    };

    (@items $co:ident, $m:ident, $live:ident; $body:block $($rest:tt)*) => {
        if $live {
            $body
        }
        $crate::resume!(@items $co, $m, $live; $($rest)*);
    };

    (@items $co:ident, $m:ident, $live:ident; $idiom:ident($p:expr $(, $arg:expr)* $(,)?); $($rest:tt)*) => {
        if !$live && $m == ::core::option::Option::Some($p) {
            $live = true;
        }
        if $live {
            $co.$idiom($p $(, $arg)*)?;
        }
        $crate::resume!(@items $co, $m, $live; $($rest)*);
    };

    ($co:ident; $($item:tt)*) => {{
        let marker = $co.resume_point();
        #[allow(unused_mut)]
        let mut live = marker.is_none();
        $crate::resume!(@items $co, marker, live; $($item)*);
        ::core::ops::ControlFlow::Continue(())
    }};
}
