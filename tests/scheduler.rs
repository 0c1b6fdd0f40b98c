use core::cell::Cell;

use pretty_assertions::assert_eq;
use pulp_routine::{
    Context, Dispatch, FakeClock, Point, Routine, Scheduler, Status, Step, from_fn, resume,
};

const TICK: Point = Point::new(1);
const WAIT: Point = Point::new(2);

// yields three times, then ends
struct Counter<'c> {
    ticks: u32,
    runs: &'c Cell<u32>,
}

impl Routine for Counter<'_> {
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        self.runs.set(self.runs.get() + 1);
        resume!(co;
            { self.ticks = 0; }
            [TICK] {
                while self.ticks < 3 {
                    co.yield_at(TICK)?;
                    self.ticks += 1;
                }
            }
            end;
        )
    }

    fn name(&self) -> &str {
        "counter"
    }
}

// one delay, then ends
struct Sleeper<'c> {
    millis: u16,
    runs: &'c Cell<u32>,
    starts: &'c Cell<u32>,
}

impl Routine for Sleeper<'_> {
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        self.runs.set(self.runs.get() + 1);
        resume!(co;
            { self.starts.set(self.starts.get() + 1); }
            delay_millis(WAIT, self.millis);
            end;
        )
    }

    fn name(&self) -> &str {
        "sleeper"
    }
}

#[test]
fn fresh_coroutines_are_yielding() {
    let clock = FakeClock::new();
    let runs = Cell::new(0);
    let mut a = Counter { ticks: 0, runs: &runs };
    let mut b = from_fn("b", |co| co.end());
    let mut sched: Scheduler<'_, _, 4> = Scheduler::new(&clock);

    let a = sched.spawn(&mut a).unwrap();
    let b = sched.spawn(&mut b).unwrap();
    assert_eq!(sched.status(a), Status::Yielding);
    assert_eq!(sched.status(b), Status::Yielding);
    assert_eq!(sched.len(), 2);
}

#[test]
fn straight_line_body_walks_forward_to_terminated() {
    let clock = FakeClock::new();
    let mut line = from_fn("line", |co| {
        co.yield_at(TICK)?;
        co.yield_at(WAIT)?;
        co.end()
    });
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut line).unwrap();

    let mut milestones = Vec::new();
    let mut dispatches = Vec::new();
    for _ in 0..5 {
        dispatches.push(sched.step());
        milestones.push(sched.coroutine(id).map(|co| co.milestone()));
    }

    assert_eq!(
        dispatches,
        [
            Dispatch::Ran(id),
            Dispatch::Ran(id),
            Dispatch::Ran(id),
            Dispatch::Reaped(id),
            Dispatch::Idle,
        ]
    );
    assert_eq!(milestones, [Some(1), Some(2), Some(2), None, None]);
    assert_eq!(sched.status(id), Status::Terminated);
}

#[test]
fn statement_before_the_first_point_is_not_replayed() {
    let clock = FakeClock::new();
    let hits = Cell::new(0);
    let mut body = from_fn("hits", |co| {
        resume!(co;
            { hits.set(hits.get() + 1); }
            yield_at(TICK);
            end;
        )
    });
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut body).unwrap();

    sched.run_for(2);
    assert_eq!(hits.get(), 1);
    assert_eq!(sched.status(id), Status::Ending);
}

#[test]
fn delay_survives_clock_wraparound() {
    let clock = FakeClock::new();
    clock.set_millis(65530);
    let runs = Cell::new(0);
    let starts = Cell::new(0);
    let mut sleeper = Sleeper { millis: 20, runs: &runs, starts: &starts };
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut sleeper).unwrap();

    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(sched.status(id), Status::Delaying);

    clock.set_millis(65549);
    assert_eq!(sched.step(), Dispatch::Skipped(id));

    clock.set_millis(14);
    let delay = *sched.coroutine(id).unwrap().delay().unwrap();
    assert!(delay.elapsed(&clock) >= 20);
    assert!(delay.is_expired(&clock));
    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(sched.status(id), Status::Ending);
}

#[test]
fn resume_lands_in_yielding_and_restarts_the_delay() {
    let clock = FakeClock::new();
    let runs = Cell::new(0);
    let starts = Cell::new(0);
    let mut sleeper = Sleeper { millis: 1000, runs: &runs, starts: &starts };
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut sleeper).unwrap();

    sched.step();
    assert_eq!(sched.status(id), Status::Delaying);

    clock.set_millis(500);
    assert!(sched.suspend(id));
    assert_eq!(sched.status(id), Status::Suspended);
    assert_eq!(sched.step(), Dispatch::Skipped(id));

    assert!(sched.resume(id));
    assert_eq!(sched.status(id), Status::Yielding);

    // past the first deadline, but the timer starts over
    clock.set_millis(1100);
    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(sched.status(id), Status::Delaying);
    assert_eq!(sched.coroutine(id).unwrap().resume_point(), Some(WAIT));

    clock.set_millis(2099);
    assert_eq!(sched.step(), Dispatch::Skipped(id));
    clock.set_millis(2100);
    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(sched.status(id), Status::Ending);

    // the top of the body ran only once
    assert_eq!(starts.get(), 1);
    assert_eq!(runs.get(), 3);
}

#[test]
fn suspend_resume_from_yielding() {
    let clock = FakeClock::new();
    let runs = Cell::new(0);
    let mut counter = Counter { ticks: 0, runs: &runs };
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut counter).unwrap();

    sched.step();
    assert!(sched.suspend(id));
    assert!(sched.resume(id));
    assert_eq!(sched.status(id), Status::Yielding);
}

#[test]
fn reset_while_delaying_restarts_from_the_top() {
    let clock = FakeClock::new();
    let runs = Cell::new(0);
    let starts = Cell::new(0);
    let mut sleeper = Sleeper { millis: 300, runs: &runs, starts: &starts };
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut sleeper).unwrap();

    sched.step();
    assert_eq!(sched.status(id), Status::Delaying);
    assert_eq!(starts.get(), 1);

    assert!(sched.reset(id));
    assert_eq!(sched.status(id), Status::Yielding);
    assert_eq!(sched.coroutine(id).unwrap().resume_point(), None);

    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(starts.get(), 2);
    assert_eq!(sched.status(id), Status::Delaying);
}

#[test]
fn clamped_delay_flips_at_the_cap() {
    let clock = FakeClock::new();
    let runs = Cell::new(0);
    let starts = Cell::new(0);
    let mut sleeper = Sleeper { millis: 40000, runs: &runs, starts: &starts };
    let mut sched: Scheduler<'_, _, 1> = Scheduler::new(&clock);
    let id = sched.spawn(&mut sleeper).unwrap();

    sched.step();
    assert_eq!(sched.coroutine(id).unwrap().delay().unwrap().duration(), 32767);

    clock.set_millis(32766);
    assert_eq!(sched.step(), Dispatch::Skipped(id));
    clock.set_millis(32767);
    assert_eq!(sched.step(), Dispatch::Ran(id));
    assert_eq!(sched.status(id), Status::Ending);
}

#[test]
fn yielder_and_sleeper_both_terminate() {
    let clock = FakeClock::new();
    let counter_runs = Cell::new(0);
    let sleeper_runs = Cell::new(0);
    let starts = Cell::new(0);
    let mut a = Counter { ticks: 0, runs: &counter_runs };
    let mut b = Sleeper { millis: 100, runs: &sleeper_runs, starts: &starts };
    let mut sched: Scheduler<'_, _, 2> = Scheduler::new(&clock);
    let a = sched.spawn(&mut a).unwrap();
    let b = sched.spawn(&mut b).unwrap();

    let mut steps = 0;
    while !sched.is_empty() {
        sched.step();
        clock.advance_millis(10);
        steps += 1;
        assert!(steps < 1000, "scheduler never drained");
    }

    assert_eq!(sched.len(), 0);
    assert_eq!(sched.status(a), Status::Terminated);
    assert_eq!(sched.status(b), Status::Terminated);
    assert_eq!(counter_runs.get(), 4);
    assert_eq!(sleeper_runs.get(), 2);
    assert!(counter_runs.get() > sleeper_runs.get());
}

#[test]
fn a_body_can_pause_another() {
    const PAUSE: Point = Point::new(1);
    const BLINK: Point = Point::new(1);

    let clock = FakeClock::new();
    let blinks = Cell::new(0);
    let target = Cell::new(None);

    let mut blinker = from_fn("blinker", |co| loop {
        co.delay_millis(BLINK, 10)?;
        blinks.set(blinks.get() + 1);
    });
    let mut pauser = from_fn("pauser", |co| {
        co.delay_millis(PAUSE, 35)?;
        if let Some(id) = target.get() {
            co.suspend_peer(id);
        }
        co.end()
    });
    let mut sched: Scheduler<'_, _, 2> = Scheduler::new(&clock);
    let blinker = sched.spawn(&mut blinker).unwrap();
    target.set(Some(blinker));
    sched.spawn(&mut pauser).unwrap();

    for _ in 0..100 {
        sched.step();
        clock.advance_millis(1);
    }

    assert_eq!(sched.status(blinker), Status::Suspended);
    assert_eq!(sched.len(), 1);
    let paused_at = blinks.get();
    assert!(paused_at >= 3);

    assert!(sched.resume(blinker));
    for _ in 0..20 {
        sched.step();
        clock.advance_millis(1);
    }
    assert!(blinks.get() > paused_at);
}
