// pulp-routine host demo
//
// Boot: logger -> tick source -> spawn coroutines -> setup hooks
// Main loop: wait for tick -> one pass of single steps -> repeat
//
// A std thread stands in for the timer interrupt and calls
// wake::signal_tick() every DEFAULT_TICK_MS. Set PULP_CLOCK=std to
// read time from std::time instead of the tick counter, and PULP_LOG
// to error|warn|info|debug|trace.
//
// Coroutines live in StaticCells, the way they would on the target.

use core::cell::Cell;
use core::fmt;
use std::time::Duration;

use log::{Level, LevelFilter, Metadata, Record, info};
use static_cell::StaticCell;

use pulp_routine::wake::{self, DEFAULT_TICK_MS};
use pulp_routine::{
    Clock, Context, CoroutineId, Point, Routine, Scheduler, StdClock, Step, UptimeClock, resume,
};

struct StdoutLogger;

impl log::Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{:>5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

fn init_logger() {
    let level = std::env::var("PULP_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

// ═════════════════════════════════════════════════════════════════════════
// Coroutines
// ═════════════════════════════════════════════════════════════════════════

const BLINK_MS: u16 = 100;
const BLINKS: u32 = 20;

struct Blink {
    led: bool,
    toggles: u32,
}

impl Blink {
    const TOGGLE: Point = Point::new(1);

    const fn new() -> Self {
        Self {
            led: false,
            toggles: 0,
        }
    }
}

impl Routine for Blink {
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        while self.toggles < BLINKS {
            co.delay_millis(Self::TOGGLE, BLINK_MS)?;
            self.led = !self.led;
            self.toggles += 1;
            info!("led {}", if self.led { "on" } else { "off" });
        }
        co.end()
    }

    fn name(&self) -> &str {
        "blink"
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "led={} toggles={}", self.led, self.toggles)
    }

    fn setup(&mut self) {
        self.led = false;
    }
}

// pauses the blinker once, half a second in
struct Supervisor {
    blink: CoroutineId,
}

impl Supervisor {
    const SETTLE: Point = Point::new(1);
    const HOLD: Point = Point::new(2);
}

impl Routine for Supervisor {
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        resume!(co;
            delay_millis(Self::SETTLE, 500);
            {
                info!("pausing blink ({})", co.peer_status(self.blink));
                co.suspend_peer(self.blink);
            }
            delay_millis(Self::HOLD, 300);
            {
                info!("resuming blink");
                co.resume_peer(self.blink);
            }
            end;
        )
    }

    fn name(&self) -> &str {
        "supervisor"
    }
}

// reports once a second until the blinker is gone
struct Reporter<'s> {
    blink: CoroutineId,
    dispatches: &'s Cell<u32>,
}

impl Reporter<'_> {
    const REPORT: Point = Point::new(1);
}

impl Routine for Reporter<'_> {
    fn run(&mut self, co: &mut Context<'_>) -> Step {
        loop {
            co.delay_seconds(Self::REPORT, 1)?;
            info!(
                "uptime {} ms, {} dispatches",
                co.now_millis(),
                self.dispatches.get()
            );
            if co.peer_status(self.blink).is_done() {
                return co.end();
            }
        }
    }

    fn name(&self) -> &str {
        "reporter"
    }
}

static BLINK: StaticCell<Blink> = StaticCell::new();
static SUPERVISOR: StaticCell<Supervisor> = StaticCell::new();

fn run<C: Clock>(clock: C) {
    let dispatches = Cell::new(0u32);
    let listener = |id: CoroutineId, name: &str| {
        dispatches.set(dispatches.get() + 1);
        log::trace!("-> {} {}", id, name);
    };
    let mut reporter = Reporter {
        blink: CoroutineId::new(0, 0),
        dispatches: &dispatches,
    };

    let mut sched: Scheduler<'_, C, 4> = Scheduler::new(clock);
    sched.set_listener(Some(&listener));

    let blink = match sched.spawn(BLINK.init(Blink::new())) {
        Ok(id) => id,
        Err(e) => {
            log::error!("{}", e);
            return;
        }
    };
    reporter.blink = blink;
    let spawned = [
        sched.spawn(SUPERVISOR.init(Supervisor { blink })),
        sched.spawn(&mut reporter),
    ];
    if let Some(Err(e)) = spawned.iter().find(|r| r.is_err()) {
        log::error!("{}", e);
        return;
    }

    sched.setup_all();
    info!("{} coroutines up", sched.len());
    dump(&sched);

    let mut passes: u32 = 0;
    while !sched.is_empty() {
        if tick_driven() && !wake::try_wake() {
            wake::wait_for_interrupt();
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        // one visit per registered coroutine
        for _ in 0..sched.len() {
            sched.step();
        }
        passes = passes.wrapping_add(1);
        if passes % 100 == 0 {
            dump(&sched);
        }
        if !tick_driven() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    info!("all coroutines done, {} dispatches", dispatches.get());
}

fn dump<C: Clock, const N: usize>(sched: &Scheduler<'_, C, N>) {
    if !log::log_enabled!(Level::Debug) {
        return;
    }
    let mut listing = String::new();
    if sched.list(&mut listing).is_ok() {
        print!("{}", listing);
    }
}

fn tick_driven() -> bool {
    !matches!(std::env::var("PULP_CLOCK").as_deref(), Ok("std"))
}

fn main() {
    init_logger();
    info!("booting...");

    std::thread::spawn(|| {
        loop {
            std::thread::sleep(Duration::from_millis(u64::from(DEFAULT_TICK_MS)));
            wake::signal_tick();
        }
    });
    info!("tick source running ({} ms).", DEFAULT_TICK_MS);

    if tick_driven() {
        run(UptimeClock);
    } else {
        run(StdClock::new());
    }
}
