// Single-step round-robin coroutine scheduler
// NOTE: No dynamic allocation. The registry is a fixed array of slots
// threaded into a singly linked list; spawn() links at the head, the
// reap pass unlinks. Slot reuse bumps a generation so stale ids never
// reach a new coroutine.
//
// step() visits one coroutine and returns. Order is registry order, so
// the most recently spawned coroutine goes first.

use core::fmt;

use log::{debug, trace, warn};

use crate::kernel::clock::Clock;
use crate::kernel::coroutine::{Context, Coroutine, Peers, Routine};
use crate::kernel::status::Status;

/// Handle to a registered coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroutineId {
    index: u16,
    generation: u16,
}

impl CoroutineId {
    /// Id of a coroutine run without a scheduler. No registry slot has it.
    pub const DETACHED: Self = Self::new(u16::MAX, u16::MAX);

    pub const fn new(index: u16, generation: u16) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every slot is taken.
    Full { capacity: usize },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Full { capacity } => {
                write!(f, "registry full, capacity {} coroutines", capacity)
            }
        }
    }
}

impl core::error::Error for SpawnError {}

/// Outcome of one [`Scheduler::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing registered.
    Idle,
    /// Visited but not ready (suspended, or delay still running).
    Skipped(CoroutineId),
    /// Body ran once.
    Ran(CoroutineId),
    /// Was Ending; now Terminated and unlinked.
    Reaped(CoroutineId),
}

/// Observer for coroutines entering Running.
///
/// Purely advisory: it cannot change the dispatch.
pub trait Listener {
    fn on_running(&self, id: CoroutineId, name: &str);
}

impl<F> Listener for F
where
    F: Fn(CoroutineId, &str),
{
    fn on_running(&self, id: CoroutineId, name: &str) {
        self(id, name)
    }
}

struct Task<'a> {
    co: Coroutine,
    routine: &'a mut dyn Routine,
}

struct Slot<'a> {
    generation: u16,
    next: Option<usize>,
    task: Option<Task<'a>>,
}

impl<'a> Slot<'a> {
    const VACANT: Self = Self {
        generation: 0,
        next: None,
        task: None,
    };

    fn task(&self, id: CoroutineId) -> Option<&Task<'a>> {
        if self.generation != id.generation {
            return None;
        }
        self.task.as_ref()
    }

    fn task_mut(&mut self, id: CoroutineId) -> Option<&mut Task<'a>> {
        if self.generation != id.generation {
            return None;
        }
        self.task.as_mut()
    }
}

// which link points at the coroutine to visit next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Head,
    After(usize),
}

/// Read-only view of one registered coroutine, see [`Scheduler::iter`].
pub struct TaskInfo<'s> {
    id: CoroutineId,
    coroutine: &'s Coroutine,
    routine: &'s dyn Routine,
}

impl<'s> TaskInfo<'s> {
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    pub fn name(&self) -> &'s str {
        self.routine.name()
    }

    pub fn status(&self) -> Status {
        self.coroutine.status()
    }

    pub fn coroutine(&self) -> &'s Coroutine {
        self.coroutine
    }

    pub fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.routine.describe(out)
    }
}

pub struct Scheduler<'a, C: Clock, const N: usize> {
    clock: C,
    slots: [Slot<'a>; N],
    head: Option<usize>,
    cursor: Cursor,
    len: usize,
    listener: Option<&'a dyn Listener>,
}

impl<'a, C: Clock, const N: usize> Scheduler<'a, C, N> {
    pub const fn new(clock: C) -> Self {
        const { assert!(N <= u16::MAX as usize, "registry capacity must fit in u16") };
        Self {
            clock,
            slots: [const { Slot::VACANT }; N],
            head: None,
            cursor: Cursor::Head,
            len: 0,
            listener: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn set_listener(&mut self, listener: Option<&'a dyn Listener>) {
        self.listener = listener;
    }

    // register at the head of the list, status Yielding
    pub fn spawn(&mut self, routine: &'a mut dyn Routine) -> Result<CoroutineId, SpawnError> {
        let Some(index) = self.slots.iter().position(|slot| slot.task.is_none()) else {
            warn!("spawn {}: registry full ({})", routine.name(), N);
            return Err(SpawnError::Full { capacity: N });
        };

        let slot = &mut self.slots[index];
        slot.task = Some(Task {
            co: Coroutine::new(),
            routine,
        });
        slot.next = self.head;
        let id = CoroutineId::new(index as u16, slot.generation);
        self.head = Some(index);
        self.len += 1;

        debug!("spawn {} {}", id, self.name(id).unwrap_or("?"));
        Ok(id)
    }

    /// Call every coroutine's setup hook, in registry order.
    pub fn setup_all(&mut self) {
        let mut next = self.head;
        while let Some(index) = next {
            let slot = &mut self.slots[index];
            next = slot.next;
            if let Some(task) = slot.task.as_mut() {
                task.routine.setup();
            }
        }
    }

    pub fn setup(&mut self, id: CoroutineId) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.routine.setup();
                true
            }
            None => false,
        }
    }

    /// Visit exactly one coroutine.
    pub fn step(&mut self) -> Dispatch {
        let index = match self.link(self.cursor) {
            Some(index) => index,
            None => {
                // end of list: wrap around
                self.cursor = Cursor::Head;
                match self.head {
                    Some(index) => index,
                    None => return Dispatch::Idle,
                }
            }
        };

        let slot = &self.slots[index];
        let id = CoroutineId::new(index as u16, slot.generation);
        let (status, ready) = match slot.task.as_ref() {
            Some(task) => (task.co.status(), task.co.is_ready(&self.clock)),
            // linked slots are always occupied
            None => return Dispatch::Idle,
        };

        let dispatch = match status {
            Status::Ending => {
                self.reap(index);
                // cursor already points at the successor
                return Dispatch::Reaped(id);
            }
            Status::Yielding | Status::Delaying if ready => {
                self.run(index);
                Dispatch::Ran(id)
            }
            _ => Dispatch::Skipped(id),
        };
        self.cursor = Cursor::After(index);
        dispatch
    }

    /// Call [`step`](Self::step) `steps` times, returning how many bodies ran.
    pub fn run_for(&mut self, steps: usize) -> usize {
        let mut ran = 0;
        for _ in 0..steps {
            if let Dispatch::Ran(_) = self.step() {
                ran += 1;
            }
        }
        ran
    }

    fn run(&mut self, index: usize) {
        let listener = self.listener;
        let clock: &dyn Clock = &self.clock;
        let (before, rest) = self.slots.split_at_mut(index);
        let Some((current, after)) = rest.split_first_mut() else {
            return;
        };
        let id = CoroutineId::new(index as u16, current.generation);
        let Some(task) = current.task.as_mut() else {
            return;
        };

        task.co.enter();
        trace!("run {} {} at {:?}", id, task.routine.name(), task.co.resume_point());
        if let Some(listener) = listener {
            listener.on_running(id, task.routine.name());
        }

        let mut peers = SlotPeers {
            before,
            after,
            index,
        };
        let step = task
            .routine
            .run(&mut Context::new(id, &mut task.co, clock, &mut peers));
        task.co.leave(step);
    }

    fn reap(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let next = slot.next.take();
        if let Some(mut task) = slot.task.take() {
            task.co.terminate();
            debug!(
                "reap #{}.{} {}: {}",
                index,
                slot.generation,
                task.routine.name(),
                task.co.status()
            );
        }
        slot.generation = slot.generation.wrapping_add(1);

        match self.cursor {
            Cursor::Head => self.head = next,
            Cursor::After(prev) => self.slots[prev].next = next,
        }
        self.len -= 1;
    }

    fn link(&self, cursor: Cursor) -> Option<usize> {
        match cursor {
            Cursor::Head => self.head,
            Cursor::After(prev) => self.slots[prev].next,
        }
    }

    fn task(&self, id: CoroutineId) -> Option<&Task<'a>> {
        self.slots.get(id.index())?.task(id)
    }

    fn task_mut(&mut self, id: CoroutineId) -> Option<&mut Task<'a>> {
        self.slots.get_mut(id.index())?.task_mut(id)
    }

    // Commands return false for ids that are no longer registered.

    pub fn suspend(&mut self, id: CoroutineId) -> bool {
        self.task_mut(id).map(|task| task.co.suspend()).is_some()
    }

    pub fn resume(&mut self, id: CoroutineId) -> bool {
        self.task_mut(id).map(|task| task.co.resume()).is_some()
    }

    pub fn reset(&mut self, id: CoroutineId) -> bool {
        self.task_mut(id).map(|task| task.co.reset()).is_some()
    }

    /// Status of `id`; reaped coroutines report Terminated.
    pub fn status(&self, id: CoroutineId) -> Status {
        self.task(id)
            .map_or(Status::Terminated, |task| task.co.status())
    }

    pub fn coroutine(&self, id: CoroutineId) -> Option<&Coroutine> {
        self.task(id).map(|task| &task.co)
    }

    pub fn name(&self, id: CoroutineId) -> Option<&str> {
        self.task(id).map(|task| task.routine.name())
    }

    /// Registered coroutines in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = TaskInfo<'_>> + '_ {
        let mut next = self.head;
        core::iter::from_fn(move || {
            let index = next?;
            let slot = &self.slots[index];
            next = slot.next;
            let task = slot.task.as_ref()?;
            Some(TaskInfo {
                id: CoroutineId::new(index as u16, slot.generation),
                coroutine: &task.co,
                routine: &*task.routine,
            })
        })
    }

    /// One line per coroutine: id, name, short status, last milestone,
    /// armed delay if any, extra.
    pub fn list<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for info in self.iter() {
            let co = info.coroutine();
            write!(
                out,
                "{} {}: {} milestone={} ",
                info.id(),
                info.name(),
                info.status().short(),
                co.milestone()
            )?;
            if let Some(delay) = co.delay() {
                write!(out, "delay={} ", delay)?;
            }
            info.describe(out)?;
            out.write_char('\n')?;
        }
        Ok(())
    }
}

// The registry split around the running slot.
struct SlotPeers<'p, 'a> {
    before: &'p mut [Slot<'a>],
    after: &'p mut [Slot<'a>],
    index: usize,
}

impl<'a> SlotPeers<'_, 'a> {
    fn slot(&self, index: usize) -> Option<&Slot<'a>> {
        match index.cmp(&self.index) {
            core::cmp::Ordering::Less => self.before.get(index),
            core::cmp::Ordering::Equal => None,
            core::cmp::Ordering::Greater => self.after.get(index - self.index - 1),
        }
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut Slot<'a>> {
        match index.cmp(&self.index) {
            core::cmp::Ordering::Less => self.before.get_mut(index),
            core::cmp::Ordering::Equal => None,
            core::cmp::Ordering::Greater => self.after.get_mut(index - self.index - 1),
        }
    }
}

impl Peers for SlotPeers<'_, '_> {
    fn peer_mut(&mut self, id: CoroutineId) -> Option<&mut Coroutine> {
        let task = self.slot_mut(id.index())?.task_mut(id)?;
        Some(&mut task.co)
    }

    fn peer_status(&self, id: CoroutineId) -> Status {
        self.slot(id.index())
            .and_then(|slot| slot.task(id))
            .map_or(Status::Terminated, |task| task.co.status())
    }
}
