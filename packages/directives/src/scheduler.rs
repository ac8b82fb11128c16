//! Frame scheduling seam.
//!
//! Windowing never re-renders synchronously from a scroll or resize event; it
//! asks a [`FrameScheduler`] for a frame callback, or a timer when frames are
//! unavailable. [`ManualScheduler`] is a deterministic host that runs queued
//! work only when told to.

use std::cell::{Cell, RefCell};
use std::fmt;

pub type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskHandle {
    Frame(u64),
    Timer(u64),
}

pub trait FrameScheduler {
    /// Whether frame-aligned callbacks are available
    fn supports_frames(&self) -> bool;

    fn request_frame(&self, task: Task) -> TaskHandle;

    fn set_timeout(&self, delay_ms: u64, task: Task) -> TaskHandle;

    fn cancel(&self, handle: TaskHandle);
}

struct Timer {
    id: u64,
    due_ms: u64,
    task: Task,
}

#[derive(Default)]
struct Queues {
    frames: Vec<(u64, Task)>,
    timers: Vec<Timer>,
}

pub struct ManualScheduler {
    frames_supported: bool,
    next_id: Cell<u64>,
    now_ms: Cell<u64>,
    queues: RefCell<Queues>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            frames_supported: true,
            next_id: Cell::new(1),
            now_ms: Cell::new(0),
            queues: RefCell::new(Queues::default()),
        }
    }

    /// A host without frame callbacks; everything goes through timers
    pub fn without_frames() -> Self {
        Self {
            frames_supported: false,
            ..Self::new()
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn pending_frames(&self) -> usize {
        self.queues.borrow().frames.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.queues.borrow().timers.len()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    /// Run the frame callbacks queued so far. Callbacks requested while the
    /// frame runs wait for the next one.
    pub fn run_frame(&self) -> usize {
        let frames = std::mem::take(&mut self.queues.borrow_mut().frames);
        let count = frames.len();
        for (_, task) in frames {
            task();
        }
        count
    }

    /// Advance the clock and run timers that came due, in due order
    pub fn advance(&self, ms: u64) -> usize {
        let now = self.now_ms.get() + ms;
        self.now_ms.set(now);

        let mut due = {
            let mut queues = self.queues.borrow_mut();
            let (due, pending): (Vec<Timer>, Vec<Timer>) = std::mem::take(&mut queues.timers)
                .into_iter()
                .partition(|timer| timer.due_ms <= now);
            queues.timers = pending;
            due
        };
        due.sort_by_key(|timer| (timer.due_ms, timer.id));

        let count = due.len();
        for timer in due {
            (timer.task)();
        }
        count
    }
}

impl FrameScheduler for ManualScheduler {
    fn supports_frames(&self) -> bool {
        self.frames_supported
    }

    fn request_frame(&self, task: Task) -> TaskHandle {
        let id = self.next_id();
        self.queues.borrow_mut().frames.push((id, task));
        TaskHandle::Frame(id)
    }

    fn set_timeout(&self, delay_ms: u64, task: Task) -> TaskHandle {
        let id = self.next_id();
        let due_ms = self.now_ms.get() + delay_ms;
        self.queues
            .borrow_mut()
            .timers
            .push(Timer { id, due_ms, task });
        TaskHandle::Timer(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut queues = self.queues.borrow_mut();
        match handle {
            TaskHandle::Frame(id) => queues.frames.retain(|(frame, _)| *frame != id),
            TaskHandle::Timer(id) => queues.timers.retain(|timer| timer.id != id),
        }
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("frames_supported", &self.frames_supported)
            .field("now_ms", &self.now_ms.get())
            .field("pending_frames", &self.pending_frames())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}
