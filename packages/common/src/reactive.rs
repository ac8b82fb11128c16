//! # Reactive primitives
//!
//! Minimal single-threaded signals and effects. The template core only consumes
//! three things from this module: a tracked read (`Signal::get`), an effect that
//! re-runs when anything it read changes (`create_effect`), and a way to stop
//! that effect (`Effect::dispose`).
//!
//! Subscriptions are tagged with the effect's run generation. Every re-run bumps
//! the generation, so reads from earlier runs go stale without back-links from
//! effects to the signals they touched.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

thread_local! {
    static OBSERVERS: RefCell<Vec<Option<Rc<EffectInner>>>> = RefCell::new(Vec::new());
}

struct EffectInner {
    run: RefCell<Box<dyn FnMut()>>,
    generation: Cell<u64>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    runs: Cell<u64>,
}

struct Subscription {
    effect: Weak<EffectInner>,
    generation: u64,
}

struct SignalInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<Subscription>>,
}

/// Observable value cell
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f.debug_tuple("Signal").field(&*value).finish(),
            Err(_) => f.write_str("Signal(<borrowed>)"),
        }
    }
}

impl<T: 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Borrow the value, subscribing the running effect
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without subscribing
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Identity comparison (same underlying cell)
    pub fn ptr_eq(&self, other: &Signal<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable address of the underlying cell
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Number of effects that would re-run on the next write
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|sub| {
                sub.effect
                    .upgrade()
                    .map(|effect| !effect.disposed.get() && effect.generation.get() == sub.generation)
                    .unwrap_or(false)
            })
            .count()
    }

    fn track(&self) {
        let Some(effect) = current_observer() else {
            return;
        };
        subscribe(&mut self.inner.subscribers.borrow_mut(), &effect, effect.generation.get());
    }

    fn notify(&self) {
        let subscribers = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        let mut retained = Vec::new();

        for sub in subscribers {
            let Some(effect) = sub.effect.upgrade() else {
                continue;
            };
            if effect.disposed.get() || effect.generation.get() != sub.generation {
                continue;
            }
            if effect.running.get() {
                // A running effect writing to something it read keeps its subscription
                retained.push(effect);
                continue;
            }
            run_effect(&effect);
        }

        if !retained.is_empty() {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            for effect in retained {
                subscribe(&mut subscribers, &effect, effect.generation.get());
            }
        }
    }

    #[cfg(test)]
    fn subscription_slots(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

/// One entry per effect: a re-run refreshes its entry's generation. Entries of
/// dropped, disposed or outdated effects are pruned before a new one is added.
fn subscribe(subscribers: &mut Vec<Subscription>, effect: &Rc<EffectInner>, generation: u64) {
    let existing = subscribers
        .iter_mut()
        .find(|sub| std::ptr::eq(sub.effect.as_ptr(), Rc::as_ptr(effect)));
    if let Some(sub) = existing {
        sub.generation = generation;
        return;
    }
    subscribers.retain(|sub| {
        sub.effect
            .upgrade()
            .map(|other| !other.disposed.get() && other.generation.get() == sub.generation)
            .unwrap_or(false)
    });
    subscribers.push(Subscription {
        effect: Rc::downgrade(effect),
        generation,
    });
}

impl<T: Clone + 'static> Signal<T> {
    /// Tracked read
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Write only when the value differs; returns whether subscribers were notified
    pub fn set_if_changed(&self, value: T) -> bool {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }
}

/// Handle to a running side effect. Dropping every handle stops the effect.
#[must_use = "dropping the Effect handle stops the effect"]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// How many times the effect body has executed
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("runs", &self.inner.runs.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Run `f` now and again whenever a signal it read changes
pub fn create_effect(f: impl FnMut() + 'static) -> Effect {
    let inner = Rc::new(EffectInner {
        run: RefCell::new(Box::new(f)),
        generation: Cell::new(0),
        running: Cell::new(false),
        disposed: Cell::new(false),
        runs: Cell::new(0),
    });
    run_effect(&inner);
    Effect { inner }
}

/// Run `f` without subscribing the surrounding effect to anything it reads
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    OBSERVERS.with(|observers| observers.borrow_mut().push(None));
    let result = f();
    OBSERVERS.with(|observers| observers.borrow_mut().pop());
    result
}

/// True while an effect body is executing and tracking reads
pub fn is_tracking() -> bool {
    current_observer().is_some()
}

fn current_observer() -> Option<Rc<EffectInner>> {
    OBSERVERS.with(|observers| observers.borrow().last().cloned().flatten())
}

fn run_effect(effect: &Rc<EffectInner>) {
    if effect.disposed.get() || effect.running.get() {
        return;
    }

    effect.generation.set(effect.generation.get() + 1);
    effect.running.set(true);
    effect.runs.set(effect.runs.get() + 1);
    OBSERVERS.with(|observers| observers.borrow_mut().push(Some(effect.clone())));

    {
        let mut run = effect.run.borrow_mut();
        (run)();
    }

    OBSERVERS.with(|observers| observers.borrow_mut().pop());
    effect.running.set(false);
}
