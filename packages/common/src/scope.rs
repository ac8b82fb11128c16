//! Lifetime scopes: cleanup callbacks tied to an enclosing lifetime.

use crate::reactive::Effect;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Default)]
struct ScopeInner {
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Scope>>,
    // Child count that triggers the next sweep of disposed children
    prune_at: Cell<usize>,
    disposed: Cell<bool>,
}

const MIN_PRUNE_AT: usize = 16;

/// Owner of cleanup callbacks. Disposing a scope disposes its children first,
/// then runs its own cleanups in reverse registration order, exactly once.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope disposed together with this one
    pub fn child(&self) -> Scope {
        let child = Scope::new();
        if self.is_disposed() {
            child.dispose();
            return child;
        }
        let mut children = self.inner.children.borrow_mut();
        if children.len() >= self.inner.prune_at.get() {
            children.retain(|existing| !existing.is_disposed());
            self.inner
                .prune_at
                .set((children.len() * 2).max(MIN_PRUNE_AT));
        }
        children.push(child.clone());
        child
    }

    /// Register a cleanup; runs immediately if the scope is already disposed
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        if self.is_disposed() {
            cleanup();
            return;
        }
        self.inner.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Keep an effect alive until this scope is disposed
    pub fn own_effect(&self, effect: Effect) {
        self.on_cleanup(move || effect.dispose());
    }

    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children.iter().rev() {
            child.dispose();
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cleanups", &self.cleanup_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
