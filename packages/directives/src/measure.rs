//! Row measurement seam.
//!
//! A host observes the box size of rendered rows and reports changes back to
//! the windowed list. Hosts without observation support return
//! [`MeasureError::Unsupported`], and the list keeps using estimated heights.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use thiserror::Error;
use trellis_evaluator::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasureError {
    #[error("Size observation is not supported by this host")]
    Unsupported,

    #[error("Failed to observe node {node:?}: {message}")]
    Failed { node: NodeId, message: String },
}

pub trait MeasureHost {
    fn observe(&self, node: NodeId) -> Result<(), MeasureError>;

    fn unobserve(&self, node: NodeId);

    fn disconnect(&self);
}

/// Host that records which nodes are observed
#[derive(Debug)]
pub struct RecordingMeasureHost {
    supported: bool,
    observed: RefCell<BTreeSet<NodeId>>,
    disconnects: Cell<usize>,
}

impl Default for RecordingMeasureHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMeasureHost {
    pub fn new() -> Self {
        Self {
            supported: true,
            observed: RefCell::new(BTreeSet::new()),
            disconnects: Cell::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn observed(&self) -> Vec<NodeId> {
        self.observed.borrow().iter().copied().collect()
    }

    pub fn is_observed(&self, node: NodeId) -> bool {
        self.observed.borrow().contains(&node)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.get()
    }
}

impl MeasureHost for RecordingMeasureHost {
    fn observe(&self, node: NodeId) -> Result<(), MeasureError> {
        if !self.supported {
            return Err(MeasureError::Unsupported);
        }
        self.observed.borrow_mut().insert(node);
        Ok(())
    }

    fn unobserve(&self, node: NodeId) {
        self.observed.borrow_mut().remove(&node);
    }

    fn disconnect(&self) {
        self.observed.borrow_mut().clear();
        self.disconnects.set(self.disconnects.get() + 1);
    }
}
