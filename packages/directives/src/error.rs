use thiserror::Error;
use trellis_evaluator::{EvalFailure, NodeId};
use trellis_parser::ParseError;

pub type DirectiveResult<T> = Result<T, DirectiveError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectiveError {
    #[error("Invalid {attribute}=\"{value}\": {reason}")]
    InvalidBinding {
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("Invalid virtual list configuration: {reason}")]
    InvalidVirtualConfig { reason: String },

    #[error("Index {index} is out of range for a list of {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Node {0:?} is not a mounted virtual list container")]
    UnknownContainer(NodeId),

    #[error("Windowed list was disposed")]
    Disposed,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalFailure),
}

impl DirectiveError {
    pub fn invalid_binding(
        attribute: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DirectiveError::InvalidBinding {
            attribute: attribute.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_virtual_config(reason: impl Into<String>) -> Self {
        DirectiveError::InvalidVirtualConfig {
            reason: reason.into(),
        }
    }
}
