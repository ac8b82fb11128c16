pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod result;
pub mod scope;
pub mod visitor;

pub use config::*;
pub use diagnostics::*;
pub use error::*;
pub use reactive::*;
pub use result::*;
pub use scope::*;
pub use visitor::*;
