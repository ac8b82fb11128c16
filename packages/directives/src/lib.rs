//! # Trellis Directives
//!
//! List rendering on top of the evaluator's binding layer.
//!
//! | attribute | directive |
//! |---|---|
//! | `each="item in items"` | keyed list ([`list`]) |
//! | `field-array="path"` | keyed form rows with index paths ([`field_array`]) |
//! | `virtual-list="row in rows"` | windowed keyed list ([`window`]) |
//!
//! All three share the [`reconciler`], which keeps one instance per key and
//! moves only what changed relative order. [`MountContext::mount`] walks a
//! subtree, mounts every directive site and binds the remaining interpolation
//! points.

pub mod error;
pub mod field_array;
pub mod height_index;
pub mod key;
pub mod list;
pub mod measure;
pub mod mount;
pub mod reconciler;
pub mod registry;
pub mod restore;
pub mod scheduler;
pub mod window;

#[cfg(test)]
mod tests_reconciler;

pub use error::{DirectiveError, DirectiveResult};
pub use height_index::HeightIndex;
pub use key::{assign_keys, key_tag, reset_identity_registry, KeyPolicy};
pub use list::EachBinding;
pub use measure::{MeasureError, MeasureHost, RecordingMeasureHost};
pub use mount::{apply_config, mount_subtree, MountContext, Mounted};
pub use reconciler::{
    CreateRequest, InstanceFactory, InstanceRecord, ItemMeta, KeyedItem, KeyedReconciler,
    ReconcileStats, SlotId,
};
pub use registry::{DirectiveHandler, DirectiveKind, REGISTRY};
pub use restore::{
    configure_scroll_restore, reset_scroll_restore, restored_scroll, save_scroll,
    scroll_restore_len, RestoreKey,
};
pub use scheduler::{FrameScheduler, ManualScheduler, Task, TaskHandle};
pub use window::{
    Align, RowHeight, ScrollBehavior, ScrollOptions, WindowController, WindowOptions,
};
