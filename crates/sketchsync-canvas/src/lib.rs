//! The shared drawing surface and snapshot persistence.
//!
//! The sync layer only talks to these through the [`DrawSurface`] and
//! [`SnapshotStore`] traits; [`RasterSurface`] and [`FsSnapshotStore`] are the
//! implementations the server ships with.

pub mod color;
pub mod error;
pub mod store;
pub mod surface;

pub use color::Color;
pub use error::{CanvasError, Result};
pub use store::{FsSnapshotStore, NullSnapshotStore, SnapshotInfo, SnapshotStore};
pub use surface::{DrawSurface, RasterSurface};
