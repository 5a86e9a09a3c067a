//! Data-file loading for grid configuration.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, Format, load_grid_config};
