//! Industry mode bundles: types, built-ins, store, generation, theming.

pub mod builtin;
pub mod generator;
pub mod store;
pub mod theme;
pub mod types;

pub use store::ModeStore;
pub use types::{Mode, ModeMetric, ModeTab, ModeTheme};
