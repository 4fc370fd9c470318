//! Configuration: serde schema + file loading.

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, get_data_dir, load_config, save_config};
pub use schema::Config;
