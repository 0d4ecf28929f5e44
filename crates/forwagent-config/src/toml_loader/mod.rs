//! TOML config file loading.

mod loader;


pub use loader::{load_from_dir, load_from_path};
