//! forwagent configuration.
//!
//! Configuration is read once at startup from `~/.forwagent/config.toml`
//! (every section is optional and defaulted), combined with the few
//! environment-derived locations in [`RuntimePaths`], and then passed by
//! reference to everything that needs a path. Nothing below the binaries
//! consults the environment on its own.

pub mod paths;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use paths::{default_conf_dir, RuntimePaths, CONFIG_FILE_NAME};
pub use schema::{ClientConfig, ForwagentConfig, ServerConfig, TunnelConfig, DEFAULT_ADDRESS};
pub use toml_loader::{load_from_dir, load_from_path};
