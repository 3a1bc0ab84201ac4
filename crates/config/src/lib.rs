//! Configuration loading, validation, and env substitution.
//!
//! Config files: `modgraph.toml`, `modgraph.yaml`, `modgraph.yml`, or
//! `modgraph.json`. Searched in `./` then the user config directory
//! (`~/.config/modgraph/` on Linux).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution anywhere in
//! the file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config},
    schema::{
        GraphqlConfig, ModgraphConfig, ModuleConfig, RateLimitConfig, ServerConfig,
        SessionsConfig, ThrottleConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
