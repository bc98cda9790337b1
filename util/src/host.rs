//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the software root directory.
///
/// The root directory contains the `params` directory and is where session
/// directories are created.
pub const SW_ROOT_ENV_VAR: &str = "SOFT_TRUNK_ROOT";

/// Get the software root directory from the environment.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
