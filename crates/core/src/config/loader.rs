//! Config path resolution
//!
//! Handles resolving the config file path from the host executable's location.

use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigResult};

/// Returns the directory holding the host executable.
///
/// The layer is loaded into the host process, so `current_exe` is the host,
/// not this library.
pub fn host_dir() -> ConfigResult<PathBuf> {
    let exe = std::env::current_exe().map_err(ConfigError::IoError)?;

    exe.parent()
        .map(PathBuf::from)
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the config file path below `base`.
///
/// Path: `{base}/addons/framehook/framehook.toml`
pub fn config_path_in(base: &Path) -> PathBuf {
    base.join("addons").join("framehook").join("framehook.toml")
}

/// Returns the config file path next to the host executable.
pub fn config_path() -> ConfigResult<PathBuf> {
    Ok(config_path_in(&host_dir()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_format() {
        let path = config_path_in(Path::new("/games/host"));
        assert!(path.ends_with("addons/framehook/framehook.toml"));
        assert!(path.starts_with("/games/host"));
    }

    #[test]
    fn test_host_dir_resolves() {
        let dir = host_dir().unwrap();
        assert!(dir.is_dir());
    }
}
