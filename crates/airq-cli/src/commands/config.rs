//! Configuration file management.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::info;

use crate::config::Config;

/// Write the default configuration to `path`.
///
/// An existing file is only replaced when `force` is set.
pub fn cmd_config_init(path: &Path, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }
    Config::default().save(path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_init_writes_loadable_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("airq.toml");

        assert_eq!(cmd_config_init(&path, false).unwrap(), path);
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("airq.toml");
        std::fs::write(&path, "[sync]\nconcurrency = 4\n").unwrap();

        let err = cmd_config_init(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"), "{err}");
        assert_eq!(Config::load(&path).unwrap().sync.concurrency, 4);

        cmd_config_init(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap().sync.concurrency, 1);
    }
}
