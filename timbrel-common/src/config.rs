//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Catalog database file name inside the root folder
pub const DATABASE_FILE: &str = "timbrel.db";

/// Serialized cluster model file name inside the root folder
pub const MODEL_FILE: &str = "kmeans_model.json";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. TIMBREL_ROOT_FOLDER environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("TIMBREL_ROOT_FOLDER") {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = root_folder_from_config_file() {
        return path;
    }

    // Priority 4: OS-dependent default
    default_root_folder()
}

/// Read `root_folder` from the platform config file, if one exists
fn root_folder_from_config_file() -> Option<PathBuf> {
    let config_path = dirs::config_dir()?.join("timbrel").join("config.toml");
    let raw = std::fs::read_to_string(config_path).ok()?;
    let config = toml::from_str::<toml::Value>(&raw).ok()?;
    config
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("timbrel"))
        .unwrap_or_else(|| PathBuf::from("./timbrel_data"))
}

/// Resolved data root: owns the on-disk layout shared by training and serving
#[derive(Debug, Clone)]
pub struct RootFolder {
    path: PathBuf,
}

impl RootFolder {
    /// Resolve the root folder from the standard priority order
    pub fn resolve(cli_arg: Option<&Path>) -> Self {
        Self {
            path: resolve_root_folder(cli_arg),
        }
    }

    /// Create the root folder directory if missing
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.path).map_err(|e| {
            Error::Config(format!(
                "cannot create root folder {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the catalog database
    pub fn database_path(&self) -> PathBuf {
        self.path.join(DATABASE_FILE)
    }

    /// Path of the serialized cluster model
    pub fn model_path(&self) -> PathBuf {
        self.path.join(MODEL_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = RootFolder::resolve(Some(Path::new("/tmp/timbrel-test-root")));
        assert_eq!(root.path(), Path::new("/tmp/timbrel-test-root"));
        assert_eq!(
            root.database_path(),
            Path::new("/tmp/timbrel-test-root").join(DATABASE_FILE)
        );
        assert_eq!(
            root.model_path(),
            Path::new("/tmp/timbrel-test-root").join(MODEL_FILE)
        );
    }

    #[test]
    fn fallback_is_non_empty() {
        let path = default_root_folder();
        assert!(!path.as_os_str().is_empty());
    }
}
