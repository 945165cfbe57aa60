//! Data-directory resolution.

use std::path::PathBuf;

/// Environment override for the data directory (also read from `.env`).
pub const DATA_DIR_ENV: &str = "ITEMHUB_DATA_DIR";

/// Where the store and the search indexes live on disk.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub db_path: PathBuf,
    pub index_dir: PathBuf,
}

impl DataPaths {
    /// Resolution order: explicit override, `ITEMHUB_DATA_DIR`, platform
    /// data dir.
    pub fn resolve(override_dir: Option<PathBuf>) -> Self {
        let data_dir = override_dir
            .or_else(|| dotenvy::var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        Self::in_dir(data_dir)
    }

    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join("itemhub.db"),
            index_dir: data_dir.join("index"),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "itemhub", "itemhub")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".itemhub"))
}
