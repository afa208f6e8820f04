//! Temp folder and resource path resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CmoError, Result};

/// Folder created under the system temp directory.
const UNIQUE_FOLDER: &str = "cmo-format";

/// Locates extracted and external files.
#[derive(Debug, Clone)]
pub struct PathManager {
    temp_folder: PathBuf,
    extra_paths: Vec<PathBuf>,
}

impl PathManager {
    /// Create a manager using `<system temp>/cmo-format`, creating it if
    /// missing.
    pub fn new() -> Result<Self> {
        let temp_folder = std::env::temp_dir().join(UNIQUE_FOLDER);
        fs::create_dir_all(&temp_folder)?;
        Ok(Self {
            temp_folder,
            extra_paths: Vec::new(),
        })
    }

    #[must_use]
    pub fn temp_folder(&self) -> &Path {
        &self.temp_folder
    }

    /// Use an existing directory as the temp folder.
    pub fn set_temp_folder(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CmoError::invalid_parameter(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        self.temp_folder = dir.to_path_buf();
        Ok(())
    }

    /// Path of `name` inside the temp folder.
    #[must_use]
    pub fn temp_file_path(&self, name: &str) -> PathBuf {
        self.temp_folder.join(name)
    }

    /// Add an existing directory to the resource search list.
    pub fn add_path(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CmoError::invalid_parameter(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        self.extra_paths.push(dir.to_path_buf());
        Ok(())
    }

    pub fn clear_paths(&mut self) {
        self.extra_paths.clear();
    }

    #[must_use]
    pub fn extra_paths(&self) -> &[PathBuf] {
        &self.extra_paths
    }

    /// Find a file by name.
    ///
    /// Absolute paths are returned as is. Relative names are looked up in
    /// the temp folder, then in each extra path in insertion order.
    #[must_use]
    pub fn resolve_file_name(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        std::iter::once(&self.temp_folder)
            .chain(&self.extra_paths)
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }
}
