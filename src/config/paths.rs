use crate::{Result, TheiaError};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Default locations of checkouts and stored artifacts
#[derive(Debug, Clone)]
pub struct TheiaPaths {
    /// Library checkouts, one directory per library
    pub git_dir: PathBuf,
    /// Root of the local artifact store
    pub storage_dir: PathBuf,
}

impl TheiaPaths {
    /// Paths under the platform's data directory
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "theia").ok_or_else(|| {
            TheiaError::Config("Failed to determine project directories".to_string())
        })?;
        Ok(Self::under(dirs.data_dir()))
    }

    /// Paths under an arbitrary root
    pub fn under(root: &Path) -> Self {
        Self {
            git_dir: root.join("git"),
            storage_dir: root.join("storage"),
        }
    }

    /// Checkout directory of `library`
    pub fn checkout(git_dir: &Path, library: &str) -> PathBuf {
        git_dir.join(library)
    }
}

impl Default for TheiaPaths {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| {
            // Fall back to the current directory if platform directories fail
            let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self::under(&current_dir.join(".theia"))
        })
    }
}
