/// Filesystem layout under the managed data root
///
/// Everything the manager touches lives below one root directory:
/// `<root>/sources` (working tree), `<root>/archives` (source snapshots),
/// `<root>/binaries` (binary snapshots).
use std::path::{Path, PathBuf};

/// Directory name of the checked-out working tree
pub const SOURCES_DIR_NAME: &str = "sources";

/// Layout of the managed data root
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root; parent directory of the working tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The single mutable working tree
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR_NAME)
    }

    /// Source snapshot archives
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    /// Compiled binary archives
    pub fn binaries_dir(&self) -> PathBuf {
        self.root.join("binaries")
    }
}

/// Default data root for the current platform
///
/// - Windows: %LOCALAPPDATA%\sourcekeeper
/// - macOS: ~/Library/Application Support/sourcekeeper
/// - Linux/Unix: $XDG_DATA_HOME/sourcekeeper or ~/.local/share/sourcekeeper
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sourcekeeper")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/data");
        assert_eq!(layout.sources_dir(), PathBuf::from("/data/sources"));
        assert_eq!(layout.archives_dir(), PathBuf::from("/data/archives"));
        assert_eq!(layout.binaries_dir(), PathBuf::from("/data/binaries"));
    }

    #[test]
    fn test_default_data_dir_non_empty() {
        let dir = default_data_dir();
        assert!(dir.to_string_lossy().contains("sourcekeeper"));
    }
}
