//! Cache location detection.
//!
//! Path resolution is driven by environment variables rather than platform
//! APIs so the same logic runs (and is testable) everywhere; on a real
//! Windows machine `LOCALAPPDATA` and `TEMP` are always present.

use std::env;
use std::path::{Path, PathBuf};

/// UWP package directory fragment for the Microsoft Store client.
pub const UWP_PACKAGE: &str = "ROBLOXCORPORATION.ROBLOX_55nm5eh3cm0pr";

/// Which backend a location points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanBackend {
    /// SQLite `rbx-storage.db` plus companion folder
    Database,
    /// Flat directory of cache files
    FileSystem,
}

/// A resolved cache input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocation {
    /// Database file or cache directory
    pub path: PathBuf,
    /// Backend the path selects
    pub backend: ScanBackend,
    /// Companion blob folder (database backend only)
    pub db_folder: PathBuf,
}

impl CacheLocation {
    /// A database-backed location.
    pub fn database(path: impl Into<PathBuf>, db_folder: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backend: ScanBackend::Database,
            db_folder: db_folder.into(),
        }
    }

    /// A flat-directory location.
    pub fn file_system(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backend: ScanBackend::FileSystem,
            db_folder: PathBuf::new(),
        }
    }

    /// Whether the location currently points at something usable.
    pub fn is_valid(&self) -> bool {
        match self.backend {
            ScanBackend::Database => self.path.is_file(),
            ScanBackend::FileSystem => self.path.is_dir(),
        }
    }
}

fn local_app_data() -> Option<PathBuf> {
    env::var_os("LOCALAPPDATA").map(PathBuf::from)
}

fn temp_dir() -> Option<PathBuf> {
    env::var_os("TEMP").map(PathBuf::from)
}

/// Standard-client database path, when `LOCALAPPDATA` is set.
pub fn standard_database() -> Option<PathBuf> {
    local_app_data().map(|base| base.join("Roblox").join("rbx-storage.db"))
}

/// UWP-client cache directory, when `LOCALAPPDATA` is set.
pub fn uwp_cache_dir() -> Option<PathBuf> {
    local_app_data().map(|base| {
        base.join("Packages")
            .join(UWP_PACKAGE)
            .join("LocalState")
            .join("http")
    })
}

/// Temp-directory cache fallback, when `TEMP` is set.
pub fn temp_cache_dir() -> Option<PathBuf> {
    temp_dir().map(|base| base.join("Roblox").join("http"))
}

/// Resolve the default cache location.
///
/// The standard client's database wins when present (also when both client
/// flavors are installed); next the UWP directory; finally the temp
/// directory, which may not exist yet.
pub fn detect_default() -> CacheLocation {
    if let Some(db) = standard_database() {
        if db.is_file() {
            let folder = db.with_extension("");
            tracing::debug!(path = %db.display(), "using standard client cache database");
            return CacheLocation::database(db, folder);
        }
    }

    if let Some(uwp) = uwp_cache_dir() {
        if uwp.is_dir() {
            tracing::debug!(path = %uwp.display(), "using UWP client cache directory");
            return CacheLocation::file_system(uwp);
        }
    }

    let fallback = temp_cache_dir().unwrap_or_else(|| PathBuf::from("Roblox/http"));
    tracing::debug!(path = %fallback.display(), "no client cache detected, using temp fallback");
    CacheLocation::file_system(fallback)
}

/// Resolve a user-supplied cache path.
///
/// A `*.db` file is scanned as a database with its companion folder derived
/// from the file name; a directory named `rbx-storage` with a sibling
/// `rbx-storage.db` prefers the database; any other directory is scanned as
/// a flat tree.
pub fn resolve_custom(path: &Path) -> CacheLocation {
    if path.extension().is_some_and(|ext| ext == "db") && path.is_file() {
        return CacheLocation::database(path, path.with_extension(""));
    }

    if path.file_name().is_some_and(|name| name == "rbx-storage") && path.is_dir() {
        let mut db = path.as_os_str().to_owned();
        db.push(".db");
        let db = PathBuf::from(db);
        if db.is_file() {
            return CacheLocation::database(db, path);
        }
    }

    CacheLocation::file_system(path)
}

/// Fallback directories to try when the database backend is unusable, in
/// priority order: the temp cache, the companion folder next to the
/// database, then the UWP directory.
pub fn fallback_candidates(db_folder: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(temp) = temp_cache_dir() {
        candidates.push(temp);
    }
    if db_folder.is_dir() {
        candidates.push(db_folder.to_path_buf());
    }
    if let Some(uwp) = uwp_cache_dir() {
        if uwp.is_dir() {
            candidates.push(uwp);
        }
    }
    candidates
}

/// Pick the best fallback directory: the first existing candidate holding
/// at least one entry, else the first that merely exists, else the temp
/// cache path as a last resort.
pub fn pick_fallback(db_folder: &Path) -> Option<PathBuf> {
    let candidates = fallback_candidates(db_folder);

    for candidate in &candidates {
        if candidate.is_dir() {
            let non_empty = std::fs::read_dir(candidate)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            if non_empty {
                return Some(candidate.clone());
            }
        }
    }

    candidates
        .iter()
        .find(|c| c.is_dir())
        .cloned()
        .or_else(temp_cache_dir)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn custom_db_file_selects_database_backend() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("rbx-storage.db");
        std::fs::write(&db, b"").unwrap();

        let location = resolve_custom(&db);
        assert_eq!(location.backend, ScanBackend::Database);
        assert_eq!(location.db_folder, dir.path().join("rbx-storage"));
    }

    #[test]
    fn storage_folder_with_sibling_db_prefers_database() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("rbx-storage");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(dir.path().join("rbx-storage.db"), b"").unwrap();

        let location = resolve_custom(&folder);
        assert_eq!(location.backend, ScanBackend::Database);
        assert_eq!(location.path, dir.path().join("rbx-storage.db"));
        assert_eq!(location.db_folder, folder);
    }

    #[test]
    fn storage_folder_without_db_scans_flat() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("rbx-storage");
        std::fs::create_dir(&folder).unwrap();

        let location = resolve_custom(&folder);
        assert_eq!(location.backend, ScanBackend::FileSystem);
        assert_eq!(location.path, folder);
    }

    #[test]
    fn plain_directory_scans_flat() {
        let dir = TempDir::new().unwrap();
        let location = resolve_custom(dir.path());
        assert_eq!(location.backend, ScanBackend::FileSystem);
    }
}
