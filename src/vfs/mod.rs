//! Virtual filesystem: reads from an appended/external bundle first, falling
//! back to the real filesystem. See spec §4.1 and
//! `original_source/src/vfs/embedded_bundle.cpp` for the discovery order
//! this module preserves exactly.

pub mod bundle;

pub use bundle::normalize_path;

use crate::error::VfsError;
use bundle::{BundleIndex, FOOTER_SIZE};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A loaded bundle: the backing file path, the parsed index, and the byte
/// offset within that file where the data region begins.
struct LoadedBundle {
    backing_file: PathBuf,
    index: BundleIndex,
    data_region_start: u64,
}

impl LoadedBundle {
    fn load_from_path(path: &Path) -> Option<LoadedBundle> {
        let bytes = fs::read(path).ok()?;
        let index_size = bundle::parse_footer(&bytes).ok()?;
        let index_start = bytes.len().checked_sub(FOOTER_SIZE + index_size as usize)?;
        let (index, data_size) =
            bundle::parse_index(&bytes[index_start..bytes.len() - FOOTER_SIZE]).ok()?;
        let data_region_start = (index_start as u64).checked_sub(data_size)?;
        Some(LoadedBundle { backing_file: path.to_path_buf(), index, data_region_start })
    }

    fn read_file(&self, normalized: &str) -> Option<Vec<u8>> {
        let span = self.index.files.get(normalized)?;
        let mut file = fs::File::open(&self.backing_file).ok()?;
        file.seek(SeekFrom::Start(self.data_region_start + span.offset)).ok()?;
        let mut out = vec![0u8; span.size as usize];
        file.read_exact(&mut out).ok()?;
        Some(out)
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        let prefix_with_slash = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
        self.index.files.keys().any(|p| p.starts_with(&prefix_with_slash))
    }
}

/// Reads files from either an embedded/external bundle or the real
/// filesystem. Every read/exists operation is total: failures become
/// `NotFound`/`IoError`, never a panic.
pub struct Vfs {
    bundle: Option<LoadedBundle>,
    root: PathBuf,
}

impl Vfs {
    /// Discover a bundle using the order in spec §4.1: (1) appended to the
    /// running executable, (2) `MYSTRAL_BUNDLE` env var, (3) `game.bundle`
    /// next to the executable (and `../Resources/game.bundle` on macOS).
    pub fn discover(root: impl Into<PathBuf>, bundle_override: Option<PathBuf>) -> Self {
        let bundle = bundle_override
            .and_then(|p| LoadedBundle::load_from_path(&p))
            .or_else(|| std::env::current_exe().ok().and_then(|p| LoadedBundle::load_from_path(&p)))
            .or_else(|| std::env::var("MYSTRAL_BUNDLE").ok().and_then(|p| LoadedBundle::load_from_path(Path::new(&p))))
            .or_else(Self::find_adjacent_bundle);

        Vfs { bundle, root: root.into() }
    }

    fn find_adjacent_bundle() -> Option<LoadedBundle> {
        let exe = std::env::current_exe().ok()?;
        let dir = exe.parent()?;

        if let Some(b) = LoadedBundle::load_from_path(&dir.join("game.bundle")) {
            return Some(b);
        }

        #[cfg(target_os = "macos")]
        {
            let resources = dir.join("..").join("Resources").join("game.bundle");
            if let Some(b) = LoadedBundle::load_from_path(&resources) {
                return Some(b);
            }
        }

        None
    }

    /// Construct a VFS with no bundle, rooted at `root` — used by tests and
    /// by `compile` when walking the real filesystem.
    pub fn filesystem_only(root: impl Into<PathBuf>) -> Self {
        Vfs { bundle: None, root: root.into() }
    }

    pub fn has_bundle(&self) -> bool {
        self.bundle.is_some()
    }

    /// The bundle's designated entry path, if any.
    pub fn entry_script(&self) -> Option<String> {
        self.bundle.as_ref().map(|b| b.index.entry_path.clone())
    }

    fn fs_path(&self, normalized: &str) -> PathBuf {
        if Path::new(normalized).is_absolute() {
            PathBuf::from(normalized)
        } else {
            self.root.join(normalized)
        }
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let normalized = bundle::normalize_path(path);

        if let Some(bundle) = &self.bundle {
            if let Some(bytes) = bundle.read_file(&normalized) {
                return Ok(bytes);
            }
        }

        let fs_path = self.fs_path(&normalized);
        fs::read(&fs_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VfsError::NotFound(path.to_string())
            } else {
                VfsError::Io { path: fs_path.display().to_string(), kind: e.kind() }
            }
        })
    }

    pub fn exists(&self, path: &str) -> bool {
        let normalized = bundle::normalize_path(path);
        if let Some(bundle) = &self.bundle {
            if bundle.index.files.contains_key(&normalized) || bundle.has_prefix(&normalized) {
                return true;
            }
        }
        self.fs_path(&normalized).exists()
    }

    /// "Directory exists" in bundle mode is synthesized from the presence of
    /// any entry under `path/`. In filesystem mode it is a real check.
    pub fn is_dir(&self, path: &str) -> bool {
        let normalized = bundle::normalize_path(path);
        if let Some(bundle) = &self.bundle {
            if bundle.has_prefix(&normalized) {
                return true;
            }
            if bundle.index.files.contains_key(&normalized) {
                return false;
            }
        }
        self.fs_path(&normalized).is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_filesystem_without_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), b"1").unwrap();
        let vfs = Vfs::filesystem_only(dir.path());
        assert!(vfs.exists("a.js"));
        assert_eq!(vfs.read("a.js").unwrap(), b"1");
        assert!(matches!(vfs.read("missing.js"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn is_dir_checks_real_directories_without_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let vfs = Vfs::filesystem_only(dir.path());
        assert!(vfs.is_dir("sub"));
        assert!(!vfs.is_dir("nope"));
    }
}
