//! Module resolver: maps `(specifier, referrer, mode)` to a `ResolvedModule`.
//!
//! Grounded on `original_source/include/mystral/js/module_resolver.h`'s
//! `ModuleResolver` class shape (path/package/imports resolution split,
//! package-root walk, conditional exports) and spec §4.2.

pub mod exports;
pub mod package_json;

use crate::error::ResolveError;
use crate::vfs::Vfs;
use package_json::{PackageCache, PackageInfo};

const REQUIRE_EXTENSIONS: &[&str] = &[".js", ".json", ".mjs", ".cjs", ".ts", ".tsx", ".mts", ".cts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Import,
    Require,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFormat {
    Esm,
    Cjs,
    Json,
}

/// Identity for caching: the canonical path string after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedModule {
    pub path: String,
    pub format: ModuleFormat,
}

/// Holds no reference to a `Vfs` — every method takes one as its first
/// argument — so the resolver can be owned (and shared via `Rc`) by the
/// module loader without lifetime coupling to the engine thread's state.
#[derive(Default)]
pub struct ModuleResolver {
    packages: PackageCache,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, vfs: &Vfs, specifier: &str, referrer: &str, mode: ResolveMode) -> Result<ResolvedModule, ResolveError> {
        if specifier.is_empty() {
            return Err(ResolveError::EmptySpecifier);
        }

        let specifier = specifier.strip_prefix("file://").unwrap_or(specifier);

        if let Some(rest) = specifier.strip_prefix('#') {
            return self.resolve_imports(vfs, rest, referrer, mode);
        }

        if is_path_specifier(specifier) {
            return self.resolve_path(vfs, specifier, referrer, mode);
        }

        // Bundle mode: a bare specifier that exists as a bundle file is
        // promoted to a path specifier (spec §4.2).
        if vfs.has_bundle() && vfs.exists(specifier) {
            return self.resolve_path(vfs, specifier, referrer, mode);
        }

        self.resolve_package(vfs, specifier, referrer, mode)
    }

    fn dirname(&self, referrer: &str) -> String {
        if referrer.is_empty() {
            return String::new();
        }
        match referrer.rfind('/') {
            Some(idx) => referrer[..idx].to_string(),
            None => String::new(),
        }
    }

    fn resolve_path(&self, vfs: &Vfs, spec: &str, referrer: &str, mode: ResolveMode) -> Result<ResolvedModule, ResolveError> {
        let base = self.dirname(referrer);
        let joined = join_relative(&base, spec);

        if let Some(resolved) = self.resolve_as_file(vfs, &joined, mode)? {
            return Ok(resolved);
        }
        self.resolve_as_directory(vfs, &joined, mode)
    }

    fn resolve_as_file(&self, vfs: &Vfs, path: &str, mode: ResolveMode) -> Result<Option<ResolvedModule>, ResolveError> {
        if vfs.exists(path) && !vfs.is_dir(path) {
            return Ok(Some(ResolvedModule { path: path.to_string(), format: self.detect_format(vfs, path) }));
        }

        if mode == ResolveMode::Require {
            for ext in REQUIRE_EXTENSIONS {
                let candidate = format!("{path}{ext}");
                if vfs.exists(&candidate) {
                    return Ok(Some(ResolvedModule { path: candidate.clone(), format: self.detect_format(vfs, &candidate) }));
                }
            }
        }

        Ok(None)
    }

    fn resolve_as_directory(&self, vfs: &Vfs, path: &str, mode: ResolveMode) -> Result<ResolvedModule, ResolveError> {
        if let Some(pkg) = self.packages.load(vfs, path) {
            if mode == ResolveMode::Import {
                if let Some(exports) = &pkg.exports {
                    let target = exports::resolve_target(exports, ".", mode, &pkg_owner(&pkg))?;
                    let full = join_relative(path, &target);
                    if let Some(resolved) = self.resolve_as_file(vfs, &full, mode)? {
                        return Ok(resolved);
                    }
                    return Err(ResolveError::PackageNotFound(full));
                }
            }
            if let Some(resolved) = self.resolve_package_main(vfs, &pkg, path, mode)? {
                return Ok(resolved);
            }
        }

        match mode {
            ResolveMode::Require => {
                for ext in REQUIRE_EXTENSIONS {
                    let candidate = format!("{path}/index{ext}");
                    if vfs.exists(&candidate) {
                        return Ok(ResolvedModule { path: candidate.clone(), format: self.detect_format(vfs, &candidate) });
                    }
                }
                Err(ResolveError::PackageNotFound(format!("{path}/index")))
            }
            ResolveMode::Import => Err(ResolveError::UnsupportedDirectoryImport(path.to_string())),
        }
    }

    fn resolve_package_main(&self, vfs: &Vfs, pkg: &PackageInfo, dir: &str, mode: ResolveMode) -> Result<Option<ResolvedModule>, ResolveError> {
        if let Some(main) = &pkg.main {
            let full = join_relative(dir, main);
            if let Some(resolved) = self.resolve_as_file(vfs, &full, mode)? {
                return Ok(Some(resolved));
            }
        }
        if mode == ResolveMode::Require {
            let index = format!("{dir}/index");
            for ext in REQUIRE_EXTENSIONS {
                let candidate = format!("{index}{ext}");
                if vfs.exists(&candidate) {
                    return Ok(Some(ResolvedModule { path: candidate.clone(), format: self.detect_format(vfs, &candidate) }));
                }
            }
        }
        Ok(None)
    }

    fn resolve_package(&self, vfs: &Vfs, specifier: &str, referrer: &str, mode: ResolveMode) -> Result<ResolvedModule, ResolveError> {
        let (package_name, subpath) = split_package_specifier(specifier);
        let start_dir = self.dirname(referrer);

        let package_root = self
            .packages
            .find_package_root(vfs, &start_dir, &package_name)
            .ok_or_else(|| ResolveError::PackageNotFound(package_name.clone()))?;

        let pkg = self
            .packages
            .load(vfs, &package_root)
            .unwrap_or(PackageInfo { root_path: package_root.clone(), ..Default::default() });

        if let Some(exports) = &pkg.exports {
            let target = exports::resolve_target(exports, &subpath, mode, &package_name)?;
            let full = join_relative(&package_root, &target);
            if let Some(resolved) = self.resolve_as_file(vfs, &full, mode)? {
                return Ok(resolved);
            }
            return self.resolve_as_directory(vfs, &full, mode);
        }

        if subpath != "." {
            let relative = subpath.trim_start_matches("./");
            let full = join_relative(&package_root, relative);
            if let Some(resolved) = self.resolve_as_file(vfs, &full, mode)? {
                return Ok(resolved);
            }
            return self.resolve_as_directory(vfs, &full, mode);
        }

        if let Some(resolved) = self.resolve_package_main(vfs, &pkg, &package_root, mode)? {
            return Ok(resolved);
        }

        let index = format!("{package_root}/index.js");
        if vfs.exists(&index) {
            return Ok(ResolvedModule { path: index.clone(), format: self.detect_format(vfs, &index) });
        }

        Err(ResolveError::PackageNotFound(specifier.to_string()))
    }

    fn resolve_imports(&self, vfs: &Vfs, subpath_with_hash: &str, referrer: &str, mode: ResolveMode) -> Result<ResolvedModule, ResolveError> {
        let subpath = format!("#{subpath_with_hash}");
        let start_dir = self.dirname(referrer);

        let pkg = self
            .packages
            .find_nearest(vfs, &start_dir)
            .filter(|p| p.imports.is_some())
            .ok_or_else(|| ResolveError::PackageNotFound(subpath.clone()))?;

        let imports = pkg.imports.as_ref().unwrap();
        let target = exports::resolve_target(imports, &subpath, mode, "#imports")?;
        let full = join_relative(&pkg.root_path, &target);

        if let Some(resolved) = self.resolve_as_file(vfs, &full, mode)? {
            return Ok(resolved);
        }
        self.resolve_as_directory(vfs, &full, mode)
    }

    /// Format determination table from spec §4.2.
    fn detect_format(&self, vfs: &Vfs, path: &str) -> ModuleFormat {
        if let Some(ext) = extension_of(path) {
            match ext {
                "mjs" | "mts" => return ModuleFormat::Esm,
                "cjs" | "cts" => return ModuleFormat::Cjs,
                "json" => return ModuleFormat::Json,
                "js" | "ts" | "tsx" => {
                    let dir = self.dirname(path);
                    let is_module = self
                        .packages
                        .find_nearest(vfs, &dir)
                        .map(|pkg| pkg.module_type == "module")
                        .unwrap_or(false);
                    return if is_module { ModuleFormat::Esm } else { ModuleFormat::Cjs };
                }
                _ => {}
            }
        }
        ModuleFormat::Cjs
    }
}

fn pkg_owner(pkg: &PackageInfo) -> String {
    pkg.name.clone().unwrap_or_else(|| pkg.root_path.clone())
}

fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map(|idx| &name[idx + 1..])
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with('/')
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || is_drive_letter_path(specifier)
}

fn is_drive_letter_path(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn split_package_specifier(specifier: &str) -> (String, String) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        let scope = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");
        format!("{scope}/{name}")
    } else {
        parts.next().unwrap_or("").to_string()
    };
    let rest: Vec<&str> = parts.collect();
    let subpath = if rest.is_empty() { ".".to_string() } else { format!("./{}", rest.join("/")) };
    (name, subpath)
}

fn join_relative(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        crate::vfs::normalize_path(rel)
    } else if base.is_empty() {
        crate::vfs::normalize_path(rel)
    } else {
        crate::vfs::normalize_path(&format!("{base}/{rel}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &std::path::Path, rel: &str, content: &str) {
        let full = dir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    #[test]
    fn exact_extension_wins_regardless_of_extension_list() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.data.js", "1");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();
        let resolved = resolver.resolve(&vfs, "./a.data.js", "entry.js", ResolveMode::Require).unwrap();
        assert_eq!(resolved.path, "a.data.js");
    }

    #[test]
    fn require_tries_extension_list_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.mjs", "export const y = 1;");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();
        let resolved = resolver.resolve(&vfs, "./b", "entry.js", ResolveMode::Require).unwrap();
        assert_eq!(resolved.path, "b.mjs");
        assert_eq!(resolved.format, ModuleFormat::Esm);
    }

    #[test]
    fn import_mode_rejects_extensionless_specifiers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.mjs", "export const y = 1;");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();
        assert!(resolver.resolve(&vfs, "./b", "entry.mjs", ResolveMode::Import).is_err());
    }

    #[test]
    fn conditional_exports_pick_different_targets_per_mode() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "node_modules/p/package.json",
            r#"{ "exports": { ".": { "import": "./esm.js", "require": "./cjs.js" } } }"#,
        );
        write(dir.path(), "node_modules/p/esm.js", "export const a = 1;");
        write(dir.path(), "node_modules/p/cjs.js", "module.exports = {};");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();

        let esm = resolver.resolve(&vfs, "p", "entry.js", ResolveMode::Import).unwrap();
        assert_eq!(esm.path, "node_modules/p/esm.js");

        let cjs = resolver.resolve(&vfs, "p", "entry.js", ResolveMode::Require).unwrap();
        assert_eq!(cjs.path, "node_modules/p/cjs.js");
    }

    #[test]
    fn directory_import_without_package_json_fails_under_import_mode() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sub/index.js", "module.exports = {};");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();
        assert!(matches!(
            resolver.resolve(&vfs, "./sub", "entry.mjs", ResolveMode::Import),
            Err(ResolveError::UnsupportedDirectoryImport(_))
        ));
        let required = resolver.resolve(&vfs, "./sub", "entry.js", ResolveMode::Require).unwrap();
        assert_eq!(required.path, "sub/index.js");
    }

    #[test]
    fn format_follows_nearest_package_type() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{ "type": "module" }"#);
        write(dir.path(), "a.js", "export const a = 1;");
        let vfs = Vfs::filesystem_only(dir.path());
        let resolver = ModuleResolver::new();
        let resolved = resolver.resolve(&vfs, "./a.js", "entry.js", ResolveMode::Require).unwrap();
        assert_eq!(resolved.format, ModuleFormat::Esm);
    }
}
