//! `compile` command (spec §4.9): walk the static import graph from an
//! entry point and emit a bundle.
//!
//! Grounded on `vfs::bundle::encode` for the envelope and on
//! `resolver::ModuleResolver` for turning an extracted specifier into a
//! canonical bundle-relative path; the specifier extraction itself is a
//! regex sweep over source text, the same style `loader::esm_transform`
//! uses for the ESM-to-CJS rewrite.

use crate::error::BundleError;
use crate::resolver::{ModuleResolver, ResolveMode};
use crate::vfs::bundle::{encode, normalize_path, BundleEntry};
use crate::vfs::Vfs;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:^|[^.\w])import\s+(?:[\s\S]*?from\s+)?['"]([^'"]+)['"]"#).unwrap());
static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:^|[^.\w])export\s+(?:[\s\S]*?from\s+)?['"]([^'"]+)['"]"#).unwrap());
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:^|[^.\w])import\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:^|[^.\w])require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Every static specifier referenced by `source`, in order of appearance.
/// Computed specifiers (`require(x)`, template-literal dynamic imports) are
/// out of scope: the extractor is regex-based, not a real parser, and can
/// only see literal string arguments (an accepted Open Question decision).
fn extract_specifiers(source: &str) -> Vec<String> {
    let mut specifiers = Vec::new();
    for pattern in [&*IMPORT_FROM, &*EXPORT_FROM, &*DYNAMIC_IMPORT, &*REQUIRE_CALL] {
        for capture in pattern.captures_iter(source) {
            specifiers.push(capture[1].to_string());
        }
    }
    specifiers
}

fn is_relative_or_absolute(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("file://")
}

/// Walks the transitive closure of static imports from `entry`, returning
/// canonical, deduplicated bundle-relative paths in discovery order.
fn walk_module_graph(vfs: &Vfs, entry: &str) -> Result<Vec<String>, BundleError> {
    let resolver = ModuleResolver::new();
    let mut seen = BTreeMap::new();
    let mut order = Vec::new();
    let mut frontier = vec![entry.to_string()];

    while let Some(path) = frontier.pop() {
        let normalized = normalize_path(&path);
        if seen.contains_key(&normalized) {
            continue;
        }
        seen.insert(normalized.clone(), ());
        order.push(normalized.clone());

        let Ok(bytes) = vfs.read(&normalized) else { continue };
        let Ok(text) = String::from_utf8(bytes) else { continue };

        let specifiers = extract_specifiers(&text);
        if specifiers.is_empty() && (text.contains("require(") || text.contains("import(")) {
            log::warn!("{normalized}: found 'require(' or 'import(' but no static specifier was extracted; computed arguments are not bundled");
        }

        for specifier in specifiers {
            if !is_relative_or_absolute(&specifier) {
                continue; // bare package specifiers aren't bundled (spec §4.9 step 1)
            }
            if let Ok(resolved) = resolver.resolve(vfs, &specifier, &normalized, ResolveMode::Require) {
                frontier.push(resolved.path);
            }
        }
    }

    Ok(order)
}

/// Every file under `dir`, as paths relative to `root`, normalized.
fn walk_asset_dir(root: &Path, dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else { continue };
        out.push(normalize_path(&relative.to_string_lossy()));
    }
    out
}

fn package_json_for(vfs: &Vfs, entry: &str) -> Option<String> {
    let dir = match entry.rfind('/') {
        Some(idx) => &entry[..idx],
        None => "",
    };
    let candidate = if dir.is_empty() { "package.json".to_string() } else { format!("{dir}/package.json") };
    vfs.exists(&candidate).then_some(candidate)
}

/// Rejects any bundle-relative path that would escape the bundle root once
/// normalized (spec §4.9 step 3 / testable property on path safety).
fn escapes_root(path: &str) -> bool {
    normalize_path(path).split('/').any(|segment| segment == "..")
}

pub struct CompileOptions {
    pub entry: PathBuf,
    pub include: Vec<PathBuf>,
    pub root: PathBuf,
    pub bundle_only: bool,
}

/// Runs spec §4.9's four steps and returns the encoded bundle bytes,
/// including the runtime executable prefix unless `bundle_only` is set.
pub fn compile(options: &CompileOptions) -> Result<Vec<u8>, BundleError> {
    let vfs = Vfs::filesystem_only(&options.root);
    let entry_rel = normalize_path(&relative_to_root(&options.root, &options.entry));

    let mut paths = walk_module_graph(&vfs, &entry_rel)?;

    if let Some(pkg) = package_json_for(&vfs, &entry_rel) {
        paths.push(pkg);
    }

    for include_dir in &options.include {
        paths.extend(walk_asset_dir(&options.root, include_dir));
    }

    let mut deduped = BTreeMap::new();
    for path in paths {
        if escapes_root(&path) {
            return Err(BundleError::PathEscapesRoot(path));
        }
        deduped.entry(path).or_insert(());
    }

    let mut entries = Vec::with_capacity(deduped.len());
    for path in deduped.keys() {
        let data = vfs.read(path).map_err(|_| BundleError::CorruptIndex(format!("could not read {path} while bundling")))?;
        entries.push(BundleEntry { path: path.clone(), data });
    }

    let (data, index_and_footer) = encode(&entry_rel, &entries)?;

    let mut output = Vec::new();
    if !options.bundle_only {
        if let Ok(exe) = std::env::current_exe().and_then(std::fs::read) {
            output.extend_from_slice(&exe);
        }
    }
    output.extend_from_slice(&data);
    output.extend_from_slice(&index_and_footer);

    Ok(output)
}

fn relative_to_root(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) {
        let full = dir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    #[test]
    fn bundles_the_transitive_import_graph() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.js", "import './dep.js'; require('./other.js');");
        write(dir.path(), "dep.js", "export const x = 1;");
        write(dir.path(), "other.js", "module.exports = {};");

        let options = CompileOptions {
            entry: dir.path().join("main.js"),
            include: vec![],
            root: dir.path().to_path_buf(),
            bundle_only: true,
        };
        let bytes = compile(&options).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn bare_specifiers_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.js", "import React from 'react';");

        let vfs = Vfs::filesystem_only(dir.path());
        let paths = walk_module_graph(&vfs, "main.js").unwrap();
        assert_eq!(paths, vec!["main.js".to_string()]);
    }

    #[test]
    fn asset_directories_are_included_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.js", "1;");
        write(dir.path(), "assets/sprite.png", "binary");

        let options = CompileOptions {
            entry: dir.path().join("main.js"),
            include: vec![dir.path().join("assets")],
            root: dir.path().to_path_buf(),
            bundle_only: true,
        };
        let bytes = compile(&options).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn path_escaping_the_bundle_root_is_rejected() {
        assert!(escapes_root("../outside.js"));
        assert!(!escapes_root("sub/inside.js"));
    }
}
