//! `package.json` parsing, cached by root directory.
//!
//! Grounded on `original_source/include/mystral/js/module_resolver.h`'s
//! `PackageInfo`/`packageCache_`, translated from a hand-rolled JSON parser
//! to `serde_json::Value` — the ecosystem way to do this in Rust.

use crate::vfs::Vfs;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct PackageInfo {
    pub root_path: String,
    pub name: Option<String>,
    pub module_type: String,
    pub main: Option<String>,
    pub exports: Option<Value>,
    pub imports: Option<Value>,
}

impl PackageInfo {
    pub fn parse(root_path: &str, raw: &str) -> Option<PackageInfo> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let obj = value.as_object()?;

        Some(PackageInfo {
            root_path: root_path.to_string(),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
            module_type: obj.get("type").and_then(Value::as_str).unwrap_or("").to_string(),
            main: obj.get("main").and_then(Value::as_str).map(str::to_string),
            exports: obj.get("exports").cloned(),
            imports: obj.get("imports").cloned(),
        })
    }
}

/// Loads and caches `package.json` files by root directory, reading through
/// whichever `Vfs` is passed to each call so bundle and filesystem modes
/// behave identically. Holds no reference to the `Vfs` itself so it can live
/// inside an `Rc`-shared loader without lifetime coupling.
#[derive(Default)]
pub struct PackageCache {
    cache: std::cell::RefCell<std::collections::HashMap<String, Option<PackageInfo>>>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or fetch from cache) the `package.json` directly inside
    /// `dir` (no upward search). Returns `None` if it doesn't exist or
    /// fails to parse.
    pub fn load(&self, vfs: &Vfs, dir: &str) -> Option<PackageInfo> {
        if let Some(cached) = self.cache.borrow().get(dir) {
            return cached.clone();
        }

        let path = join(dir, "package.json");
        let parsed = vfs
            .read(&path)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| PackageInfo::parse(dir, &text));

        self.cache.borrow_mut().insert(dir.to_string(), parsed.clone());
        parsed
    }

    /// Walk upward from `start_dir` (inclusive) looking for the nearest
    /// enclosing `package.json`.
    pub fn find_nearest(&self, vfs: &Vfs, start_dir: &str) -> Option<PackageInfo> {
        let mut dir = start_dir.trim_end_matches('/').to_string();
        loop {
            if let Some(pkg) = self.load(vfs, &dir) {
                return Some(pkg);
            }
            match parent_dir(&dir) {
                Some(p) if p != dir => dir = p,
                _ => return None,
            }
        }
    }

    /// Walk upward from `start_dir` looking for the first
    /// `node_modules/<package_name>` directory that exists.
    pub fn find_package_root(&self, vfs: &Vfs, start_dir: &str, package_name: &str) -> Option<String> {
        let mut dir = start_dir.trim_end_matches('/').to_string();
        loop {
            let candidate = join(&join(&dir, "node_modules"), package_name);
            if vfs.is_dir(&candidate) || vfs.exists(&join(&candidate, "package.json")) {
                return Some(candidate);
            }
            match parent_dir(&dir) {
                Some(p) if p != dir => dir = p,
                _ => return None,
            }
        }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

fn parent_dir(dir: &str) -> Option<String> {
    if dir.is_empty() {
        return None;
    }
    match dir.rfind('/') {
        Some(idx) => Some(dir[..idx].to_string()),
        None => Some(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_exports() {
        let raw = r#"{ "name": "p", "type": "module", "exports": "./index.js" }"#;
        let pkg = PackageInfo::parse("pkgs/p", raw).unwrap();
        assert_eq!(pkg.module_type, "module");
        assert_eq!(pkg.exports.unwrap(), serde_json::json!("./index.js"));
    }

    #[test]
    fn parent_dir_walks_up_to_root() {
        assert_eq!(parent_dir("a/b/c"), Some("a/b".to_string()));
        assert_eq!(parent_dir("a"), Some(String::new()));
        assert_eq!(parent_dir(""), None);
    }
}
