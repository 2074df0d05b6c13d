//! Textual ESM -> CJS transformation (spec §4.3), used as the fallback path
//! when a module needs CJS evaluation but `boa_engine`'s native ESM
//! machinery is bypassed (see `loader::mod` for when that applies).
//!
//! Deliberately line-oriented and non-exhaustive: it covers the import/export
//! forms standard bundlers and transpilers emit, not arbitrary expression
//! contexts.

use once_cell::sync::Lazy;
use regex::Regex;

macro_rules! re {
    ($pat:expr) => {
        Lazy::new(|| Regex::new($pat).unwrap())
    };
}

static IMPORT_DEFAULT: Lazy<Regex> = re!(r#"^import\s+(\w+)\s+from\s+(['"])(.*?)\2;?\s*$"#);
static IMPORT_NAMESPACE: Lazy<Regex> = re!(r#"^import\s+\*\s+as\s+(\w+)\s+from\s+(['"])(.*?)\2;?\s*$"#);
static IMPORT_NAMED: Lazy<Regex> = re!(r#"^import\s+\{([^}]*)\}\s+from\s+(['"])(.*?)\2;?\s*$"#);
static IMPORT_DEFAULT_AND_NAMED: Lazy<Regex> =
    re!(r#"^import\s+(\w+)\s*,\s*\{([^}]*)\}\s+from\s+(['"])(.*?)\3;?\s*$"#);
static IMPORT_DEFAULT_AND_NAMESPACE: Lazy<Regex> =
    re!(r#"^import\s+(\w+)\s*,\s*\*\s+as\s+(\w+)\s+from\s+(['"])(.*?)\3;?\s*$"#);
static IMPORT_BARE: Lazy<Regex> = re!(r#"^import\s+(['"])(.*?)\1;?\s*$"#);

static EXPORT_STAR_FROM: Lazy<Regex> = re!(r#"^export\s+\*\s+from\s+(['"])(.*?)\1;?\s*$"#);
static EXPORT_NAMED_FROM: Lazy<Regex> = re!(r#"^export\s+\{([^}]*)\}\s+from\s+(['"])(.*?)\2;?\s*$"#);
static EXPORT_NAMED: Lazy<Regex> = re!(r#"^export\s+\{([^}]*)\}\s*;?\s*$"#);
static EXPORT_DEFAULT_FUNCTION: Lazy<Regex> = re!(r#"^export\s+default\s+(function\s*\*?\s*(\w+)?.*)$"#);
static EXPORT_DEFAULT_CLASS: Lazy<Regex> = re!(r#"^export\s+default\s+(class\s+(\w+).*)$"#);
static EXPORT_DEFAULT_EXPR: Lazy<Regex> = re!(r#"^export\s+default\s+(.*?);?\s*$"#);
static EXPORT_DECL: Lazy<Regex> = re!(r#"^export\s+(const|let|var)\s+(.*?);?\s*$"#);
static EXPORT_FUNCTION_DECL: Lazy<Regex> = re!(r#"^export\s+(function\s*\*?\s+(\w+).*)$"#);
static EXPORT_CLASS_DECL: Lazy<Regex> = re!(r#"^export\s+(class\s+(\w+).*)$"#);

/// Transform `source` into an equivalent CJS body. Returns the transformed
/// source; `exports.__esModule = true;` is prepended iff any `export` form
/// was emitted.
pub fn transform(source: &str) -> String {
    let mut out = Vec::with_capacity(source.lines().count());
    let mut saw_export = false;

    for raw_line in source.lines() {
        let line = raw_line.trim_end();
        let trimmed = line.trim_start();

        if let Some(caps) = IMPORT_DEFAULT.captures(trimmed) {
            let (x, m) = (&caps[1], &caps[3]);
            out.push(format!(
                "const __m_{x} = require(\"{m}\"); const {x} = __m_{x} && __m_{x}.__esModule ? __m_{x}.default : __m_{x};"
            ));
        } else if let Some(caps) = IMPORT_NAMESPACE.captures(trimmed) {
            let (n, m) = (&caps[1], &caps[3]);
            out.push(format!("const {n} = require(\"{m}\");"));
        } else if let Some(caps) = IMPORT_DEFAULT_AND_NAMESPACE.captures(trimmed) {
            let (x, n, m) = (&caps[1], &caps[2], &caps[4]);
            out.push(format!("const __m_{x} = require(\"{m}\");"));
            out.push(format!("const {n} = __m_{x};"));
            out.push(format!("const {x} = __m_{x} && __m_{x}.__esModule ? __m_{x}.default : __m_{x};"));
        } else if let Some(caps) = IMPORT_DEFAULT_AND_NAMED.captures(trimmed) {
            let (x, names, m) = (&caps[1], &caps[2], &caps[4]);
            out.push(format!("const __m_{x} = require(\"{m}\");"));
            out.push(format!("const {{ {} }} = __m_{x};", rename_named(names)));
            out.push(format!("const {x} = __m_{x} && __m_{x}.__esModule ? __m_{x}.default : __m_{x};"));
        } else if let Some(caps) = IMPORT_NAMED.captures(trimmed) {
            let (names, m) = (&caps[1], &caps[3]);
            out.push(format!("const {{ {} }} = require(\"{m}\");", rename_named(names)));
        } else if let Some(caps) = IMPORT_BARE.captures(trimmed) {
            out.push(format!("require(\"{}\");", &caps[2]));
        } else if let Some(caps) = EXPORT_STAR_FROM.captures(trimmed) {
            saw_export = true;
            out.push(format!("Object.assign(exports, require(\"{}\"));", &caps[2]));
        } else if let Some(caps) = EXPORT_NAMED_FROM.captures(trimmed) {
            saw_export = true;
            let (names, m) = (&caps[1], &caps[3]);
            out.push(format!("const __m = require(\"{m}\");"));
            for (local, exported) in parse_named_list(names) {
                out.push(format!("exports.{exported} = __m.{local};"));
            }
        } else if let Some(caps) = EXPORT_NAMED.captures(trimmed) {
            saw_export = true;
            for (local, exported) in parse_named_list(&caps[1]) {
                out.push(format!("exports.{exported} = {local};"));
            }
        } else if let Some(caps) = EXPORT_DEFAULT_FUNCTION.captures(trimmed) {
            saw_export = true;
            out.push(caps[1].to_string());
            if let Some(name) = caps.get(2) {
                out.push(format!("exports.default = {};", name.as_str()));
            } else {
                out.push("exports.default = undefined;".to_string());
            }
        } else if let Some(caps) = EXPORT_DEFAULT_CLASS.captures(trimmed) {
            saw_export = true;
            out.push(caps[1].to_string());
            out.push(format!("exports.default = {};", &caps[2]));
        } else if let Some(caps) = EXPORT_DEFAULT_EXPR.captures(trimmed) {
            saw_export = true;
            out.push(format!("exports.default = {};", &caps[1]));
        } else if let Some(caps) = EXPORT_FUNCTION_DECL.captures(trimmed) {
            saw_export = true;
            out.push(caps[1].to_string());
            out.push(format!("exports.{0} = {0};", &caps[2]));
        } else if let Some(caps) = EXPORT_CLASS_DECL.captures(trimmed) {
            saw_export = true;
            out.push(caps[1].to_string());
            out.push(format!("exports.{0} = {0};", &caps[2]));
        } else if let Some(caps) = EXPORT_DECL.captures(trimmed) {
            saw_export = true;
            let (kind, rest) = (&caps[1], &caps[2]);
            out.push(format!("{kind} {rest};"));
            for name in declared_names(rest) {
                out.push(format!("exports.{0} = {0};", name));
            }
        } else {
            out.push(line.to_string());
        }
    }

    if saw_export {
        out.insert(0, "exports.__esModule = true;".to_string());
    }

    out.join("\n")
}

/// `a, b as c` -> `a, b: c` (rename direction for destructuring imports).
fn rename_named(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(" as ") {
            Some((local, alias)) => format!("{}: {}", local.trim(), alias.trim()),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `a, b as c` -> `[(a, a), (b, c)]` (local binding, exported name).
fn parse_named_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(" as ") {
            Some((local, alias)) => (local.trim().to_string(), alias.trim().to_string()),
            None => (item.to_string(), item.to_string()),
        })
        .collect()
}

/// Extract the top-level identifiers from a `const`/`let`/`var` declarator
/// list (`a = 1, b = 2` -> `["a", "b"]`). Does not handle destructuring
/// patterns; those are out of scope for the textual transform.
fn declared_names(declarators: &str) -> Vec<String> {
    declarators
        .split(',')
        .filter_map(|decl| decl.split('=').next())
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('{') && !s.starts_with('['))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_import_respects_es_module_interop() {
        let out = transform(r#"import X from "m";"#);
        assert!(out.contains("require(\"m\")"));
        assert!(out.contains("__esModule ? __m_X.default : __m_X"));
    }

    #[test]
    fn named_import_destructures_with_rename() {
        let out = transform(r#"import { a, b as c } from "m";"#);
        assert_eq!(out, "const { a, b: c } = require(\"m\");");
    }

    #[test]
    fn export_const_preserves_identity() {
        let out = transform("export const a = 1, b = 2;");
        assert!(out.contains("exports.__esModule = true;"));
        assert!(out.contains("const a = 1, b = 2;"));
        assert!(out.contains("exports.a = a;"));
        assert!(out.contains("exports.b = b;"));
    }

    #[test]
    fn export_default_function_binds_name_then_exports_it() {
        let out = transform("export default function greet() { return 1; }");
        assert!(out.contains("function greet() { return 1; }"));
        assert!(out.contains("exports.default = greet;"));
    }

    #[test]
    fn reexport_from_another_module() {
        let out = transform(r#"export { a } from "m";"#);
        assert!(out.contains("const __m = require(\"m\");"));
        assert!(out.contains("exports.a = __m.a;"));
    }

    #[test]
    fn export_star_reexports_everything() {
        let out = transform(r#"export * from "m";"#);
        assert!(out.contains("Object.assign(exports, require(\"m\"));"));
    }

    #[test]
    fn no_esmodule_header_without_any_export() {
        let out = transform("const x = 1;\nconsole.log(x);");
        assert!(!out.contains("__esModule"));
    }
}
