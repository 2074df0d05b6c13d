//! Conditional exports/imports resolution: subpath pattern matching and
//! condition ordering, per spec §4.2 and
//! `original_source/include/mystral/js/module_resolver.h`'s
//! `resolveExportsTarget`/`resolveConditionalTarget`/`applyExportsPattern`.

use crate::error::ResolveError;
use crate::resolver::ResolveMode;
use serde_json::Value;

/// Ordered condition lists for each resolve mode (spec §4.2).
pub fn conditions_for(mode: ResolveMode) -> &'static [&'static str] {
    match mode {
        ResolveMode::Import => &["import", "node", "default"],
        ResolveMode::Require => &["require", "node", "default"],
    }
}

pub fn is_subpath_key(key: &str) -> bool {
    key.starts_with('.') || key.starts_with('/') || key.starts_with('#')
}

/// Resolve `subpath` (e.g. `"."` or `"./lib/x"`) against an `exports` (or
/// `imports`) field, for the package/specifier named `owner` (used only for
/// error messages).
pub fn resolve_target(
    field: &Value,
    subpath: &str,
    mode: ResolveMode,
    owner: &str,
) -> Result<String, ResolveError> {
    let conditions = conditions_for(mode);
    resolve_exports_value(field, subpath, conditions, owner)
}

fn resolve_exports_value(
    value: &Value,
    subpath: &str,
    conditions: &[&str],
    owner: &str,
) -> Result<String, ResolveError> {
    match value {
        Value::String(s) => {
            if subpath == "." {
                Ok(s.clone())
            } else {
                Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() })
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Ok(target) = resolve_exports_value(item, subpath, conditions, owner) {
                    return Ok(target);
                }
            }
            Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() })
        }
        Value::Object(map) => {
            let has_subpath_keys = map.keys().any(|k| is_subpath_key(k));

            if has_subpath_keys {
                // A bare "." entry means the package root itself; anything
                // else must be matched by exact key or a single-`*` pattern,
                // preferring the most specific (longest non-wildcard
                // prefix) match.
                if let Some(exact) = map.get(subpath) {
                    return resolve_conditional(exact, conditions, owner, subpath);
                }

                let mut best: Option<(&str, &Value, String)> = None;
                for (key, target) in map {
                    if !is_subpath_key(key) {
                        continue;
                    }
                    if let Some(captured) = match_pattern(key, subpath) {
                        let specificity = key.find('*').unwrap_or(key.len());
                        if best.as_ref().map(|(k, ..)| specificity > k.find('*').unwrap_or(k.len())).unwrap_or(true) {
                            best = Some((key, target, captured));
                        }
                    }
                }

                match best {
                    Some((key, target, captured)) => {
                        reject_nested_pattern(&captured, owner)?;
                        let resolved = resolve_conditional(target, conditions, owner, subpath)?;
                        Ok(substitute(&resolved, &captured).unwrap_or_else(|| {
                            let _ = key;
                            resolved
                        }))
                    }
                    None => Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() }),
                }
            } else if subpath == "." {
                resolve_conditional(value, conditions, owner, subpath)
            } else {
                Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() })
            }
        }
        _ => Err(ResolveError::InvalidExports { package: owner.to_string(), reason: "exports entry is not a string, array, or object".into() }),
    }
}

/// Resolve a conditional set `{ "import": ..., "default": ... }`, picking
/// the first condition the mode offers. Falls through to a plain
/// string/array/object exports continuation if `value` isn't a conditional
/// map (i.e. its keys are none of the known conditions AND none are subpath
/// keys at this recursion level — in that case treat it as already resolved
/// via `resolve_exports_value`).
fn resolve_conditional(value: &Value, conditions: &[&str], owner: &str, subpath: &str) -> Result<String, ResolveError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => {
            for item in items {
                if let Ok(target) = resolve_conditional(item, conditions, owner, subpath) {
                    return Ok(target);
                }
            }
            Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() })
        }
        Value::Object(map) => {
            for condition in conditions {
                if let Some(target) = map.get(*condition) {
                    return resolve_conditional(target, conditions, owner, subpath);
                }
            }
            Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() })
        }
        Value::Null => Err(ResolveError::NoExportMatch { package: owner.to_string(), subpath: subpath.to_string() }),
        _ => Err(ResolveError::InvalidExports { package: owner.to_string(), reason: "conditional target is not a string, array, or object".into() }),
    }
}

/// Match `key` (which may contain exactly one `*`) against `subpath`,
/// returning the captured substring on success.
fn match_pattern(key: &str, subpath: &str) -> Option<String> {
    match key.find('*') {
        None => if key == subpath { Some(String::new()) } else { None },
        Some(star) => {
            let (prefix, suffix) = (&key[..star], &key[star + 1..]);
            if subpath.len() >= prefix.len() + suffix.len()
                && subpath.starts_with(prefix)
                && subpath.ends_with(suffix)
            {
                Some(subpath[prefix.len()..subpath.len() - suffix.len()].to_string())
            } else {
                None
            }
        }
    }
}

fn substitute(target: &str, captured: &str) -> Option<String> {
    target.find('*').map(|star| {
        let mut out = String::with_capacity(target.len() + captured.len());
        out.push_str(&target[..star]);
        out.push_str(captured);
        out.push_str(&target[star + 1..]);
        out
    })
}

/// Rejects a match whose *captured* wildcard substring (the part `*` stood
/// for in the pattern key, before any substitution into the target) itself
/// contains an embedded `*` — e.g. specifier `pkg/a*b` matched against
/// `"./*": "./dist/*/index.js"`. `substitute` only ever replaces a single
/// `*` in the target, so a resolved *target* string can never retain two
/// stars; the ambiguity this guards against is in what the pattern
/// captured, not in the substitution result
/// (`original_source/src/js/module_resolver.cpp`).
fn reject_nested_pattern(captured: &str, owner: &str) -> Result<(), ResolveError> {
    if captured.contains('*') {
        return Err(ResolveError::InvalidExports {
            package: owner.to_string(),
            reason: format!("matched subpath segment '{captured}' contains an embedded '*'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conditional_is_order_sensitive() {
        let field = json!({ "import": "A", "default": "B" });
        assert_eq!(resolve_target(&field, ".", ResolveMode::Import, "p").unwrap(), "A");
        assert_eq!(resolve_target(&field, ".", ResolveMode::Require, "p").unwrap(), "B");
    }

    #[test]
    fn string_shorthand_is_the_package_root() {
        let field = json!("./lib/x.js");
        assert_eq!(resolve_target(&field, ".", ResolveMode::Import, "@s/n").unwrap(), "./lib/x.js");
    }

    #[test]
    fn pattern_substitution_is_exact() {
        let field = json!({ "./feature/*": { "import": "./lib/*.mjs" } });
        assert_eq!(resolve_target(&field, "./feature/x", ResolveMode::Import, "p").unwrap(), "./lib/x.mjs");
        assert!(resolve_target(&field, "./other", ResolveMode::Import, "p").is_err());
    }

    #[test]
    fn a_captured_segment_with_an_embedded_star_is_rejected() {
        let field = json!({ "./*": "./dist/*/index.js" });
        assert!(resolve_target(&field, "./a*b", ResolveMode::Import, "p").is_err());
    }

    #[test]
    fn most_specific_pattern_wins() {
        let field = json!({
            "./*": "./generic/*.js",
            "./feature/*": "./specific/*.js",
        });
        assert_eq!(
            resolve_target(&field, "./feature/x", ResolveMode::Import, "p").unwrap(),
            "./specific/x.js"
        );
    }
}
