//! Path-alias normalization.
//!
//! Aliases are ordered (find, replacement) pairs with first-match-wins
//! semantics. Merging concatenates; an overlapping `find` registered later
//! never shadows an earlier one, even across merge boundaries.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Prefix reserved for the tool's own virtual modules.
pub static CLIENT_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^/?@vite/").expect("static pattern"));

/// The `find` side of an alias entry.
#[derive(Debug, Clone)]
pub enum AliasPattern {
    Literal(String),
    Pattern(Regex),
}

/// The `replacement` side of an alias entry.
///
/// A replacement is lazily evaluated when the target path may contain
/// characters that are unsafe for direct substitution.
#[derive(Clone)]
pub enum AliasReplacement {
    Literal(String),
    Lazy(Arc<dyn Fn() -> String + Send + Sync>),
}

impl AliasReplacement {
    pub fn resolve(&self) -> String {
        match self {
            AliasReplacement::Literal(s) => s.clone(),
            AliasReplacement::Lazy(f) => f(),
        }
    }
}

impl fmt::Debug for AliasReplacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasReplacement::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            AliasReplacement::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alias {
    pub find: AliasPattern,
    pub replacement: AliasReplacement,
}

impl Alias {
    pub fn new(find: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            find: AliasPattern::Literal(find.into()),
            replacement: AliasReplacement::Literal(replacement.into()),
        }
    }

    /// Apply this alias to an import id, if it matches.
    pub fn apply(&self, id: &str) -> Option<String> {
        match &self.find {
            AliasPattern::Literal(find) => id
                .strip_prefix(find.as_str())
                .map(|rest| format!("{}{rest}", self.replacement.resolve())),
            AliasPattern::Pattern(re) => {
                let m = re.find(id)?;
                if m.start() != 0 {
                    return None;
                }
                Some(format!("{}{}", self.replacement.resolve(), &id[m.end()..]))
            }
        }
    }
}

/// Trim matched trailing separators from a literal find/replacement pair.
///
/// `/src/` -> `/root/` would otherwise resolve `/src/app.ts` to
/// `/root//app.ts`; stripping both sides avoids the double separator.
/// Mismatched trailing separators are left untouched.
pub fn normalize_alias(alias: Alias) -> Alias {
    let Alias { find, replacement } = alias;

    if let (AliasPattern::Literal(f), AliasReplacement::Literal(r)) = (&find, &replacement) {
        if f.ends_with('/') && r.ends_with('/') {
            return Alias {
                find: AliasPattern::Literal(f[..f.len() - 1].to_string()),
                replacement: AliasReplacement::Literal(r[..r.len() - 1].to_string()),
            };
        }
    }

    Alias { find, replacement }
}

/// Build the normalized alias list from raw config data.
///
/// Accepts the pair-list form or the plain mapping form. Mapping key order
/// follows the underlying object's insertion order; callers must not rely on
/// cross-pair ordering in mapping form.
pub fn aliases_from_value(value: &Value) -> Vec<Alias> {
    let mut out = Vec::new();

    match value {
        Value::Array(entries) => {
            for entry in entries {
                let (Some(find), Some(replacement)) = (
                    entry.get("find").and_then(Value::as_str),
                    entry.get("replacement").and_then(Value::as_str),
                ) else {
                    continue;
                };
                out.push(normalize_alias(Alias::new(find, replacement)));
            }
        }
        Value::Object(map) => {
            for (find, replacement) in map {
                if let Some(replacement) = replacement.as_str() {
                    out.push(normalize_alias(Alias::new(find.clone(), replacement)));
                }
            }
        }
        _ => {}
    }

    out
}

/// Concatenate two alias sources, `a` entries first.
pub fn merge_aliases(a: Vec<Alias>, b: Vec<Alias>) -> Vec<Alias> {
    let mut out = a;
    out.extend(b);
    out
}

/// Directory holding the tool's injected client runtime modules.
pub fn client_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("client")
}

/// Prepend the internal client alias ahead of all user aliases.
///
/// The replacement is a lazily-evaluated function: the client directory path
/// may contain characters unsafe for naive substitution.
pub fn inject_client_alias(user_aliases: Vec<Alias>) -> Vec<Alias> {
    let client = Alias {
        find: AliasPattern::Pattern(CLIENT_PREFIX_RE.clone()),
        replacement: AliasReplacement::Lazy(Arc::new(|| {
            let dir = client_dir();
            let mut s = dir.to_string_lossy().replace('\\', "/");
            if !s.ends_with('/') {
                s.push('/');
            }
            s
        })),
    };

    let mut out = Vec::with_capacity(user_aliases.len() + 1);
    out.push(client);
    out.extend(user_aliases);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(alias: &Alias) -> (&str, &str) {
        match (&alias.find, &alias.replacement) {
            (AliasPattern::Literal(f), AliasReplacement::Literal(r)) => (f, r),
            other => panic!("expected literal alias, got {other:?}"),
        }
    }

    #[test]
    fn trims_matched_trailing_separators() {
        let alias = normalize_alias(Alias::new("/src/", "/root/"));
        assert_eq!(literal(&alias), ("/src", "/root"));
    }

    #[test]
    fn leaves_mismatched_separators_alone() {
        let alias = normalize_alias(Alias::new("/src", "/root/"));
        assert_eq!(literal(&alias), ("/src", "/root/"));

        let alias = normalize_alias(Alias::new("/src/", "/root"));
        assert_eq!(literal(&alias), ("/src/", "/root"));
    }

    #[test]
    fn mapping_form_converts_to_pairs() {
        let aliases = aliases_from_value(&json!({ "@": "/project/src", "~": "/project" }));
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn merge_keeps_first_match_priority() {
        let a = vec![normalize_alias(Alias::new("pkg", "/a"))];
        let b = vec![normalize_alias(Alias::new("pkg", "/b"))];
        let merged = merge_aliases(a, b);

        assert_eq!(merged.len(), 2);
        // First matching entry wins at resolution time.
        assert_eq!(merged[0].apply("pkg/x").unwrap(), "/a/x");
    }

    #[test]
    fn client_alias_is_injected_first() {
        let user = vec![Alias::new("@", "/src")];
        let all = inject_client_alias(user);

        assert_eq!(all.len(), 2);
        let resolved = all[0].apply("/@vite/client").unwrap();
        assert!(resolved.ends_with("client/client") || resolved.contains("client"));
    }

    #[test]
    fn pattern_alias_matches_prefix_only() {
        let alias = Alias {
            find: AliasPattern::Pattern(CLIENT_PREFIX_RE.clone()),
            replacement: AliasReplacement::Literal("/client/".into()),
        };
        assert_eq!(alias.apply("/@vite/env").unwrap(), "/client/env");
        assert!(alias.apply("lib/@vite/env").is_none());
    }
}
