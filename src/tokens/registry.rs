//! Token definitions and the alias registry.
use std::collections::HashMap;

use super::scanner;
use crate::error::TokenError;

/// Whether a token's value depends on the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// Valid for the whole run regardless of scope (`{sitecollection}`,
    /// `{parameter:X}`).
    Global,
    /// Valid for the scope that was current when it was registered
    /// (`{site}`, `{listid:Title}`).  Rebasing hides these until the owning
    /// scope becomes current again.
    Target,
}

/// One resolved value together with all of its literal spellings.
///
/// Aliases are matched case-insensitively and stored ASCII-lowercased.
///
/// # Examples
///
/// ```
/// use provisioner::tokens::TokenDefinition;
///
/// let def = TokenDefinition::new(["{SiteTitle}", "{sitename}"], "Contoso").unwrap();
/// assert_eq!(def.aliases(), ["{sitetitle}", "{sitename}"]);
/// assert_eq!(def.value(), "Contoso");
/// assert!(TokenDefinition::new(["sitetitle"], "x").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDefinition {
    aliases: Vec<String>,
    value: String,
    scope: TokenScope,
}

impl TokenDefinition {
    /// Create a globally scoped definition.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if no alias is given or an alias does not start
    /// with a token marker.
    pub fn new<I, S>(aliases: I, value: impl Into<String>) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(aliases, value.into(), TokenScope::Global)
    }

    /// Create a definition bound to the current scope.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if no alias is given or an alias does not start
    /// with a token marker.
    pub fn scoped<I, S>(aliases: I, value: impl Into<String>) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(aliases, value.into(), TokenScope::Target)
    }

    fn build<I, S>(aliases: I, value: String, scope: TokenScope) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for alias in aliases {
            let alias = alias.as_ref();
            if !alias.bytes().next().is_some_and(scanner::is_marker) {
                return Err(TokenError::InvalidAlias(alias.to_string()));
            }
            let lower = alias.to_ascii_lowercase();
            if !normalized.contains(&lower) {
                normalized.push(lower);
            }
        }
        if normalized.is_empty() {
            return Err(TokenError::NoAliases(value));
        }
        Ok(Self {
            aliases: normalized,
            value,
            scope,
        })
    }

    /// Definition for aliases known to be well formed (built-in and
    /// parameter tokens).
    pub(super) fn builtin(aliases: &[&str], value: impl Into<String>, scope: TokenScope) -> Self {
        Self {
            aliases: aliases.iter().map(|a| a.to_ascii_lowercase()).collect(),
            value: value.into(),
            scope,
        }
    }

    /// The normalized (lowercase) aliases.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The resolved value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The scope this definition belongs to.
    #[must_use]
    pub const fn scope(&self) -> TokenScope {
        self.scope
    }
}

/// Alias → value lookup for one run.
///
/// Global aliases live for the whole run.  Scope-relative aliases are kept
/// per scope key and overlay the globals only while that scope is current,
/// so rebasing away and back restores exactly what was registered before.
#[derive(Debug, Clone, Default)]
pub(super) struct TokenRegistry {
    global: HashMap<String, String>,
    scoped: HashMap<String, HashMap<String, String>>,
    active: String,
    /// Effective aliases: globals overlaid with the active scope's aliases.
    lookup: HashMap<String, String>,
    /// Effective aliases the scanner cannot bound on its own, longest first.
    irregular: Vec<String>,
}

impl TokenRegistry {
    /// Key of the currently active scope.
    pub(super) fn active_scope(&self) -> &str {
        &self.active
    }

    /// Number of effective aliases.
    pub(super) fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Register a definition, overwriting every alias it names.
    pub(super) fn register(&mut self, def: &TokenDefinition) {
        for alias in &def.aliases {
            match def.scope {
                TokenScope::Global => {
                    self.global.insert(alias.clone(), def.value.clone());
                    let shadowed = self
                        .scoped
                        .get(&self.active)
                        .is_some_and(|overlay| overlay.contains_key(alias));
                    if shadowed {
                        continue;
                    }
                }
                TokenScope::Target => {
                    self.scoped
                        .entry(self.active.clone())
                        .or_default()
                        .insert(alias.clone(), def.value.clone());
                }
            }
            if self
                .lookup
                .insert(alias.clone(), def.value.clone())
                .is_none()
                && !scanner::is_structural(alias)
            {
                self.insert_irregular(alias.clone());
            }
        }
    }

    /// Switch the active scope to `key`, installing `builtins` as that
    /// scope's scope-relative tokens.  Aliases registered earlier for `key`
    /// that `builtins` does not name are kept.
    pub(super) fn rebase(&mut self, key: &str, builtins: &[TokenDefinition]) {
        self.active = key.to_string();
        let overlay = self.scoped.entry(key.to_string()).or_default();
        for def in builtins {
            for alias in &def.aliases {
                overlay.insert(alias.clone(), def.value.clone());
            }
        }
        self.rebuild();
    }

    /// Value registered for `alias`, matched case-insensitively.
    pub(super) fn get(&self, alias: &str) -> Option<&str> {
        if alias.bytes().any(|b| b.is_ascii_uppercase()) {
            self.lookup
                .get(&alias.to_ascii_lowercase())
                .map(String::as_str)
        } else {
            self.lookup.get(alias).map(String::as_str)
        }
    }

    /// Longest irregular alias that `text` starts with, as `(len, value)`.
    pub(super) fn match_prefix(&self, text: &str) -> Option<(usize, &str)> {
        let bytes = text.as_bytes();
        self.irregular.iter().find_map(|alias| {
            let head = bytes.get(..alias.len())?;
            if head.eq_ignore_ascii_case(alias.as_bytes()) {
                self.lookup
                    .get(alias)
                    .map(|value| (alias.len(), value.as_str()))
            } else {
                None
            }
        })
    }

    /// Every effective `(alias, value)` pair, longest alias first.
    pub(super) fn entries_by_length(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .lookup
            .iter()
            .map(|(a, v)| (a.as_str(), v.as_str()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        entries
    }

    fn rebuild(&mut self) {
        self.lookup = self.global.clone();
        if let Some(overlay) = self.scoped.get(&self.active) {
            self.lookup
                .extend(overlay.iter().map(|(a, v)| (a.clone(), v.clone())));
        }
        self.irregular = self
            .lookup
            .keys()
            .filter(|alias| !scanner::is_structural(alias))
            .cloned()
            .collect();
        self.irregular
            .sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    }

    fn insert_irregular(&mut self, alias: String) {
        let pos = self
            .irregular
            .partition_point(|existing| {
                existing.len() > alias.len()
                    || (existing.len() == alias.len() && existing.as_str() < alias.as_str())
            });
        self.irregular.insert(pos, alias);
    }
}
